//! Cross-file key reconciliation
//!
//! The five survey files reference each other only by human-readable name:
//! the taxonomy table and abundance matrix by OTU sequence identifier, the
//! abundance matrix by sample name, the species-metadata table by taxonomic
//! species name. After each pipeline stage commits, the relevant mapping is
//! loaded here and later stages resolve through it. A missing key is a
//! recoverable condition for the caller (skip the row, warn, count).

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

/// A mapping from a file-level key to an assigned internal identifier.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    entries: HashMap<String, Uuid>,
}

impl KeyMap {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Uuid)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    /// Resolve a key; `None` means the reference is unresolvable and the
    /// row should be skipped.
    pub fn resolve(&self, key: &str) -> Option<Uuid> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load the `sequence identifier -> OTU id` mapping for a project.
pub async fn otu_map(pool: &PgPool, project_id: Uuid) -> Result<KeyMap, sqlx::Error> {
    let pairs: Vec<(String, Uuid)> =
        sqlx::query_as("SELECT sequence_id, id FROM otus WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(pool)
            .await?;
    Ok(KeyMap::from_pairs(pairs))
}

/// Load the `sample name -> sample id` mapping for a project.
pub async fn sample_map(pool: &PgPool, project_id: Uuid) -> Result<KeyMap, sqlx::Error> {
    let pairs: Vec<(String, Uuid)> =
        sqlx::query_as("SELECT name, id FROM samples WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(pool)
            .await?;
    Ok(KeyMap::from_pairs(pairs))
}

/// Load the `taxonomic species name -> OTU id` mapping for a project, by
/// joining persisted OTU and taxonomy rows. Only OTUs that received a
/// taxonomy row in stage 3 are resolvable here.
pub async fn species_map(pool: &PgPool, project_id: Uuid) -> Result<KeyMap, sqlx::Error> {
    let pairs: Vec<(String, Uuid)> = sqlx::query_as(
        r#"
        SELECT t.species, o.id
        FROM otus o
        JOIN taxonomy t ON t.otu_id = o.id
        WHERE o.project_id = $1
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(KeyMap::from_pairs(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_hit_and_miss() {
        let id = Uuid::new_v4();
        let map = KeyMap::from_pairs(vec![("OTU1".to_string(), id)]);
        assert_eq!(map.resolve("OTU1"), Some(id));
        assert_eq!(map.resolve("OTU2"), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_resolution_is_case_sensitive() {
        let map = KeyMap::from_pairs(vec![("Sample_A".to_string(), Uuid::new_v4())]);
        assert!(map.resolve("sample_a").is_none());
    }

    #[test]
    fn test_empty_map() {
        let map = KeyMap::default();
        assert!(map.is_empty());
        assert_eq!(map.resolve("anything"), None);
    }
}
