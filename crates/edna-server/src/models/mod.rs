//! Row types for the relational entities
//!
//! All entities are scoped to one project; `project_id` is the tenancy
//! boundary. `sequence_id` and sample `name` are unique only within a
//! project.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A survey project, the owner of all other rows.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A physical collection event.
#[derive(Debug, Clone, FromRow)]
pub struct SampleRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub collection_date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    /// Open-ended covariate map; keys keep metadata-file column order.
    pub environmental_data: serde_json::Value,
}

impl SampleRow {
    /// Look up a covariate value as a string, if present and textual.
    pub fn covariate_str(&self, key: &str) -> Option<&str> {
        self.environmental_data.get(key).and_then(|v| v.as_str())
    }
}

/// A detected sequence cluster (operational taxonomic unit).
#[derive(Debug, Clone, FromRow)]
pub struct OtuRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub sequence_id: String,
    pub sequence: String,
}

/// Observed abundance of one OTU in one sample. Only non-zero counts exist.
#[derive(Debug, Clone, FromRow)]
pub struct OtuCountRow {
    pub id: Uuid,
    pub sample_id: Uuid,
    pub otu_id: Uuid,
    pub count: i32,
}

/// Taxonomic classification, at most one per OTU.
#[derive(Debug, Clone, FromRow)]
pub struct TaxonomyRow {
    pub id: Uuid,
    pub otu_id: Uuid,
    pub kingdom: String,
    pub phylum: String,
    pub class: String,
    pub order: String,
    pub family: String,
    pub genus: String,
    pub species: String,
}

/// Conservation/ecological record, at most one per OTU.
#[derive(Debug, Clone, FromRow)]
pub struct SpeciesMetadataRow {
    pub id: Uuid,
    pub otu_id: Uuid,
    /// Free-text category; "invasive" is the value the aggregation engine
    /// matches exactly.
    pub status: String,
    /// IUCN Red List abbreviation; VU/EN/CR count as protected.
    pub iucn_status: String,
    pub habitat_type: String,
    pub additional_info: serde_json::Value,
}

impl SpeciesMetadataRow {
    /// Whether the IUCN status marks this OTU as protected.
    pub fn is_protected(&self) -> bool {
        matches!(self.iucn_status.as_str(), "VU" | "EN" | "CR")
    }

    /// Whether the free-text status marks this OTU as invasive
    /// (case-sensitive exact match).
    pub fn is_invasive(&self) -> bool {
        self.status == "invasive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(status: &str, iucn: &str) -> SpeciesMetadataRow {
        SpeciesMetadataRow {
            id: Uuid::new_v4(),
            otu_id: Uuid::new_v4(),
            status: status.to_string(),
            iucn_status: iucn.to_string(),
            habitat_type: "native".to_string(),
            additional_info: serde_json::json!({}),
        }
    }

    #[test]
    fn test_protected_statuses() {
        assert!(meta("common", "VU").is_protected());
        assert!(meta("common", "EN").is_protected());
        assert!(meta("common", "CR").is_protected());
        assert!(!meta("common", "LC").is_protected());
        assert!(!meta("common", "vu").is_protected());
    }

    #[test]
    fn test_invasive_is_case_sensitive() {
        assert!(meta("invasive", "LC").is_invasive());
        assert!(!meta("Invasive", "LC").is_invasive());
        assert!(!meta("INVASIVE", "LC").is_invasive());
    }

    #[test]
    fn test_covariate_str() {
        let sample = SampleRow {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "S1".to_string(),
            collection_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            latitude: 46.0,
            longitude: 8.0,
            environmental_data: serde_json::json!({"Station": "A", "Depth": 12}),
        };
        assert_eq!(sample.covariate_str("Station"), Some("A"));
        // Non-string covariates are not coerced
        assert_eq!(sample.covariate_str("Depth"), None);
        assert_eq!(sample.covariate_str("pH"), None);
    }
}
