//! Five-stage ingestion pipeline
//!
//! Processing order, each stage committing before the next begins:
//!
//! 1. Samples from the metadata table
//! 2. OTUs from the FASTA sequence file
//! 3. Taxonomy rows (resolved against persisted OTUs)
//! 4. Abundance counts (resolved against persisted OTUs and samples)
//! 5. Species metadata (resolved via the taxonomy-derived species map)
//!
//! Stage atomicity only: an unrecoverable error rolls back the failing
//! stage and propagates, leaving earlier committed stages in place. The
//! caller retries the whole upload with `force=true`. A per-project
//! advisory lock keeps two ingestion runs for the same project from
//! interleaving; different projects never contend.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use edna_common::covariates::{infer_value, CovariateMap};

use super::{reconciler, IngestError};
use crate::parser::{self, FastaRecord, Matrix, ParseError, Table};

// Recognized sample-metadata columns; everything else is folded into the
// environmental covariate map verbatim.
const COL_SAMPLE_ID: &str = "SampleID";
const COL_SAMPLING_TIME: &str = "SamplingTime";
const COL_LATITUDE: &str = "Latitude";
const COL_LONGITUDE: &str = "Longitude";

const TAXONOMY_COLUMNS: [&str; 8] = [
    "OTU", "Kingdom", "Phylum", "Class", "Order", "Family", "Genus", "Species",
];

const COL_SPECIES: &str = "Species";
const COL_RED_LIST: &str = "RedListStatus";
const COL_INVASION: &str = "InvasionStatus";
const COL_NATIVE: &str = "NativeStatus";

/// Raw bytes of the five uploaded survey files.
#[derive(Debug, Clone, Default)]
pub struct ProjectFiles {
    pub otu_table: Vec<u8>,
    pub metadata: Vec<u8>,
    pub sequences: Vec<u8>,
    pub tax_table: Vec<u8>,
    pub taxa_metadata: Vec<u8>,
}

/// Created/skipped row counts for one pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageStats {
    pub created: u64,
    pub skipped: u64,
}

/// Per-stage outcome of a completed ingestion run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IngestReport {
    pub samples: StageStats,
    pub otus: StageStats,
    pub taxonomy: StageStats,
    pub otu_counts: StageStats,
    pub species_metadata: StageStats,
}

/// Orchestrates reconciliation and persistence across the five file types.
pub struct IngestPipeline {
    db: PgPool,
}

impl IngestPipeline {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn project_exists(&self, project_id: Uuid) -> Result<bool, sqlx::Error> {
        let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn has_data(&self, project_id: Uuid) -> Result<bool, sqlx::Error> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM otus WHERE project_id = $1 LIMIT 1")
                .bind(project_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(found.is_some())
    }

    /// Check that an ingest would be accepted, without writing anything.
    /// Callers use this to reject a run before archiving uploads; `ingest`
    /// repeats the same checks under the advisory lock, which remains the
    /// authoritative gate.
    pub async fn ensure_ready(
        &self,
        project_id: Uuid,
        force: bool,
    ) -> Result<(), IngestError> {
        if !self.project_exists(project_id).await? {
            return Err(IngestError::ProjectNotFound(project_id));
        }
        if !force && self.has_data(project_id).await? {
            return Err(IngestError::AlreadyIngested);
        }
        Ok(())
    }

    /// Ingest the five survey files into an existing project.
    ///
    /// Fails with `AlreadyIngested` when the project has prior data and
    /// `force` is false; with `force` the prior dataset is cleared first in
    /// a single transaction (cascade order: species_metadata, otu_counts,
    /// taxonomy, samples, otus).
    pub async fn ingest(
        &self,
        project_id: Uuid,
        files: &ProjectFiles,
        force: bool,
    ) -> Result<IngestReport, IngestError> {
        if !self.project_exists(project_id).await? {
            return Err(IngestError::ProjectNotFound(project_id));
        }

        // Hold a session advisory lock on a dedicated connection for the
        // whole run so concurrent ingestions of one project serialize.
        let lock_key = advisory_lock_key(project_id);
        let mut lock_conn = self.db.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(lock_key)
            .execute(&mut *lock_conn)
            .await?;

        let result = self.run(project_id, files, force).await;

        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(lock_key)
            .execute(&mut *lock_conn)
            .await
        {
            // The lock also releases when the connection closes.
            warn!(project_id = %project_id, error = %e, "failed to release ingest lock");
        }

        result
    }

    #[instrument(skip(self, files), fields(project_id = %project_id, force = force))]
    async fn run(
        &self,
        project_id: Uuid,
        files: &ProjectFiles,
        force: bool,
    ) -> Result<IngestReport, IngestError> {
        if self.has_data(project_id).await? {
            if force {
                info!("force flag set, clearing existing project data");
                self.clear_project_data(project_id).await?;
            } else {
                return Err(IngestError::AlreadyIngested);
            }
        }

        let mut report = IngestReport::default();

        info!("stage 1: samples from metadata");
        let metadata_table = parser::parse_table(&files.metadata)?;
        let new_samples = samples_from_table(&metadata_table)?;
        report.samples = self.persist_samples(project_id, &new_samples).await?;

        info!("stage 2: OTUs from sequences");
        let records = parser::parse_fasta(&files.sequences)?;
        report.otus = self.persist_otus(project_id, &records).await?;

        info!("stage 3: taxonomy");
        let tax_table = parser::parse_table(&files.tax_table)?;
        let tax_records = taxonomy_from_table(&tax_table)?;
        report.taxonomy = self.persist_taxonomy(project_id, &tax_records).await?;

        info!("stage 4: abundance counts");
        let matrix = parser::parse_matrix(&files.otu_table)?;
        report.otu_counts = self.persist_counts(project_id, &matrix).await?;

        info!("stage 5: species metadata");
        let species_table = parser::parse_table(&files.taxa_metadata)?;
        let species_records = species_from_table(&species_table)?;
        report.species_metadata = self
            .persist_species_metadata(project_id, &species_records)
            .await?;

        info!(
            samples = report.samples.created,
            otus = report.otus.created,
            taxonomy = report.taxonomy.created,
            counts = report.otu_counts.created,
            species = report.species_metadata.created,
            "ingestion completed"
        );

        Ok(report)
    }

    /// Delete all project data in FK-safe order, atomically. On failure the
    /// transaction rolls back and prior data stays intact.
    pub async fn clear_project_data(&self, project_id: Uuid) -> Result<(), IngestError> {
        let mut tx = self.db.begin().await?;

        match delete_project_rows(&mut tx, project_id).await {
            Ok(()) => tx.commit().await.map_err(IngestError::CleanupFailed)?,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(IngestError::CleanupFailed(e));
            },
        }

        info!(project_id = %project_id, "cleared existing project data");
        Ok(())
    }

    async fn persist_samples(
        &self,
        project_id: Uuid,
        samples: &[NewSample],
    ) -> Result<StageStats, IngestError> {
        let mut tx = self.db.begin().await?;
        let mut stats = StageStats::default();

        for sample in samples {
            sqlx::query(
                r#"
                INSERT INTO samples
                    (id, project_id, name, collection_date, latitude, longitude, environmental_data)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(project_id)
            .bind(&sample.name)
            .bind(sample.collection_date)
            .bind(sample.latitude)
            .bind(sample.longitude)
            .bind(serde_json::Value::Object(sample.environmental_data.clone()))
            .execute(&mut *tx)
            .await?;
            stats.created += 1;
        }

        tx.commit().await?;
        Ok(stats)
    }

    async fn persist_otus(
        &self,
        project_id: Uuid,
        records: &[FastaRecord],
    ) -> Result<StageStats, IngestError> {
        let mut tx = self.db.begin().await?;
        let mut stats = StageStats::default();

        for record in records {
            sqlx::query(
                "INSERT INTO otus (id, project_id, sequence_id, sequence) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(project_id)
            .bind(&record.id)
            .bind(&record.sequence)
            .execute(&mut *tx)
            .await?;
            stats.created += 1;
        }

        tx.commit().await?;
        Ok(stats)
    }

    async fn persist_taxonomy(
        &self,
        project_id: Uuid,
        records: &[TaxonomyRecord],
    ) -> Result<StageStats, IngestError> {
        let otus = reconciler::otu_map(&self.db, project_id).await?;

        let mut tx = self.db.begin().await?;
        let mut stats = StageStats::default();

        for record in records {
            let Some(otu_id) = otus.resolve(&record.otu_key) else {
                warn!(stage = "taxonomy", otu = %record.otu_key, "no matching OTU, row skipped");
                stats.skipped += 1;
                continue;
            };

            sqlx::query(
                r#"
                INSERT INTO taxonomy
                    (id, otu_id, kingdom, phylum, class, "order", family, genus, species)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(otu_id)
            .bind(&record.kingdom)
            .bind(&record.phylum)
            .bind(&record.class)
            .bind(&record.order)
            .bind(&record.family)
            .bind(&record.genus)
            .bind(&record.species)
            .execute(&mut *tx)
            .await?;
            stats.created += 1;
        }

        tx.commit().await?;

        if stats.created == 0 && stats.skipped > 0 {
            warn!(stage = "taxonomy", skipped = stats.skipped, "every row failed to resolve");
        }

        Ok(stats)
    }

    async fn persist_counts(
        &self,
        project_id: Uuid,
        matrix: &Matrix,
    ) -> Result<StageStats, IngestError> {
        let otus = reconciler::otu_map(&self.db, project_id).await?;
        let samples = reconciler::sample_map(&self.db, project_id).await?;

        let mut tx = self.db.begin().await?;
        let mut stats = StageStats::default();

        for (otu_key, sample_name, count) in nonzero_cells(matrix) {
            let Some(otu_id) = otus.resolve(otu_key) else {
                warn!(stage = "counts", otu = %otu_key, "OTU not found, cell skipped");
                stats.skipped += 1;
                continue;
            };
            let Some(sample_id) = samples.resolve(sample_name) else {
                warn!(stage = "counts", sample = %sample_name, "sample not found, cell skipped");
                stats.skipped += 1;
                continue;
            };

            sqlx::query(
                "INSERT INTO otu_counts (id, sample_id, otu_id, count) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(sample_id)
            .bind(otu_id)
            .bind(count as i32)
            .execute(&mut *tx)
            .await?;
            stats.created += 1;
        }

        tx.commit().await?;
        Ok(stats)
    }

    async fn persist_species_metadata(
        &self,
        project_id: Uuid,
        records: &[SpeciesRecord],
    ) -> Result<StageStats, IngestError> {
        let species = reconciler::species_map(&self.db, project_id).await?;

        let mut tx = self.db.begin().await?;
        let mut stats = StageStats::default();

        for record in records {
            let Some(otu_id) = species.resolve(&record.species) else {
                warn!(
                    stage = "species_metadata",
                    species = %record.species,
                    "no OTU resolved for species, row skipped"
                );
                stats.skipped += 1;
                continue;
            };

            sqlx::query(
                r#"
                INSERT INTO species_metadata
                    (id, otu_id, status, iucn_status, habitat_type, additional_info)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(otu_id)
            .bind(&record.status)
            .bind(&record.iucn_status)
            .bind(&record.habitat_type)
            .bind(serde_json::Value::Object(record.additional_info.clone()))
            .execute(&mut *tx)
            .await?;
            stats.created += 1;
        }

        tx.commit().await?;

        if stats.created == 0 && stats.skipped > 0 {
            warn!(
                stage = "species_metadata",
                skipped = stats.skipped,
                "every row failed to resolve"
            );
        }

        Ok(stats)
    }
}

async fn delete_project_rows(
    tx: &mut Transaction<'_, Postgres>,
    project_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "DELETE FROM species_metadata WHERE otu_id IN (SELECT id FROM otus WHERE project_id = $1)",
    )
    .bind(project_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "DELETE FROM otu_counts WHERE otu_id IN (SELECT id FROM otus WHERE project_id = $1)",
    )
    .bind(project_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "DELETE FROM taxonomy WHERE otu_id IN (SELECT id FROM otus WHERE project_id = $1)",
    )
    .bind(project_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM samples WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query("DELETE FROM otus WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Derive the advisory-lock key from the project id. Collisions across
/// projects would only serialize two unrelated ingests, never corrupt data.
fn advisory_lock_key(project_id: Uuid) -> i64 {
    let b = project_id.as_bytes();
    i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

// ============================================================================
// Pure stage extraction
// ============================================================================

/// A sample row extracted from the metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    pub name: String,
    pub collection_date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub environmental_data: CovariateMap,
}

/// A taxonomy row keyed by its file-level OTU identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyRecord {
    pub otu_key: String,
    pub kingdom: String,
    pub phylum: String,
    pub class: String,
    pub order: String,
    pub family: String,
    pub genus: String,
    pub species: String,
}

/// A species-metadata row keyed by taxonomic species name.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesRecord {
    pub species: String,
    pub status: String,
    pub iucn_status: String,
    pub habitat_type: String,
    pub additional_info: CovariateMap,
}

/// Extract sample rows. The four recognized columns are parsed; every other
/// column is preserved verbatim, in file order, in the covariate map.
pub fn samples_from_table(table: &Table) -> Result<Vec<NewSample>, ParseError> {
    let id_col = table.require_column(COL_SAMPLE_ID)?;
    let time_col = table.require_column(COL_SAMPLING_TIME)?;
    let lat_col = table.require_column(COL_LATITUDE)?;
    let lon_col = table.require_column(COL_LONGITUDE)?;
    let recognized = [id_col, time_col, lat_col, lon_col];

    let mut samples = Vec::with_capacity(table.rows.len());
    for (row_num, row) in table.rows.iter().enumerate() {
        let collection_date = NaiveDate::parse_from_str(&row[time_col], "%Y-%m-%d")
            .map_err(|_| invalid(row_num, COL_SAMPLING_TIME, &row[time_col]))?;
        let latitude: f64 = row[lat_col]
            .parse()
            .map_err(|_| invalid(row_num, COL_LATITUDE, &row[lat_col]))?;
        let longitude: f64 = row[lon_col]
            .parse()
            .map_err(|_| invalid(row_num, COL_LONGITUDE, &row[lon_col]))?;

        let mut environmental_data = CovariateMap::new();
        for (col, value) in row.iter().enumerate() {
            if !recognized.contains(&col) {
                environmental_data.insert(table.columns[col].clone(), infer_value(value));
            }
        }

        samples.push(NewSample {
            name: row[id_col].clone(),
            collection_date,
            latitude,
            longitude,
            environmental_data,
        });
    }

    Ok(samples)
}

/// Extract taxonomy rows from the taxonomy table.
pub fn taxonomy_from_table(table: &Table) -> Result<Vec<TaxonomyRecord>, ParseError> {
    let mut cols = [0usize; 8];
    for (i, name) in TAXONOMY_COLUMNS.iter().enumerate() {
        cols[i] = table.require_column(name)?;
    }

    Ok(table
        .rows
        .iter()
        .map(|row| TaxonomyRecord {
            otu_key: row[cols[0]].clone(),
            kingdom: row[cols[1]].clone(),
            phylum: row[cols[2]].clone(),
            class: row[cols[3]].clone(),
            order: row[cols[4]].clone(),
            family: row[cols[5]].clone(),
            genus: row[cols[6]].clone(),
            species: row[cols[7]].clone(),
        })
        .collect())
}

/// Extract species-metadata rows. The invasion status is stored lowercased
/// ("Invasive" in the files, "invasive" in the aggregation predicate); any
/// column beyond the four recognized ones lands in `additional_info`.
pub fn species_from_table(table: &Table) -> Result<Vec<SpeciesRecord>, ParseError> {
    let species_col = table.require_column(COL_SPECIES)?;
    let red_list_col = table.require_column(COL_RED_LIST)?;
    let invasion_col = table.require_column(COL_INVASION)?;
    let native_col = table.require_column(COL_NATIVE)?;
    let recognized = [species_col, red_list_col, invasion_col, native_col];

    Ok(table
        .rows
        .iter()
        .map(|row| {
            let mut additional_info = CovariateMap::new();
            for (col, value) in row.iter().enumerate() {
                if !recognized.contains(&col) {
                    additional_info.insert(table.columns[col].clone(), infer_value(value));
                }
            }

            SpeciesRecord {
                species: row[species_col].clone(),
                status: row[invasion_col].to_lowercase(),
                iucn_status: row[red_list_col].clone(),
                habitat_type: row[native_col].clone(),
                additional_info,
            }
        })
        .collect())
}

/// Iterate the non-zero cells of the abundance matrix as
/// `(otu identifier, sample name, count)`. Zero cells are dropped here, so
/// the dense input becomes the sparse persisted representation.
pub fn nonzero_cells(matrix: &Matrix) -> impl Iterator<Item = (&str, &str, u32)> {
    matrix.cells.iter().enumerate().flat_map(move |(i, row)| {
        row.iter().enumerate().filter_map(move |(j, &count)| {
            (count > 0).then(|| {
                (
                    matrix.row_ids[i].as_str(),
                    matrix.sample_names[j].as_str(),
                    count,
                )
            })
        })
    })
}

fn invalid(row_num: usize, column: &str, value: &str) -> ParseError {
    ParseError::InvalidValue {
        row: row_num + 1,
        column: column.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_matrix, parse_table};

    #[test]
    fn test_samples_extraction_folds_extra_columns() {
        let table = parse_table(
            b"SampleID\tSamplingTime\tLatitude\tLongitude\tStation\tpH\nS1\t2023-01-01\t46.0\t8.0\tA\t7.2\n",
        )
        .unwrap();
        let samples = samples_from_table(&table).unwrap();

        assert_eq!(samples.len(), 1);
        let s = &samples[0];
        assert_eq!(s.name, "S1");
        assert_eq!(s.collection_date, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(s.latitude, 46.0);
        assert_eq!(s.longitude, 8.0);

        let keys: Vec<_> = s.environmental_data.keys().cloned().collect();
        assert_eq!(keys, vec!["Station", "pH"]);
        assert_eq!(s.environmental_data["Station"], serde_json::json!("A"));
        assert_eq!(s.environmental_data["pH"], serde_json::json!(7.2));
    }

    #[test]
    fn test_samples_extraction_requires_recognized_columns() {
        let table = parse_table(b"SampleID\tLatitude\tLongitude\nS1\t46.0\t8.0\n").unwrap();
        assert!(matches!(
            samples_from_table(&table),
            Err(ParseError::MissingColumn(name)) if name == "SamplingTime"
        ));
    }

    #[test]
    fn test_samples_extraction_rejects_bad_date() {
        let table = parse_table(
            b"SampleID\tSamplingTime\tLatitude\tLongitude\nS1\t01/02/2023\t46.0\t8.0\n",
        )
        .unwrap();
        assert!(matches!(
            samples_from_table(&table),
            Err(ParseError::InvalidValue { ref column, .. }) if column == "SamplingTime"
        ));
    }

    #[test]
    fn test_taxonomy_extraction() {
        let table = parse_table(
            b"OTU\tKingdom\tPhylum\tClass\tOrder\tFamily\tGenus\tSpecies\nOTU1\tAnimalia\tChordata\tActinopterygii\tCypriniformes\tCyprinidae\tCyprinus\tCyprinus carpio\n",
        )
        .unwrap();
        let records = taxonomy_from_table(&table).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].otu_key, "OTU1");
        assert_eq!(records[0].species, "Cyprinus carpio");
        assert_eq!(records[0].order, "Cypriniformes");
    }

    #[test]
    fn test_species_extraction_lowercases_invasion_status() {
        let table = parse_table(
            b"Species\tRedListStatus\tInvasionStatus\tNativeStatus\nSp1\tLC\tInvasive\tNon-native\nSp2\tVU\tNon-invasive\tNative\n",
        )
        .unwrap();
        let records = species_from_table(&table).unwrap();
        assert_eq!(records[0].status, "invasive");
        assert_eq!(records[1].status, "non-invasive");
        assert_eq!(records[1].iucn_status, "VU");
        assert_eq!(records[1].habitat_type, "Native");
    }

    #[test]
    fn test_species_extraction_folds_extra_columns() {
        let table = parse_table(
            b"Species\tRedListStatus\tInvasionStatus\tNativeStatus\tTrophicLevel\nSp1\tLC\tNon-invasive\tNative\t3\n",
        )
        .unwrap();
        let records = species_from_table(&table).unwrap();
        assert_eq!(records[0].additional_info["TrophicLevel"], serde_json::json!(3));
    }

    #[test]
    fn test_nonzero_cells_drop_zeroes() {
        let matrix =
            parse_matrix(b"OTU_ID\tS1\tS2\nOTU1\t10\t0\nOTU2\t0\t5\n").unwrap();
        let cells: Vec<_> = nonzero_cells(&matrix).collect();
        assert_eq!(cells, vec![("OTU1", "S1", 10), ("OTU2", "S2", 5)]);
    }

    #[test]
    fn test_advisory_lock_key_is_stable() {
        let id = Uuid::new_v4();
        assert_eq!(advisory_lock_key(id), advisory_lock_key(id));
    }
}
