//! Ingestion pipeline integration tests
//!
//! These tests require a PostgreSQL database to be running.
//! Run with: cargo test --test ingest_integration_test -- --ignored --nocapture

use sqlx::PgPool;
use uuid::Uuid;

use edna_server::aggregate;
use edna_server::features::projects::commands::ingest::{
    handle as handle_ingest, IngestProjectCommand, IngestProjectError,
};
use edna_server::ingest::{IngestError, IngestPipeline, ProjectFiles};
use edna_server::storage::{Storage, StorageConfig};

/// Helper to create a test database pool
async fn create_test_pool() -> PgPool {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/edna_test".to_string());

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Helper to create a test project
async fn create_test_project(pool: &PgPool) -> Uuid {
    let project_id = Uuid::new_v4();
    sqlx::query("INSERT INTO projects (id, name) VALUES ($1, $2)")
        .bind(project_id)
        .bind(format!("test-project-{project_id}"))
        .execute(pool)
        .await
        .expect("Failed to create test project");
    project_id
}

/// Helper to cleanup test data
async fn cleanup_test_project(pool: &PgPool, project_id: Uuid) {
    let pipeline = IngestPipeline::new(pool.clone());
    let _ = pipeline.clear_project_data(project_id).await;
    let _ = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(pool)
        .await;
}

/// The two-sample survey from the reporting scenario: OTU1 only in S1,
/// OTU2 only in S2, Sp1 marked invasive.
fn sample_survey() -> ProjectFiles {
    ProjectFiles {
        otu_table: b"OTU_ID\tS1\tS2\nOTU1\t10\t0\nOTU2\t0\t5\n".to_vec(),
        metadata: b"SampleID\tSamplingTime\tLatitude\tLongitude\tStation\nS1\t2023-01-01\t46.0\t8.0\tA\nS2\t2023-01-02\t46.0\t8.0\tA\n".to_vec(),
        sequences: b">OTU1\nACGTACGT\n>OTU2\nTTGGCCAA\n".to_vec(),
        tax_table: b"OTU\tKingdom\tPhylum\tClass\tOrder\tFamily\tGenus\tSpecies\nOTU1\tAnimalia\tChordata\tA\tB\tC\tD\tSp1\nOTU2\tAnimalia\tChordata\tA\tB\tC\tD\tSp2\n".to_vec(),
        taxa_metadata: b"Species\tRedListStatus\tInvasionStatus\tNativeStatus\nSp1\tLC\tInvasive\tNon-native\nSp2\tLC\tNon-invasive\tNative\n".to_vec(),
    }
}

async fn count_rows(pool: &PgPool, table: &str, project_id: Uuid) -> i64 {
    let query = match table {
        "samples" => "SELECT COUNT(*) FROM samples WHERE project_id = $1".to_string(),
        "otus" => "SELECT COUNT(*) FROM otus WHERE project_id = $1".to_string(),
        other => format!(
            "SELECT COUNT(*) FROM {other} WHERE otu_id IN (SELECT id FROM otus WHERE project_id = $1)"
        ),
    };
    sqlx::query_scalar(&query)
        .bind(project_id)
        .fetch_one(pool)
        .await
        .expect("count query failed")
}

#[tokio::test]
#[ignore] // Requires database
async fn test_full_ingest_roundtrip() {
    let pool = create_test_pool().await;
    let project_id = create_test_project(&pool).await;
    let pipeline = IngestPipeline::new(pool.clone());

    let report = pipeline
        .ingest(project_id, &sample_survey(), false)
        .await
        .expect("ingest failed");

    assert_eq!(report.samples.created, 2);
    assert_eq!(report.otus.created, 2);
    assert_eq!(report.taxonomy.created, 2);
    // Zero cells are dropped
    assert_eq!(report.otu_counts.created, 2);
    assert_eq!(report.species_metadata.created, 2);

    assert_eq!(count_rows(&pool, "otu_counts", project_id).await, 2);

    cleanup_test_project(&pool, project_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_reingest_without_force_fails() {
    let pool = create_test_pool().await;
    let project_id = create_test_project(&pool).await;
    let pipeline = IngestPipeline::new(pool.clone());

    pipeline
        .ingest(project_id, &sample_survey(), false)
        .await
        .expect("first ingest failed");

    let err = pipeline
        .ingest(project_id, &sample_survey(), false)
        .await
        .expect_err("second ingest should fail");
    assert!(matches!(err, IngestError::AlreadyIngested));

    // Dataset unchanged
    assert_eq!(count_rows(&pool, "samples", project_id).await, 2);
    assert_eq!(count_rows(&pool, "otu_counts", project_id).await, 2);

    cleanup_test_project(&pool, project_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_rejected_reingest_preserves_archive() {
    let pool = create_test_pool().await;
    let project_id = create_test_project(&pool).await;

    let dir = tempfile::tempdir().expect("tempdir failed");
    let storage = Storage::from_config(&StorageConfig::for_local(dir.path()));

    let first = sample_survey();
    handle_ingest(
        pool.clone(),
        storage.clone(),
        IngestProjectCommand {
            project_id,
            files: first.clone(),
            force: false,
        },
    )
    .await
    .expect("first ingest failed");

    // Second upload carries different bytes and must be rejected before
    // anything reaches the byte store
    let mut second = sample_survey();
    second.sequences = b">OTU8\nCCCC\n".to_vec();
    let err = handle_ingest(
        pool.clone(),
        storage.clone(),
        IngestProjectCommand {
            project_id,
            files: second,
            force: false,
        },
    )
    .await
    .expect_err("second ingest should fail");
    assert!(matches!(
        err,
        IngestProjectError::Pipeline(IngestError::AlreadyIngested)
    ));

    // The archive still holds the original upload
    let key = storage.build_project_key(project_id, "sequences.fasta");
    let archived = storage.download(&key).await.expect("download failed");
    assert_eq!(archived, first.sequences);

    cleanup_test_project(&pool, project_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_forced_reingest_replaces_dataset() {
    let pool = create_test_pool().await;
    let project_id = create_test_project(&pool).await;
    let pipeline = IngestPipeline::new(pool.clone());

    pipeline
        .ingest(project_id, &sample_survey(), false)
        .await
        .expect("first ingest failed");

    // Smaller replacement survey with a single OTU
    let replacement = ProjectFiles {
        otu_table: b"OTU_ID\tS1\nOTU9\t7\n".to_vec(),
        metadata: b"SampleID\tSamplingTime\tLatitude\tLongitude\nS1\t2024-06-01\t47.0\t9.0\n"
            .to_vec(),
        sequences: b">OTU9\nGGGG\n".to_vec(),
        tax_table: b"OTU\tKingdom\tPhylum\tClass\tOrder\tFamily\tGenus\tSpecies\nOTU9\tAnimalia\tChordata\tA\tB\tC\tD\tSp9\n".to_vec(),
        taxa_metadata: b"Species\tRedListStatus\tInvasionStatus\tNativeStatus\nSp9\tLC\tNon-invasive\tNative\n".to_vec(),
    };

    let report = pipeline
        .ingest(project_id, &replacement, true)
        .await
        .expect("forced ingest failed");

    assert_eq!(report.otus.created, 1);
    // No residue from the prior dataset
    assert_eq!(count_rows(&pool, "samples", project_id).await, 1);
    assert_eq!(count_rows(&pool, "otus", project_id).await, 1);
    assert_eq!(count_rows(&pool, "otu_counts", project_id).await, 1);
    assert_eq!(count_rows(&pool, "taxonomy", project_id).await, 1);
    assert_eq!(count_rows(&pool, "species_metadata", project_id).await, 1);

    cleanup_test_project(&pool, project_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_unknown_matrix_keys_are_skipped() {
    let pool = create_test_pool().await;
    let project_id = create_test_project(&pool).await;
    let pipeline = IngestPipeline::new(pool.clone());

    let mut files = sample_survey();
    // S3 never appears in the metadata; OTU3 never appears in the sequences
    files.otu_table =
        b"OTU_ID\tS1\tS2\tS3\nOTU1\t10\t0\t4\nOTU2\t0\t5\t0\nOTU3\t1\t1\t1\n".to_vec();

    let report = pipeline
        .ingest(project_id, &files, false)
        .await
        .expect("ingest failed");

    assert_eq!(report.otu_counts.created, 2);
    assert_eq!(report.otu_counts.skipped, 4);
    assert_eq!(count_rows(&pool, "otu_counts", project_id).await, 2);

    cleanup_test_project(&pool, project_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_ingest_unknown_project_fails() {
    let pool = create_test_pool().await;
    let pipeline = IngestPipeline::new(pool.clone());

    let err = pipeline
        .ingest(Uuid::new_v4(), &sample_survey(), false)
        .await
        .expect_err("ingest of unknown project should fail");
    assert!(matches!(err, IngestError::ProjectNotFound(_)));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_summary_after_ingest() {
    let pool = create_test_pool().await;
    let project_id = create_test_project(&pool).await;
    let pipeline = IngestPipeline::new(pool.clone());

    pipeline
        .ingest(project_id, &sample_survey(), false)
        .await
        .expect("ingest failed");

    let summary = aggregate::compute_project_summary(&pool, project_id)
        .await
        .expect("summary failed");

    assert_eq!(summary.metrics.species_richness, 2);
    // Sp1 was marked "Invasive" in the file; the match is on the
    // normalized lowercase form
    assert_eq!(summary.metrics.invasive_species, 1);
    assert_eq!(summary.metrics.protected_species, 0);

    let first = &summary.time_series_data[0];
    assert_eq!(first.date, "2023-01-01");
    assert_eq!(first.species_count, 1);
    assert_eq!(first.diversity, 0.0);

    assert_eq!(summary.location_data.len(), 1);
    assert_eq!(summary.location_data[0].name, "A");

    cleanup_test_project(&pool, project_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_summary_unknown_project_fails() {
    let pool = create_test_pool().await;

    let err = aggregate::compute_project_summary(&pool, Uuid::new_v4())
        .await
        .expect_err("summary of unknown project should fail");
    assert!(matches!(
        err,
        aggregate::SummaryError::ProjectNotFound(_)
    ));
}
