//! eDNA Server Library
//!
//! HTTP service for environmental-DNA survey datasets.
//!
//! # Overview
//!
//! The server ingests the five loosely-coupled files of an eDNA survey
//! project (abundance matrix, sample metadata, FASTA sequences, taxonomy
//! table, species metadata), reconciles them into a relational store, and
//! serves derived ecological metrics:
//!
//! - **Parsing**: tab-separated tables and FASTA sequence files
//! - **Ingestion**: five-stage pipeline with cross-file key reconciliation
//! - **Aggregation**: richness, invasive/protected counts, Shannon
//!   diversity, per-station summaries, time series, recent findings
//! - **Storage Backend**: configurable byte store (local directory or
//!   S3-compatible object storage)
//!
//! # Architecture
//!
//! Feature modules are vertical slices: each carries its own commands
//! (write operations), queries (read operations), and Axum routes, with a
//! per-operation error enum. The ingestion pipeline and aggregation engine
//! are plain library code underneath those slices, so they can be driven and
//! tested without the HTTP layer.
//!
//! # Example
//!
//! ```no_run
//! use edna_server::ingest::{IngestPipeline, ProjectFiles};
//! use sqlx::PgPool;
//! use uuid::Uuid;
//!
//! async fn run(pool: PgPool, project_id: Uuid, files: ProjectFiles) -> anyhow::Result<()> {
//!     let pipeline = IngestPipeline::new(pool);
//!     let report = pipeline.ingest(project_id, &files, false).await?;
//!     println!("samples created: {}", report.samples.created);
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod api;
pub mod config;
pub mod db;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod parser;
pub mod storage;
