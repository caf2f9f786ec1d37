//! Aggregation engine
//!
//! # Overview
//!
//! Computes the reporting summary for a project: richness and conservation
//! metrics, per-station spatial summaries, per-OTU abundance rows, a daily
//! time series with Shannon diversity, and the five most recent
//! invasive/protected findings.
//!
//! All reads happen up front in [`compute_project_summary`]; the derivation
//! itself is the pure [`build_summary`], which keeps every metric unit
//! testable without a database.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{OtuCountRow, OtuRow, SampleRow, SpeciesMetadataRow, TaxonomyRow};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Headline metrics for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub species_richness: u64,
    pub invasive_species: u64,
    pub protected_species: u64,
}

/// A recent invasive or protected detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    pub species: String,
    pub date: String,
}

/// Distinct-species count and Shannon diversity for one collection date.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub date: String,
    pub species_count: u64,
    pub diversity: f64,
}

/// Spatial summary for one sampling station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub samples: u64,
    pub total_observations: u64,
    pub first_date: String,
    pub last_date: String,
}

/// Per-OTU reporting row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtuSummary {
    pub species: String,
    pub status: String,
    pub abundance: i64,
    pub location: String,
}

/// The complete reporting payload for one project.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub metrics: Metrics,
    pub recent_findings: Vec<Finding>,
    pub time_series_data: Vec<TimeSeriesPoint>,
    pub location_data: Vec<StationSummary>,
    pub otu_data: Vec<OtuSummary>,
}

/// Everything the summary derivation needs, fetched in one pass.
#[derive(Debug, Clone, Default)]
pub struct ProjectDataset {
    pub samples: Vec<SampleRow>,
    pub otus: Vec<OtuRow>,
    pub counts: Vec<OtuCountRow>,
    pub taxonomy: Vec<TaxonomyRow>,
    pub species_metadata: Vec<SpeciesMetadataRow>,
}

/// Load the project's rows and derive its summary. Read-only.
#[instrument(skip(db), fields(project_id = %project_id))]
pub async fn compute_project_summary(
    db: &PgPool,
    project_id: Uuid,
) -> Result<ProjectSummary, SummaryError> {
    let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(db)
        .await?;
    if exists.is_none() {
        return Err(SummaryError::ProjectNotFound(project_id));
    }

    let dataset = fetch_dataset(db, project_id).await?;
    Ok(build_summary(&dataset))
}

async fn fetch_dataset(db: &PgPool, project_id: Uuid) -> Result<ProjectDataset, sqlx::Error> {
    let samples: Vec<SampleRow> = sqlx::query_as(
        r#"
        SELECT id, project_id, name, collection_date, latitude, longitude, environmental_data
        FROM samples
        WHERE project_id = $1
        ORDER BY collection_date, name
        "#,
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;

    let otus: Vec<OtuRow> = sqlx::query_as(
        "SELECT id, project_id, sequence_id, sequence FROM otus WHERE project_id = $1 ORDER BY sequence_id",
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;

    let counts: Vec<OtuCountRow> = sqlx::query_as(
        r#"
        SELECT id, sample_id, otu_id, count
        FROM otu_counts
        WHERE otu_id IN (SELECT id FROM otus WHERE project_id = $1)
        "#,
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;

    let taxonomy: Vec<TaxonomyRow> = sqlx::query_as(
        r#"
        SELECT id, otu_id, kingdom, phylum, class, "order", family, genus, species
        FROM taxonomy
        WHERE otu_id IN (SELECT id FROM otus WHERE project_id = $1)
        "#,
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;

    let species_metadata: Vec<SpeciesMetadataRow> = sqlx::query_as(
        r#"
        SELECT id, otu_id, status, iucn_status, habitat_type, additional_info
        FROM species_metadata
        WHERE otu_id IN (SELECT id FROM otus WHERE project_id = $1)
        "#,
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;

    Ok(ProjectDataset {
        samples,
        otus,
        counts,
        taxonomy,
        species_metadata,
    })
}

/// Derive the full summary from an in-memory dataset.
///
/// Expects `samples` ordered by `(collection_date, name)` and `otus` by
/// `sequence_id`; the fetch above guarantees both, and the ordering is what
/// makes station grouping and the time series deterministic.
pub fn build_summary(dataset: &ProjectDataset) -> ProjectSummary {
    let taxonomy_by_otu: HashMap<Uuid, &TaxonomyRow> =
        dataset.taxonomy.iter().map(|t| (t.otu_id, t)).collect();
    let metadata_by_otu: HashMap<Uuid, &SpeciesMetadataRow> =
        dataset.species_metadata.iter().map(|m| (m.otu_id, m)).collect();
    let sample_by_id: HashMap<Uuid, &SampleRow> =
        dataset.samples.iter().map(|s| (s.id, s)).collect();

    let mut counts_by_otu: HashMap<Uuid, Vec<&OtuCountRow>> = HashMap::new();
    let mut counts_by_sample: HashMap<Uuid, Vec<&OtuCountRow>> = HashMap::new();
    for count in &dataset.counts {
        counts_by_otu.entry(count.otu_id).or_default().push(count);
        counts_by_sample.entry(count.sample_id).or_default().push(count);
    }

    let metrics = Metrics {
        species_richness: dataset.otus.len() as u64,
        invasive_species: dataset
            .species_metadata
            .iter()
            .filter(|m| m.is_invasive())
            .count() as u64,
        protected_species: dataset
            .species_metadata
            .iter()
            .filter(|m| m.is_protected())
            .count() as u64,
    };

    let location_data = build_location_data(&dataset.samples, &counts_by_sample);
    let otu_data = build_otu_data(
        &dataset.otus,
        &dataset.samples,
        &taxonomy_by_otu,
        &metadata_by_otu,
        &counts_by_otu,
    );
    // Per-date values come from one sample, not a union across same-date
    // samples; see build_time_series.
    let time_series_data = build_time_series(&dataset.samples, &counts_by_sample);
    let recent_findings = build_recent_findings(
        &dataset.otus,
        &taxonomy_by_otu,
        &metadata_by_otu,
        &counts_by_otu,
        &sample_by_id,
    );

    ProjectSummary {
        metrics,
        recent_findings,
        time_series_data,
        location_data,
        otu_data,
    }
}

/// Group samples by their "Station" covariate, first-seen order. Samples
/// without the covariate are excluded from this summary only. Latitude and
/// longitude come from the station's first sample; co-located samples are
/// assumed to share coordinates.
fn build_location_data(
    samples: &[SampleRow],
    counts_by_sample: &HashMap<Uuid, Vec<&OtuCountRow>>,
) -> Vec<StationSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&SampleRow>> = HashMap::new();

    for sample in samples {
        if let Some(station) = sample.covariate_str("Station") {
            let group = groups.entry(station.to_string()).or_insert_with(|| {
                order.push(station.to_string());
                Vec::new()
            });
            group.push(sample);
        }
    }

    order
        .into_iter()
        .map(|name| {
            let members = &groups[&name];
            let first = members[0];
            let total_observations: u64 = members
                .iter()
                .map(|s| counts_by_sample.get(&s.id).map_or(0, |c| c.len() as u64))
                .sum();
            let first_date = members.iter().map(|s| s.collection_date).min();
            let last_date = members.iter().map(|s| s.collection_date).max();

            StationSummary {
                name,
                latitude: first.latitude,
                longitude: first.longitude,
                samples: members.len() as u64,
                total_observations,
                first_date: format_date(first_date),
                last_date: format_date(last_date),
            }
        })
        .collect()
}

fn build_otu_data(
    otus: &[OtuRow],
    samples: &[SampleRow],
    taxonomy_by_otu: &HashMap<Uuid, &TaxonomyRow>,
    metadata_by_otu: &HashMap<Uuid, &SpeciesMetadataRow>,
    counts_by_otu: &HashMap<Uuid, Vec<&OtuCountRow>>,
) -> Vec<OtuSummary> {
    otus.iter()
        .map(|otu| {
            let otu_counts = counts_by_otu.get(&otu.id);
            let abundance: i64 = otu_counts
                .map_or(0, |counts| counts.iter().map(|c| c.count as i64).sum());

            let status = match metadata_by_otu.get(&otu.id) {
                Some(m) if m.is_invasive() => "invasive",
                Some(m) if m.is_protected() => "protected",
                _ => "normal",
            };

            // Sample names where the OTU was observed, in collection order,
            // deduplicated.
            let mut locations: Vec<&str> = Vec::new();
            if let Some(counts) = otu_counts {
                for sample in samples {
                    if counts.iter().any(|c| c.sample_id == sample.id)
                        && !locations.contains(&sample.name.as_str())
                    {
                        locations.push(&sample.name);
                    }
                }
            }

            OtuSummary {
                species: taxonomy_by_otu
                    .get(&otu.id)
                    .map_or_else(|| "Unknown".to_string(), |t| t.species.clone()),
                status: status.to_string(),
                abundance,
                location: locations.join(", "),
            }
        })
        .collect()
}

/// One point per distinct collection date, ascending. When several samples
/// share a date, the last one in sample order supplies both values.
fn build_time_series(
    samples: &[SampleRow],
    counts_by_sample: &HashMap<Uuid, Vec<&OtuCountRow>>,
) -> Vec<TimeSeriesPoint> {
    let mut by_date: BTreeMap<NaiveDate, (u64, f64)> = BTreeMap::new();

    for sample in samples {
        let counts = counts_by_sample
            .get(&sample.id)
            .map_or(&[][..], |c| c.as_slice());
        let species_count = counts.len() as u64;
        let values: Vec<i64> = counts.iter().map(|c| c.count as i64).collect();
        by_date.insert(sample.collection_date, (species_count, shannon_diversity(&values)));
    }

    by_date
        .into_iter()
        .map(|(date, (species_count, diversity))| TimeSeriesPoint {
            date: date.format(DATE_FORMAT).to_string(),
            species_count,
            diversity,
        })
        .collect()
}

fn build_recent_findings(
    otus: &[OtuRow],
    taxonomy_by_otu: &HashMap<Uuid, &TaxonomyRow>,
    metadata_by_otu: &HashMap<Uuid, &SpeciesMetadataRow>,
    counts_by_otu: &HashMap<Uuid, Vec<&OtuCountRow>>,
    sample_by_id: &HashMap<Uuid, &SampleRow>,
) -> Vec<Finding> {
    let mut findings: Vec<(NaiveDate, Finding)> = Vec::new();

    for otu in otus {
        let Some(meta) = metadata_by_otu.get(&otu.id) else {
            continue;
        };
        if !meta.is_invasive() && !meta.is_protected() {
            continue;
        }

        let latest = counts_by_otu
            .get(&otu.id)
            .into_iter()
            .flatten()
            .filter_map(|c| sample_by_id.get(&c.sample_id))
            .map(|s| s.collection_date)
            .max();
        let Some(latest) = latest else {
            // Never observed in any sample.
            continue;
        };

        let kind = if meta.is_invasive() { "invasive" } else { "protected" };
        findings.push((
            latest,
            Finding {
                kind: kind.to_string(),
                species: taxonomy_by_otu
                    .get(&otu.id)
                    .map_or_else(|| "Unknown species".to_string(), |t| t.species.clone()),
                date: latest.format(DATE_FORMAT).to_string(),
            },
        ));
    }

    findings.sort_by(|a, b| b.0.cmp(&a.0));
    findings.truncate(5);
    findings.into_iter().map(|(_, f)| f).collect()
}

/// Shannon diversity index H = -Σ pᵢ·ln(pᵢ), natural log, rounded to three
/// decimal places. Zero-count entries contribute nothing; an empty or
/// all-zero slice yields 0.0.
pub fn shannon_diversity(counts: &[i64]) -> f64 {
    let total: i64 = counts.iter().sum();
    if total <= 0 {
        return 0.0;
    }

    let h: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.ln()
        })
        .sum();

    (h * 1000.0).round() / 1000.0
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}
