//! Build-dataset collaborator: parsed per-date artifacts → consolidated
//! columnar dataset.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{dates_between, Game};
use crate::storage::artifacts::{parsed_key, ArtifactStore};
use crate::storage::Repository;

#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub dates_loaded: usize,
    pub games_loaded: usize,
    pub output_path: PathBuf,
}

/// Consolidates a range of parsed artifacts into the analytics dataset.
/// Idempotent at the level of the whole dataset artifact.
pub trait DatasetBuilder: Send + Sync {
    fn build(&self, start: NaiveDate, end: NaiveDate) -> Result<DatasetSummary>;
}

// ── DuckDB implementation ─────────────────────────────────────────────────────

/// Loads every parsed JSON artifact in the range into the games table and
/// exports the range to Parquet.
pub struct DuckDbBuilder {
    repo: Arc<Repository>,
    store: Arc<dyn ArtifactStore>,
    output_path: PathBuf,
}

impl DuckDbBuilder {
    pub fn new(repo: Arc<Repository>, store: Arc<dyn ArtifactStore>, output_path: PathBuf) -> Self {
        Self { repo, store, output_path }
    }
}

impl DatasetBuilder for DuckDbBuilder {
    fn build(&self, start: NaiveDate, end: NaiveDate) -> Result<DatasetSummary> {
        info!("Building dataset for {} .. {}", start, end);

        let mut dates_loaded = 0usize;
        let mut games_loaded = 0usize;

        for date in dates_between(start, end) {
            let key = parsed_key(date);
            if !self.store.exists(&key) {
                debug!("{}: no parsed artifact, skipping", date);
                continue;
            }

            let bytes = self.store.read(&key)?;
            let games: Vec<Game> = serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt parsed artifact for {}", date))?;

            games_loaded += self.repo.upsert_games(&games)?;
            dates_loaded += 1;
        }

        self.repo
            .export_parquet(&self.output_path, start, end)
            .context("Dataset export failed")?;

        info!(
            "Dataset built: {} dates, {} games → {:?}",
            dates_loaded, games_loaded, self.output_path
        );
        Ok(DatasetSummary {
            dates_loaded,
            games_loaded,
            output_path: self.output_path.clone(),
        })
    }
}
