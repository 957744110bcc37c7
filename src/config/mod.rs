use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_chunk_size_days")]
    pub max_chunk_size_days: i64,

    #[serde(default = "default_batch_size")]
    pub default_batch_size: u32,

    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    #[serde(default = "default_batch_retry_attempts")]
    pub batch_retry_attempts: usize,

    #[serde(default = "default_batch_retry_base_ms")]
    pub batch_retry_base_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://nc-soccer-hudson.ezleagues.ezfacility.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    "sched-backfill/0.1 (schedule archival; contact in repo)".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/sched.duckdb")
}
fn default_bucket() -> String {
    "data/artifacts".to_string()
}
fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/games.parquet")
}
fn default_true() -> bool {
    true
}
fn default_max_chunk_size_days() -> i64 {
    90
}
fn default_batch_size() -> u32 {
    3
}
fn default_max_concurrent_batches() -> usize {
    5
}
fn default_batch_retry_attempts() -> usize {
    3
}
fn default_batch_retry_base_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    5000
}
fn default_poll_timeout_secs() -> u64 {
    3600
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SCHED").separator("__"))
            .build()?;

        Ok(deserialize_or_default(cfg))
    }
}

fn deserialize_or_default(cfg: config::Config) -> AppConfig {
    match cfg.try_deserialize() {
        Ok(app) => app,
        Err(e) => {
            warn!("Invalid configuration ({}), falling back to defaults", e);
            AppConfig::default()
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bucket: default_bucket(),
            dataset_path: default_dataset_path(),
            run_migrations: true,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_chunk_size_days: default_max_chunk_size_days(),
            default_batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            batch_retry_attempts: default_batch_retry_attempts(),
            batch_retry_base_ms: default_batch_retry_base_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_deserialize_to_defaults() {
        let cfg = config::Config::builder().build().unwrap();
        let app: AppConfig = cfg.try_deserialize().unwrap();
        assert_eq!(app.orchestrator.max_chunk_size_days, 90);
        assert_eq!(app.orchestrator.default_batch_size, 3);
        assert_eq!(app.scraper.max_retries, 3);
        assert!(app.storage.run_migrations);
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let cfg = config::Config::builder()
            .set_override("orchestrator.max_chunk_size_days", 30i64)
            .unwrap()
            .build()
            .unwrap();
        let app = deserialize_or_default(cfg);
        assert_eq!(app.orchestrator.max_chunk_size_days, 30);
        assert_eq!(app.orchestrator.default_batch_size, 3);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let cfg = config::Config::builder()
            .set_override("orchestrator.max_chunk_size_days", "ninety")
            .unwrap()
            .build()
            .unwrap();
        let app = deserialize_or_default(cfg);
        assert_eq!(app.orchestrator.max_chunk_size_days, 90);
    }
}
