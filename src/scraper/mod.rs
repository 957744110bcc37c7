pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::storage::artifacts::{parsed_key, raw_key, ArtifactStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use self::http_client::HttpClient;
use self::parsers::parse_schedule_page;

// ── Fetch-one-date seam ───────────────────────────────────────────────────────

/// The per-date fetch collaborator. Retrieves and durably stores the raw and
/// parsed record for one date; idempotent, re-invocation overwrites.
#[async_trait]
pub trait DateScraper: Send + Sync {
    async fn scrape_date(&self, date: NaiveDate, force: bool) -> Result<FetchOutcome, FetchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOutcome {
    pub date: NaiveDate,
    pub games_count: usize,
}

// ── Schedule-site scraper ─────────────────────────────────────────────────────

pub struct ScheduleScraper {
    client: HttpClient,
    base_url: String,
    store: Arc<dyn ArtifactStore>,
}

impl ScheduleScraper {
    pub fn new(config: &ScraperConfig, store: Arc<dyn ArtifactStore>) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store,
        })
    }

    /// URL for the print-friendly daily schedule page.
    fn schedule_url(&self, date: NaiveDate) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}/schedule.aspx", self.base_url),
            &[("date", date.format("%m/%d/%Y").to_string()), ("print", "1".to_string())],
        )
        .context("Bad schedule URL")
    }

    async fn fetch_and_store(&self, date: NaiveDate) -> Result<FetchOutcome> {
        let url = self.schedule_url(date)?;
        debug!("Fetching schedule page: {}", url);

        let html = self
            .client
            .get_text(url.as_str())
            .await
            .with_context(|| format!("Failed to fetch schedule for {}", date))?;

        self.store
            .write(&raw_key(date), html.as_bytes())
            .with_context(|| format!("Failed to store raw page for {}", date))?;

        let games = parse_schedule_page(&html, date, chrono::Utc::now().naive_utc())?;

        let json = serde_json::to_vec_pretty(&games)
            .with_context(|| format!("Failed to serialize games for {}", date))?;
        self.store
            .write(&parsed_key(date), &json)
            .with_context(|| format!("Failed to store parsed games for {}", date))?;

        info!("{}: {} games", date, games.len());
        Ok(FetchOutcome { date, games_count: games.len() })
    }
}

#[async_trait]
impl DateScraper for ScheduleScraper {
    async fn scrape_date(&self, date: NaiveDate, force: bool) -> Result<FetchOutcome, FetchError> {
        if force {
            debug!("{}: force re-scrape, prior artifacts will be overwritten", date);
        }
        self.fetch_and_store(date).await.map_err(|e| FetchError {
            date,
            reason: format!("{:#}", e),
        })
    }
}
