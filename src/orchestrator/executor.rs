//! Batch executor: process one batch of dates, strictly in date order.
//!
//! Sequential within a batch keeps the request rate against the upstream
//! site bounded and predictable; parallelism lives at the batch level.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{Batch, CheckpointRecord, CheckpointStatus, DateRangeRequest};
use crate::scraper::DateScraper;
use crate::storage::Repository;

/// Per-batch result. Per-date fetch failures land in `failed`; they never
/// abort the batch. Only infrastructure faults (checkpoint store unreachable)
/// error out, and those are retried by the orchestrator as a whole batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub processed: Vec<NaiveDate>,
    pub skipped: Vec<NaiveDate>,
    pub failed: Vec<(NaiveDate, String)>,
}

pub struct BatchExecutor {
    repo: Arc<Repository>,
    scraper: Arc<dyn DateScraper>,
}

impl BatchExecutor {
    pub fn new(repo: Arc<Repository>, scraper: Arc<dyn DateScraper>) -> Self {
        Self { repo, scraper }
    }

    pub async fn run_batch(
        &self,
        batch: &Batch,
        req: &DateRangeRequest,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for &date in &batch.dates {
            // Skip decision comes from the checkpoint store, not from memory.
            if !req.force_scrape {
                if let Some(record) = self.repo.get_checkpoint(date)? {
                    if record.status == CheckpointStatus::Success {
                        debug!("{}: already scraped ({} games), skipping", date, record.games_count);
                        outcome.skipped.push(date);
                        continue;
                    }
                }
            }

            match self.scraper.scrape_date(date, req.force_scrape).await {
                Ok(fetch) => {
                    self.repo.upsert_checkpoint(&CheckpointRecord {
                        date,
                        status: CheckpointStatus::Success,
                        games_count: fetch.games_count as i64,
                        error: None,
                        processed_at: Utc::now().naive_utc(),
                    })?;
                    outcome.processed.push(date);
                }
                Err(e) => {
                    // Recorded, not dropped: verification must be able to tell
                    // "attempted and failed" from "never attempted".
                    warn!("{}: {:#}", date, e);
                    self.repo.upsert_checkpoint(&CheckpointRecord {
                        date,
                        status: CheckpointStatus::Failed,
                        games_count: 0,
                        error: Some(e.reason.clone()),
                        processed_at: Utc::now().naive_utc(),
                    })?;
                    outcome.failed.push((date, e.reason));
                }
            }
        }

        info!(
            "Batch {} .. {}: {} processed, {} skipped, {} failed",
            batch.start(),
            batch.end(),
            outcome.processed.len(),
            outcome.skipped.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::dates_between;
    use crate::scraper::FetchOutcome;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeScraper {
        fail_dates: HashSet<NaiveDate>,
        calls: Mutex<Vec<NaiveDate>>,
    }

    impl FakeScraper {
        fn new(fail: &[&str]) -> Self {
            Self {
                fail_dates: fail.iter().map(|s| s.parse().unwrap()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<NaiveDate> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DateScraper for FakeScraper {
        async fn scrape_date(&self, date: NaiveDate, _force: bool) -> Result<FetchOutcome, FetchError> {
            self.calls.lock().unwrap().push(date);
            if self.fail_dates.contains(&date) {
                Err(FetchError { date, reason: "simulated upstream error".into() })
            } else {
                Ok(FetchOutcome { date, games_count: 2 })
            }
        }
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn req(force: bool) -> DateRangeRequest {
        DateRangeRequest {
            start_date: d("2024-03-01"),
            end_date: d("2024-03-03"),
            force_scrape: force,
            batch_size: 3,
            bucket: "data".into(),
            architecture_version: "v2".into(),
            is_sub_execution: false,
        }
    }

    fn batch() -> Batch {
        Batch { dates: dates_between(d("2024-03-01"), d("2024-03-03")) }
    }

    fn repo() -> Arc<Repository> {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        Arc::new(repo)
    }

    #[tokio::test]
    async fn processes_dates_in_order_and_checkpoints() {
        let repo = repo();
        let scraper = Arc::new(FakeScraper::new(&[]));
        let exec = BatchExecutor::new(Arc::clone(&repo), Arc::clone(&scraper) as _);

        let outcome = exec.run_batch(&batch(), &req(false)).await.unwrap();
        assert_eq!(outcome.processed, dates_between(d("2024-03-01"), d("2024-03-03")));
        assert_eq!(scraper.calls(), dates_between(d("2024-03-01"), d("2024-03-03")));

        let cp = repo.get_checkpoint(d("2024-03-02")).unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Success);
        assert_eq!(cp.games_count, 2);
    }

    #[tokio::test]
    async fn skips_checkpointed_dates_unless_forced() {
        let repo = repo();
        let scraper = Arc::new(FakeScraper::new(&[]));
        let exec = BatchExecutor::new(Arc::clone(&repo), Arc::clone(&scraper) as _);

        repo.upsert_checkpoint(&CheckpointRecord {
            date: d("2024-03-02"),
            status: CheckpointStatus::Success,
            games_count: 5,
            error: None,
            processed_at: Utc::now().naive_utc(),
        })
        .unwrap();

        let outcome = exec.run_batch(&batch(), &req(false)).await.unwrap();
        assert_eq!(outcome.skipped, vec![d("2024-03-02")]);
        assert_eq!(outcome.processed, vec![d("2024-03-01"), d("2024-03-03")]);

        // force_scrape re-processes everything
        let outcome = exec.run_batch(&batch(), &req(true)).await.unwrap();
        assert_eq!(outcome.processed.len(), 3);
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn failed_checkpoint_is_retried_on_rerun() {
        let repo = repo();
        let scraper = Arc::new(FakeScraper::new(&[]));
        let exec = BatchExecutor::new(Arc::clone(&repo), Arc::clone(&scraper) as _);

        repo.upsert_checkpoint(&CheckpointRecord {
            date: d("2024-03-01"),
            status: CheckpointStatus::Failed,
            games_count: 0,
            error: Some("earlier failure".into()),
            processed_at: Utc::now().naive_utc(),
        })
        .unwrap();

        let outcome = exec.run_batch(&batch(), &req(false)).await.unwrap();
        // failed dates are not skipped
        assert!(outcome.processed.contains(&d("2024-03-01")));
    }

    #[tokio::test]
    async fn fetch_failure_is_recorded_and_batch_continues() {
        let repo = repo();
        let scraper = Arc::new(FakeScraper::new(&["2024-03-02"]));
        let exec = BatchExecutor::new(Arc::clone(&repo), Arc::clone(&scraper) as _);

        let outcome = exec.run_batch(&batch(), &req(false)).await.unwrap();
        assert_eq!(outcome.processed, vec![d("2024-03-01"), d("2024-03-03")]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, d("2024-03-02"));

        let cp = repo.get_checkpoint(d("2024-03-02")).unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Failed);
        assert!(cp.error.unwrap().contains("simulated"));
    }
}
