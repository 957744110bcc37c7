//! Orchestrator: the only component with global flow control.
//!
//! State sequence per run:
//! validate → (split? dispatch sub-executions → poll until complete)
//!          | (plan batches → execute in parallel, bounded → verify)
//! → build dataset (top level only) → Success | Failed.
//!
//! Batches run under a semaphore with batch-level retry; dates inside a batch
//! run sequentially. Completion is always re-derived from storage by the
//! verifier, never read off the in-memory batch results.

pub mod checker;
pub mod executor;
pub mod planner;
pub mod registry;
pub mod splitter;
pub mod verifier;

use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration, Instant};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::dataset::DatasetBuilder;
use crate::error::OrchestratorError;
use crate::models::{DateRangeRequest, VerificationReport};
use crate::scraper::DateScraper;
use crate::storage::artifacts::ArtifactStore;
use crate::storage::Repository;

use self::executor::BatchExecutor;
use self::registry::ExecutionRegistry;
use self::verifier::BatchVerifier;

/// Terminal report of one orchestrated run.
#[derive(Debug)]
pub struct RunReport {
    pub dates_processed: usize,
    pub dates_skipped: usize,
    pub dates_failed: Vec<NaiveDate>,
    pub batches_executed: usize,
    pub sub_executions: usize,
    pub verification: Option<VerificationReport>,
}

pub struct Orchestrator {
    config: AppConfig,
    repo: Arc<Repository>,
    store: Arc<dyn ArtifactStore>,
    scraper: Arc<dyn DateScraper>,
    builder: Arc<dyn DatasetBuilder>,
    registry: ExecutionRegistry,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        repo: Arc<Repository>,
        store: Arc<dyn ArtifactStore>,
        scraper: Arc<dyn DateScraper>,
        builder: Arc<dyn DatasetBuilder>,
    ) -> Self {
        Self {
            config,
            repo,
            store,
            scraper,
            builder,
            registry: ExecutionRegistry::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    /// Run the state machine over a validated request.
    ///
    /// Boxed so sub-executions can recursively re-enter through
    /// `tokio::spawn` (the splitter guarantees the recursion is one level
    /// deep: a sub-execution is never re-split).
    pub fn run(
        self: Arc<Self>,
        req: DateRangeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RunReport, OrchestratorError>> + Send + 'static>> {
        Box::pin(async move { self.run_inner(req).await })
    }

    async fn run_inner(self: Arc<Self>, req: DateRangeRequest) -> Result<RunReport, OrchestratorError> {
        info!(
            "Run start: {} .. {} ({} days, batch_size {}, force {}, sub {})",
            req.start_date,
            req.end_date,
            req.span_days(),
            req.batch_size,
            req.force_scrape,
            req.is_sub_execution
        );

        let run_id = self.repo.begin_run(&req).unwrap_or(0);

        let result = if splitter::needs_split(&req, self.config.orchestrator.max_chunk_size_days) {
            Arc::clone(&self).run_split(req.clone()).await
        } else {
            Arc::clone(&self).run_batches(req.clone()).await
        };

        match &result {
            Ok(report) => {
                self.repo
                    .finish_run(run_id, report.dates_processed, report.dates_skipped, None)
                    .ok();
                info!(
                    "Run done: {} processed, {} skipped, {} failed",
                    report.dates_processed,
                    report.dates_skipped,
                    report.dates_failed.len()
                );
            }
            Err(e) => {
                self.repo
                    .finish_run(run_id, 0, 0, Some(&format!("{}: {}", e.component(), e)))
                    .ok();
                error!("Run failed in {}: {}", e.component(), e);
            }
        }

        result
    }

    // ── Split path ────────────────────────────────────────────────────────────

    async fn run_split(self: Arc<Self>, req: DateRangeRequest) -> Result<RunReport, OrchestratorError> {
        // Snapshot before dispatch: dates already checkpointed as success will
        // be skipped by the children and must not be reported as processed.
        let (already_done, _) = self
            .repo
            .checkpoint_counts(req.start_date, req.end_date)
            .map_err(OrchestratorError::Storage)?;

        let subs = splitter::dispatch_sub_executions(&self, &req)?;

        let interval = Duration::from_millis(self.config.orchestrator.poll_interval_ms);
        let budget = Duration::from_secs(self.config.orchestrator.poll_timeout_secs);
        let deadline = Instant::now() + budget;

        let final_check = loop {
            let check = checker::check_executions(&self.registry, &subs);

            // Fail fast: a terminal failure is not masked by waiting out
            // the siblings.
            if let Some(failure) = check.first_failure {
                return Err(OrchestratorError::SubExecutionFailure {
                    id: failure.execution_id,
                    start: failure.start_date,
                    end: failure.end_date,
                });
            }
            if check.all_terminal {
                break check;
            }
            if Instant::now() >= deadline {
                return Err(OrchestratorError::PollTimeout(budget));
            }
            sleep(interval).await;
        };

        info!(
            "All {} sub-executions completed: {:?}",
            subs.len(),
            final_check.status_counts
        );

        // Each child verified its own sub-range; the parent builds the
        // dataset exactly once over the full range.
        self.builder
            .build(req.start_date, req.end_date)
            .map_err(OrchestratorError::DatasetBuild)?;

        let (success, failed) = self
            .repo
            .checkpoint_counts(req.start_date, req.end_date)
            .map_err(OrchestratorError::Storage)?;
        if failed > 0 {
            warn!("{} dates carry failed checkpoints in {} .. {}", failed, req.start_date, req.end_date);
        }

        // With force_scrape the children skip nothing and re-process even the
        // previously checkpointed dates.
        let (processed, skipped) = if req.force_scrape {
            (success, 0)
        } else {
            (success.saturating_sub(already_done), already_done)
        };

        Ok(RunReport {
            dates_processed: processed,
            dates_skipped: skipped,
            dates_failed: Vec::new(),
            batches_executed: 0,
            sub_executions: subs.len(),
            verification: None,
        })
    }

    // ── Batch path ────────────────────────────────────────────────────────────

    async fn run_batches(self: Arc<Self>, req: DateRangeRequest) -> Result<RunReport, OrchestratorError> {
        let cfg = &self.config.orchestrator;

        if req.is_sub_execution && req.span_days() > cfg.max_chunk_size_days {
            // A sub-execution is never re-split; an oversized one is handled
            // in a single planning pass.
            warn!(
                "Sub-execution range {} .. {} exceeds {} days, processing unsplit",
                req.start_date, req.end_date, cfg.max_chunk_size_days
            );
        }

        let batches = planner::plan_batches(req.start_date, req.end_date, req.batch_size);
        let sem = Arc::new(Semaphore::new(cfg.max_concurrent_batches));
        let abort = Arc::new(AtomicBool::new(false));
        let executor = Arc::new(BatchExecutor::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.scraper),
        ));
        let retries = cfg.batch_retry_attempts;
        let retry_base_ms = cfg.batch_retry_base_ms;

        let mut handles = Vec::with_capacity(batches.len());

        for batch in &batches {
            let batch = batch.clone();
            let req = req.clone();
            let sem = Arc::clone(&sem);
            let abort = Arc::clone(&abort);
            let executor = Arc::clone(&executor);

            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|e| anyhow::anyhow!("semaphore closed: {}", e))?;

                // Once a failure is observed, stop dispatching further batches.
                if abort.load(Ordering::SeqCst) {
                    return Ok(None);
                }

                let strategy = ExponentialBackoff::from_millis(retry_base_ms)
                    .map(jitter)
                    .take(retries);

                match Retry::spawn(strategy, || executor.run_batch(&batch, &req)).await {
                    Ok(outcome) => Ok::<_, anyhow::Error>(Some(outcome)),
                    Err(e) => {
                        abort.store(true, Ordering::SeqCst);
                        Err(e)
                    }
                }
            }));
        }

        let mut processed = 0usize;
        let mut skipped = 0usize;
        let mut failed_dates = Vec::new();
        let mut batches_executed = 0usize;
        let mut first_error: Option<OrchestratorError> = None;

        for (batch, handle) in batches.iter().zip(handles) {
            let batch_error = |source: anyhow::Error| OrchestratorError::BatchExecution {
                start: batch.start(),
                end: batch.end(),
                attempts: retries + 1,
                source,
            };

            match handle.await {
                Ok(Ok(Some(outcome))) => {
                    processed += outcome.processed.len();
                    skipped += outcome.skipped.len();
                    failed_dates.extend(outcome.failed.iter().map(|(d, _)| *d));
                    batches_executed += 1;
                }
                Ok(Ok(None)) => {} // not dispatched after an observed failure
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(batch_error(e));
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(batch_error(anyhow::anyhow!("batch task panicked: {}", join_err)));
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        // Ground truth comes from storage, not from the outcomes above.
        let report = BatchVerifier::new(Arc::clone(&self.store))
            .verify(req.start_date, req.end_date)
            .map_err(OrchestratorError::Storage)?;

        if !report.success {
            return Err(OrchestratorError::VerificationMismatch {
                missing: report.missing_dates.iter().copied().collect(),
            });
        }

        if !req.is_sub_execution {
            self.builder
                .build(req.start_date, req.end_date)
                .map_err(OrchestratorError::DatasetBuild)?;
        }

        Ok(RunReport {
            dates_processed: processed,
            dates_skipped: skipped,
            dates_failed: failed_dates,
            batches_executed,
            sub_executions: 0,
            verification: Some(report),
        })
    }
}
