//! Range splitter: recursive decomposition of oversized date ranges.

use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tracing::info;

use crate::error::OrchestratorError;
use crate::models::{DateRangeRequest, ExecutionStatus, SubExecution};

use super::Orchestrator;

/// Whether the range must be decomposed. A sub-execution is never re-split,
/// which is what terminates the recursion.
pub fn needs_split(req: &DateRangeRequest, max_chunk_size_days: i64) -> bool {
    !req.is_sub_execution && req.span_days() > max_chunk_size_days
}

/// Sequential, non-overlapping sub-ranges of at most `max_days` days whose
/// union is exactly `start..=end`.
pub fn split_into_chunks(
    start: NaiveDate,
    end: NaiveDate,
    max_days: i64,
) -> Vec<(NaiveDate, NaiveDate)> {
    let mut chunks = Vec::new();
    let mut cur = start;

    while cur <= end {
        let chunk_end = (cur + Days::new(max_days as u64 - 1)).min(end);
        chunks.push((cur, chunk_end));
        cur = chunk_end + Days::new(1);
    }

    chunks
}

/// Dispatch one independent sub-execution per chunk, fire-and-forget; the
/// execution checker observes completion later.
///
/// All-or-nothing: if any chunk fails to register, the whole split is
/// reported failed and the caller retries the entire split. Chunks spawned
/// before the failure run to completion; the registry's duplicate guard keeps
/// a retry from double-dispatching them while they still run.
pub fn dispatch_sub_executions(
    orch: &Arc<Orchestrator>,
    req: &DateRangeRequest,
) -> Result<Vec<SubExecution>, OrchestratorError> {
    let max_days = orch.config().orchestrator.max_chunk_size_days;
    let chunks = split_into_chunks(req.start_date, req.end_date, max_days);
    info!(
        "Split {} .. {} into {} chunks of ≤{} days",
        req.start_date,
        req.end_date,
        chunks.len(),
        max_days
    );

    let mut executions = Vec::with_capacity(chunks.len());

    for (chunk_start, chunk_end) in chunks {
        let id = orch.registry().register(chunk_start, chunk_end)?;
        let child = req.sub_range(chunk_start, chunk_end);

        let orch_for_task = Arc::clone(orch);
        tokio::spawn(async move {
            let result = Arc::clone(&orch_for_task).run(child).await;
            let status = match result {
                Ok(_) => ExecutionStatus::Succeeded,
                Err(_) => ExecutionStatus::Failed,
            };
            orch_for_task.registry().mark(id, status);
        });

        info!("Started {} for chunk {} .. {}", id, chunk_start, chunk_end);
        executions.push(SubExecution {
            execution_id: id,
            start_date: chunk_start,
            end_date: chunk_end,
            status: ExecutionStatus::Running,
        });
    }

    Ok(executions)
}
