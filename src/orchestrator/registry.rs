//! In-process ledger of dispatched sub-executions.
//!
//! Stands in for the workflow engine's execution handles: the splitter
//! registers a range before spawning it, the spawned task marks its terminal
//! status, and the checker polls. Terminal statuses are never overwritten.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::OrchestratorError;
use crate::models::{ExecutionId, ExecutionStatus};

struct Entry {
    start: NaiveDate,
    end: NaiveDate,
    status: ExecutionStatus,
}

#[derive(Default)]
pub struct ExecutionRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<ExecutionId, Entry>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle for a sub-range about to be spawned.
    ///
    /// Rejects a range that is already registered and still running — a
    /// duplicate dispatch would double-scrape the same dates concurrently.
    pub fn register(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ExecutionId, OrchestratorError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| OrchestratorError::Dispatch {
                start,
                end,
                reason: "execution registry lock poisoned".into(),
            })?;

        let duplicate = entries
            .values()
            .any(|e| e.start == start && e.end == end && e.status == ExecutionStatus::Running);
        if duplicate {
            return Err(OrchestratorError::Dispatch {
                start,
                end,
                reason: "an execution for this range is already running".into(),
            });
        }

        let id = ExecutionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.insert(id, Entry { start, end, status: ExecutionStatus::Running });
        Ok(id)
    }

    /// Record the terminal status of an execution. A terminal state is final;
    /// later marks are ignored.
    pub fn mark(&self, id: ExecutionId, status: ExecutionStatus) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.get_mut(&id) {
                if !entry.status.is_terminal() {
                    entry.status = status;
                }
            }
        }
    }

    pub fn status(&self, id: ExecutionId) -> Option<ExecutionStatus> {
        self.entries.lock().ok()?.get(&id).map(|e| e.status)
    }
}
