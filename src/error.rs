use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

use crate::models::ExecutionId;

/// Per-date failure from the fetch collaborator.
///
/// Never propagated out of a batch: the executor records it in the checkpoint
/// store and moves on to the next date.
#[derive(Debug, Error)]
#[error("fetch failed for {date}: {reason}")]
pub struct FetchError {
    pub date: NaiveDate,
    pub reason: String,
}

/// Terminal errors of the orchestration state machine.
///
/// Everything here aborts the run. Each variant maps to the component that
/// raised it so the terminal report can name it (see [`component`]).
///
/// [`component`]: OrchestratorError::component
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("failed to dispatch sub-execution for {start}..{end}: {reason}")]
    Dispatch {
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    #[error("batch {start}..{end} failed after {attempts} attempts: {source:#}")]
    BatchExecution {
        start: NaiveDate,
        end: NaiveDate,
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("{} date(s) missing from storage after execution (first: {})",
        missing.len(),
        missing.first().map(|d| d.to_string()).unwrap_or_default())]
    VerificationMismatch { missing: Vec<NaiveDate> },

    #[error("sub-execution {id} ({start}..{end}) failed")]
    SubExecutionFailure {
        id: ExecutionId,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("timed out after {0:?} waiting for sub-executions")]
    PollTimeout(Duration),

    #[error("dataset build failed: {0:#}")]
    DatasetBuild(#[source] anyhow::Error),

    #[error("storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl OrchestratorError {
    /// Name of the component this error originated from, for the terminal
    /// report.
    pub fn component(&self) -> &'static str {
        match self {
            Self::Validation(_) => "input_validator",
            Self::Dispatch { .. } => "range_splitter",
            Self::BatchExecution { .. } => "batch_executor",
            Self::VerificationMismatch { .. } => "batch_verifier",
            Self::SubExecutionFailure { .. } | Self::PollTimeout(_) => "execution_checker",
            Self::DatasetBuild(_) => "dataset_builder",
            Self::Storage(_) => "orchestrator",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_their_component() {
        let e = OrchestratorError::Validation("bad date".into());
        assert_eq!(e.component(), "input_validator");

        let e = OrchestratorError::VerificationMismatch {
            missing: vec![NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()],
        };
        assert_eq!(e.component(), "batch_verifier");
        assert!(e.to_string().contains("2024-03-05"));
    }
}
