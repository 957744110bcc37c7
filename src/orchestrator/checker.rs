//! Execution checker: poll-based join over dispatched sub-executions.
//!
//! One call is one poll cycle; the orchestrator owns the loop, its interval
//! and its timeout budget.

use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{ExecutionStatus, SubExecution};

use super::registry::ExecutionRegistry;

#[derive(Debug)]
pub struct ExecutionCheck {
    /// True only when every execution is terminal and succeeded.
    pub success: bool,
    pub all_terminal: bool,
    /// First execution seen in a terminal failure state, surfaced immediately
    /// so the caller can fail fast without waiting out siblings.
    pub first_failure: Option<SubExecution>,
    pub status_counts: BTreeMap<&'static str, usize>,
    pub executions: Vec<SubExecution>,
}

pub fn check_executions(registry: &ExecutionRegistry, subs: &[SubExecution]) -> ExecutionCheck {
    let mut executions = Vec::with_capacity(subs.len());
    let mut status_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut all_terminal = true;
    let mut all_succeeded = true;
    let mut first_failure = None;

    for sub in subs {
        let status = registry
            .status(sub.execution_id)
            .unwrap_or(ExecutionStatus::Failed);

        *status_counts.entry(status.as_str()).or_insert(0) += 1;

        if !status.is_terminal() {
            all_terminal = false;
            all_succeeded = false;
        } else if status == ExecutionStatus::Failed && first_failure.is_none() {
            all_succeeded = false;
            first_failure = Some(SubExecution { status, ..sub.clone() });
        }

        executions.push(SubExecution { status, ..sub.clone() });
    }

    debug!("Execution poll: {:?}", status_counts);

    ExecutionCheck {
        success: all_terminal && all_succeeded,
        all_terminal,
        first_failure,
        status_counts,
        executions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn setup(n: usize) -> (ExecutionRegistry, Vec<SubExecution>) {
        let reg = ExecutionRegistry::new();
        let subs = (0..n)
            .map(|i| {
                let start = d("2024-01-01") + chrono::Days::new(i as u64 * 10);
                let end = start + chrono::Days::new(9);
                let id = reg.register(start, end).unwrap();
                SubExecution {
                    execution_id: id,
                    start_date: start,
                    end_date: end,
                    status: ExecutionStatus::Running,
                }
            })
            .collect();
        (reg, subs)
    }

    #[test]
    fn success_only_when_all_terminal_success() {
        let (reg, subs) = setup(3);
        let check = check_executions(&reg, &subs);
        assert!(!check.success);
        assert!(!check.all_terminal);
        assert_eq!(check.status_counts.get("RUNNING"), Some(&3));

        for sub in &subs {
            reg.mark(sub.execution_id, ExecutionStatus::Succeeded);
        }
        let check = check_executions(&reg, &subs);
        assert!(check.success);
        assert!(check.all_terminal);
        assert!(check.first_failure.is_none());
        assert_eq!(check.status_counts.get("SUCCEEDED"), Some(&3));
    }

    #[test]
    fn failure_surfaces_before_siblings_finish() {
        let (reg, subs) = setup(3);
        reg.mark(subs[1].execution_id, ExecutionStatus::Failed);

        let check = check_executions(&reg, &subs);
        assert!(!check.success);
        assert!(!check.all_terminal); // two still running
        let failure = check.first_failure.expect("failure should surface immediately");
        assert_eq!(failure.execution_id, subs[1].execution_id);
    }

    #[test]
    fn updated_statuses_are_returned() {
        let (reg, subs) = setup(2);
        reg.mark(subs[0].execution_id, ExecutionStatus::Succeeded);

        let check = check_executions(&reg, &subs);
        assert_eq!(check.executions[0].status, ExecutionStatus::Succeeded);
        assert_eq!(check.executions[1].status, ExecutionStatus::Running);
    }
}
