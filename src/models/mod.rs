use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ── Validated request ─────────────────────────────────────────────────────────

/// Canonical, validated form of a scrape request. Produced by the input
/// validator, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateRangeRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub force_scrape: bool,
    pub batch_size: u32,
    pub bucket: String,
    pub architecture_version: String,
    pub is_sub_execution: bool,
}

impl DateRangeRequest {
    /// Inclusive day count of the range. At least 1 for a valid request.
    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Same request narrowed to a sub-range, flagged as a sub-execution so it
    /// is never re-split.
    pub fn sub_range(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: start,
            end_date: end,
            is_sub_execution: true,
            ..self.clone()
        }
    }
}

/// Every date in `start..=end`, ascending.
pub fn dates_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut cur = start;
    while cur <= end {
        dates.push(cur);
        cur = cur + Days::new(1);
    }
    dates
}

// ── Batch ─────────────────────────────────────────────────────────────────────

/// A contiguous slice of dates processed sequentially by one execution unit.
/// Not persisted; its effects are durable only through checkpoints and
/// artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub dates: Vec<NaiveDate>,
}

impl Batch {
    pub fn start(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn end(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }
}

// ── Checkpoints ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Success,
    Failed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Durable per-date processing marker, keyed by date, last-write-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub date: NaiveDate,
    pub status: CheckpointStatus,
    pub games_count: i64,
    pub error: Option<String>,
    pub processed_at: NaiveDateTime,
}

// ── Sub-executions ────────────────────────────────────────────────────────────

/// Opaque handle to a dispatched sub-execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub u64);

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exec-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

/// One dispatched instance of the workflow over a sub-range. Terminal states
/// are final; the checker never restarts one.
#[derive(Debug, Clone)]
pub struct SubExecution {
    pub execution_id: ExecutionId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ExecutionStatus,
}

// ── Verification ──────────────────────────────────────────────────────────────

/// Completion report derived from durable storage, never from in-memory batch
/// results. Computed fresh on every pass.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub success: bool,
    pub verified_dates: BTreeSet<NaiveDate>,
    pub missing_dates: BTreeSet<NaiveDate>,
}

// ── Business record ───────────────────────────────────────────────────────────

/// One scheduled game as parsed from a daily schedule page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    pub date: NaiveDate,
    pub time: String,
    pub home_team: String,
    pub away_team: String,
    pub field: Option<String>,
    pub league_name: Option<String>,
    pub scraped_at: NaiveDateTime,
}
