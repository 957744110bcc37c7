//! Input validator: raw request payloads → canonical [`DateRangeRequest`].
//!
//! The request surface accumulated several shapes over time and all of them
//! are still accepted here:
//!   - flat snake_case: `{"start_date": ..., "end_date": ...}`
//!   - nested: `{"date_range": {"start_date": ..., "end_date": ...}}`
//!   - camelCase: `{"startDate": ..., "endDate": ...}`
//!   - `{"specific_dates": ["...", ...]}`, expanded to its min..max range
//!
//! Validation has no side effects; a rejected request leaves no trace.

use chrono::{Days, NaiveDate};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::OrchestratorError;
use crate::models::DateRangeRequest;

const MAX_BATCH_SIZE: u32 = 10;

/// Normalize and validate a raw request against the configured defaults.
pub fn validate(raw: &Value, config: &AppConfig) -> Result<DateRangeRequest, OrchestratorError> {
    debug!("Validating request: {}", raw);

    let (start_date, end_date) = extract_range(raw)?;

    if start_date > end_date {
        return Err(OrchestratorError::Validation(format!(
            "start_date ({}) must be before or equal to end_date ({})",
            start_date, end_date
        )));
    }

    let force_scrape = bool_field(raw, &["force_scrape", "forceScrape"]).unwrap_or(false);

    let batch_size = match int_field(raw, &["batch_size", "batchSize"]) {
        Some(n) if n < 1 => {
            return Err(OrchestratorError::Validation(format!(
                "batch_size must be at least 1, got {}",
                n
            )));
        }
        Some(n) if n > MAX_BATCH_SIZE as i64 => {
            warn!("batch_size {} above limit, clamping to {}", n, MAX_BATCH_SIZE);
            MAX_BATCH_SIZE
        }
        Some(n) => n as u32,
        None => config.orchestrator.default_batch_size,
    };

    let bucket = match str_field(raw, &["bucket", "bucket_name", "bucketName"]) {
        Some(b) if b.trim().is_empty() => {
            return Err(OrchestratorError::Validation("bucket must not be empty".into()));
        }
        Some(b) => b.to_string(),
        None => config.storage.bucket.clone(),
    };

    let architecture_version = str_field(raw, &["architecture_version", "architectureVersion"])
        .unwrap_or("v2")
        .to_string();

    let is_sub_execution = bool_field(raw, &["is_sub_execution", "isSubExecution"]).unwrap_or(false);

    let validated = DateRangeRequest {
        start_date,
        end_date,
        force_scrape,
        batch_size,
        bucket,
        architecture_version,
        is_sub_execution,
    };

    debug!(
        "Validation successful: {} .. {} (batch_size {}, force {})",
        validated.start_date, validated.end_date, validated.batch_size, validated.force_scrape
    );
    Ok(validated)
}

/// Inclusive trailing window of `days` days ending at `end`. Used by the
/// scheduled daily resync, which re-scrapes the last few days to pick up
/// late schedule edits.
pub fn trailing_window(end: NaiveDate, days: u32) -> Result<(NaiveDate, NaiveDate), OrchestratorError> {
    if days < 1 {
        return Err(OrchestratorError::Validation(
            "window must cover at least one day".into(),
        ));
    }
    Ok((end - Days::new(days as u64 - 1), end))
}

fn extract_range(raw: &Value) -> Result<(NaiveDate, NaiveDate), OrchestratorError> {
    // Flat fields first, then the nested legacy shape, then camelCase.
    let start = str_field(raw, &["start_date", "startDate"])
        .or_else(|| nested_str(raw, "date_range", "start_date"));
    let end = str_field(raw, &["end_date", "endDate"])
        .or_else(|| nested_str(raw, "date_range", "end_date"));

    if let (Some(start), Some(end)) = (start, end) {
        return Ok((parse_date(start)?, parse_date(end)?));
    }

    // A specific_dates list is treated as the inclusive span it covers.
    if let Some(list) = raw.get("specific_dates").and_then(Value::as_array) {
        if list.is_empty() {
            return Err(OrchestratorError::Validation("specific_dates must not be empty".into()));
        }
        let mut dates = Vec::with_capacity(list.len());
        for v in list {
            let s = v.as_str().ok_or_else(|| {
                OrchestratorError::Validation(format!("specific_dates entry is not a string: {}", v))
            })?;
            dates.push(parse_date(s)?);
        }
        let min = *dates.iter().min().unwrap_or(&dates[0]);
        let max = *dates.iter().max().unwrap_or(&dates[0]);
        return Ok((min, max));
    }

    Err(OrchestratorError::Validation(
        "missing required parameters: start_date and end_date".into(),
    ))
}

fn parse_date(s: &str) -> Result<NaiveDate, OrchestratorError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        OrchestratorError::Validation(format!("invalid date '{}': {}. Use YYYY-MM-DD format", s, e))
    })
}

fn str_field<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|n| raw.get(n).and_then(Value::as_str))
}

fn nested_str<'a>(raw: &'a Value, outer: &str, inner: &str) -> Option<&'a str> {
    raw.get(outer)?.get(inner)?.as_str()
}

fn bool_field(raw: &Value, names: &[&str]) -> Option<bool> {
    names.iter().find_map(|n| raw.get(n).and_then(Value::as_bool))
}

fn int_field(raw: &Value, names: &[&str]) -> Option<i64> {
    names.iter().find_map(|n| raw.get(n).and_then(Value::as_i64))
}
