//! Batch verifier: re-derive completion from durable storage.
//!
//! Batch results returned from parallel execution are deliberately ignored —
//! stored artifacts are the source of truth for completion, so a batch that
//! reported success without leaving its artifact behind still fails here.

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{dates_between, VerificationReport};
use crate::storage::artifacts::{key_date, ArtifactStore};

const PARSED_PREFIX: &str = "json/";

pub struct BatchVerifier {
    store: Arc<dyn ArtifactStore>,
}

impl BatchVerifier {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// List the parsed artifacts actually present for the range and diff
    /// against the expected date set. Computed fresh every time.
    pub fn verify(&self, start: NaiveDate, end: NaiveDate) -> Result<VerificationReport> {
        let expected: BTreeSet<NaiveDate> = dates_between(start, end).into_iter().collect();

        let present: BTreeSet<NaiveDate> = self
            .store
            .list(PARSED_PREFIX)?
            .iter()
            .filter_map(|key| key_date(key))
            .filter(|d| expected.contains(d))
            .collect();

        let missing: BTreeSet<NaiveDate> = expected.difference(&present).copied().collect();
        let success = missing.is_empty();

        if success {
            info!("Verification clean: {} dates present for {} .. {}", present.len(), start, end);
        } else {
            warn!(
                "Verification found {} missing dates for {} .. {} (first: {:?})",
                missing.len(),
                start,
                end,
                missing.iter().next()
            );
        }

        Ok(VerificationReport {
            success,
            verified_dates: present,
            missing_dates: missing,
        })
    }
}
