//! Batch planner: partition a date range into contiguous fixed-size batches.
//!
//! Pure and deterministic — replanning after a fault yields the same batch
//! boundaries.

use chrono::{Days, NaiveDate};
use tracing::debug;

use crate::models::{dates_between, Batch};

/// Partition `start..=end` into ordered batches of up to `batch_size`
/// consecutive dates; the last batch may be shorter.
pub fn plan_batches(start: NaiveDate, end: NaiveDate, batch_size: u32) -> Vec<Batch> {
    debug_assert!(batch_size >= 1, "validator guarantees batch_size >= 1");

    let mut batches = Vec::new();
    let mut cur = start;

    while cur <= end {
        let batch_end = (cur + Days::new(batch_size as u64 - 1)).min(end);
        batches.push(Batch { dates: dates_between(cur, batch_end) });
        cur = batch_end + Days::new(1);
    }

    debug!(
        "Planned {} batches for {} .. {} (batch_size {})",
        batches.len(),
        start,
        end,
        batch_size
    );
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngExt;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn nine_days_batch_three_gives_three_full_batches() {
        let batches = plan_batches(d("2024-03-01"), d("2024-03-09"), 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].start(), d("2024-03-01"));
        assert_eq!(batches[0].end(), d("2024-03-03"));
        assert_eq!(batches[1].start(), d("2024-03-04"));
        assert_eq!(batches[1].end(), d("2024-03-06"));
        assert_eq!(batches[2].start(), d("2024-03-07"));
        assert_eq!(batches[2].end(), d("2024-03-09"));
        assert!(batches.iter().all(|b| b.dates.len() == 3));
    }

    #[test]
    fn last_batch_may_be_short() {
        let batches = plan_batches(d("2024-03-01"), d("2024-03-07"), 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].dates, vec![d("2024-03-07")]);
    }

    #[test]
    fn single_day_single_batch() {
        let batches = plan_batches(d("2024-03-01"), d("2024-03-01"), 3);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].dates, vec![d("2024-03-01")]);
    }

    #[test]
    fn batch_size_one() {
        let batches = plan_batches(d("2024-03-01"), d("2024-03-04"), 1);
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.dates.len() == 1));
    }

    #[test]
    fn planning_is_deterministic() {
        let a = plan_batches(d("2023-01-15"), d("2023-04-02"), 7);
        let b = plan_batches(d("2023-01-15"), d("2023-04-02"), 7);
        assert_eq!(a, b);
    }

    /// Partition completeness over random ranges and batch sizes: the union
    /// of all batch dates equals the range exactly, in order, no gaps.
    #[test]
    fn partition_completeness_random() {
        let mut rng = rand::rng();
        let base = d("2020-01-01");

        for _ in 0..200 {
            let offset = rng.random_range(0..2000u64);
            let span = rng.random_range(0..400u64);
            let start = base + Days::new(offset);
            let end = start + Days::new(span);
            let batch_size = rng.random_range(1..=10u32);

            let batches = plan_batches(start, end, batch_size);
            let flattened: Vec<NaiveDate> =
                batches.iter().flat_map(|b| b.dates.iter().copied()).collect();

            assert_eq!(
                flattened,
                dates_between(start, end),
                "range {}..{} batch_size {}",
                start,
                end,
                batch_size
            );
            for b in &batches {
                assert!(!b.dates.is_empty());
                assert!(b.dates.len() <= batch_size as usize);
            }
        }
    }
}
