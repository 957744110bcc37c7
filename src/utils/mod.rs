use std::time::Instant;
use tracing::info;

/// Logs the wall-clock duration of a backfill run when dropped, so the
/// elapsed time is reported even on an early error return.
pub struct RunTimer {
    label: String,
    started: Instant,
}

impl RunTimer {
    pub fn begin(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("{} started", label);
        Self { label, started: Instant::now() }
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        info!("{} finished in {:.2?}", self.label, self.started.elapsed());
    }
}

/// Thousands-separated rendering for the status output.
pub fn group_thousands(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut groups: Vec<&[u8]> = digits.as_bytes().rchunks(3).collect();
    groups.reverse();
    let body = groups
        .iter()
        .map(|g| String::from_utf8_lossy(g))
        .collect::<Vec<_>>()
        .join(",");
    if n < 0 { format!("-{}", body) } else { body }
}
