//! Process uptime, reported by the health check

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Record the process start. Later calls keep the first instant.
pub fn mark_started() {
    STARTED_AT.get_or_init(Instant::now);
}

pub fn uptime() -> Duration {
    STARTED_AT
        .get()
        .map(Instant::elapsed)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_recorded_once() {
        mark_started();
        let first = uptime();
        mark_started();
        assert!(uptime() >= first);
        assert!(uptime() < Duration::from_secs(60));
    }
}
