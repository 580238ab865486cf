//! Monotonic and wall clocks.
//!
//! Sample timestamps use a process-local monotonic clock in microseconds,
//! anchored at first use. Analysis records carry wall-clock timestamps.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds since the process-local monotonic epoch.
///
/// Monotonic: never goes backwards, unaffected by wall-clock adjustments.
pub fn monotonic_us() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as u64
}

/// Microseconds since the Unix epoch (wall clock).
pub fn wall_clock_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_never_decreases() {
        let a = monotonic_us();
        let b = monotonic_us();
        assert!(b >= a);
    }

    #[test]
    fn test_wall_clock_nonzero() {
        assert!(wall_clock_us() > 0);
    }
}
