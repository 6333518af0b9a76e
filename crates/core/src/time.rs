//! Monotonic-ish wall-clock helpers.
//!
//! Stale-lock detection and WAL record timestamps only need a coarse,
//! monotonically-increasing-in-practice microsecond counter, not a
//! calendar date, so this stays a small `now_micros` helper next to the
//! other durability primitives rather than pulling in `chrono` for it.

use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch.
///
/// Panics only if the system clock is set before 1970, treated as an
/// environment bug, not a recoverable error.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_micros_increases() {
        let a = now_micros();
        let b = now_micros();
        assert!(b >= a);
    }
}
