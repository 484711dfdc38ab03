//! Reconnect backoff policy.

use std::time::Duration;

/// Delay before reconnect attempt `attempt` (0-indexed):
/// `min(max, base * 2^attempt)`.
#[must_use]
pub fn reconnect_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.min(63));
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_then_caps() {
        let delays: Vec<u64> = (0..6)
            .map(|n| reconnect_delay(100, 500, n).as_millis() as u64)
            .collect();
        assert_eq!(delays, [100, 200, 400, 500, 500, 500]);
    }

    #[test]
    fn survives_large_attempt_counts() {
        assert_eq!(reconnect_delay(100, 30_000, u32::MAX), Duration::from_millis(30_000));
    }
}
