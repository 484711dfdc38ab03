//! Injectable clock for timestamp generation.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

/// Timestamp source.
///
/// Returns an ISO-8601 string. Injected through the shell config so tests
/// can pin timestamps.
pub type NowFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Current wall-clock time as an ISO-8601 string.
#[must_use]
pub fn wall_clock_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The default clock: wall-clock UTC.
#[must_use]
pub fn system_clock() -> NowFn {
    Arc::new(wall_clock_now)
}

/// Stamp from the injected clock, falling back to wall-clock time when the
/// clock yields nothing usable.
pub(crate) fn stamp(now: &NowFn) -> String {
    let ts = now();
    if ts.trim().is_empty() {
        wall_clock_now()
    } else {
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_uses_injected_clock() {
        let now: NowFn = Arc::new(|| "2024-01-01T00:00:00Z".to_string());
        assert_eq!(stamp(&now), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn stamp_falls_back_on_blank_clock() {
        let now: NowFn = Arc::new(|| "   ".to_string());
        let ts = stamp(&now);
        assert!(!ts.trim().is_empty());
    }
}
