//! Common time/period helpers for belay_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Number of whole sample periods between two status messages.
/// - Rounds `message_interval / sample_interval` to the nearest integer.
/// - Ensures result is at least 1 (every sample) for tiny or invalid intervals.
#[inline]
pub fn samples_per_message(message_interval: f64, sample_interval: f64) -> u32 {
    if !(sample_interval > 0.0) || !message_interval.is_finite() {
        return 1;
    }
    let n = (message_interval / sample_interval).round();
    if n >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        (n as u32).max(1)
    }
}

/// Compute a polling period in milliseconds for a rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 millisecond.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_interval_rounds_to_whole_samples() {
        assert_eq!(samples_per_message(1.0, 0.05), 20);
        assert_eq!(samples_per_message(0.12, 0.05), 2);
        assert_eq!(samples_per_message(0.0, 0.05), 1);
        assert_eq!(samples_per_message(1.0, 0.0), 1);
    }

    #[test]
    fn period_clamps() {
        assert_eq!(period_ms(0), 1000);
        assert_eq!(period_ms(100), 10);
        assert_eq!(period_ms(5000), 1);
    }
}
