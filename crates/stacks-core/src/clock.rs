//! Wall-clock helper. All persisted timestamps are `i64` microseconds
//! since the Unix epoch (`*_us` columns).

use chrono::Utc;

/// Current wall-clock time in microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::now_us;

    #[test]
    fn now_is_monotonic_enough() {
        let a = now_us();
        let b = now_us();
        assert!(b >= a);
        // Sanity: after 2020, before 2100.
        assert!(a > 1_577_836_800_000_000);
        assert!(a < 4_102_444_800_000_000);
    }
}
