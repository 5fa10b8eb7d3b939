//! Whole-second interval arithmetic over epoch-millisecond timestamps.

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

const MILLIS_PER_SECOND: i64 = 1000;

/// Runs shorter than this are treated as contact noise and never recorded.
pub const MIN_RUN_SECONDS: u64 = 1;

/// `floor((end - start) / 1000)`, or 0 when the range is empty or inverted.
pub fn whole_seconds(start: EpochMillis, end: EpochMillis) -> u64 {
    if end <= start {
        return 0;
    }
    ((end - start) / MILLIS_PER_SECOND) as u64
}

/// Length of the intersection of `[a_start, a_end)` and `[b_start, b_end)` in
/// whole seconds. Disjoint ranges yield 0.
pub fn overlap_seconds(
    a_start: EpochMillis,
    a_end: EpochMillis,
    b_start: EpochMillis,
    b_end: EpochMillis,
) -> u64 {
    whole_seconds(a_start.max(b_start), a_end.min(b_end))
}

/// A closed run. Immutable once appended to a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: EpochMillis,
    pub end: EpochMillis,
    /// Whole seconds between `start` and `end`.
    pub duration: u64,
}

impl TimeInterval {
    /// Builds the interval `[start, end)`, or `None` when it is shorter than
    /// [`MIN_RUN_SECONDS`].
    pub fn closed(start: EpochMillis, end: EpochMillis) -> Option<Self> {
        let duration = whole_seconds(start, end);
        if duration < MIN_RUN_SECONDS {
            return None;
        }
        Some(Self {
            start,
            end,
            duration,
        })
    }

    pub fn overlap_with(&self, from: EpochMillis, to: EpochMillis) -> u64 {
        overlap_seconds(self.start, self.end, from, to)
    }

    pub fn is_well_formed(&self) -> bool {
        self.end > self.start
            && self.duration >= MIN_RUN_SECONDS
            && self.duration == whole_seconds(self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_overlap() {
        assert_eq!(overlap_seconds(0, 10_000, 5_000, 15_000), 5);
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        assert_eq!(overlap_seconds(0, 1_000, 2_000, 3_000), 0);
        assert_eq!(overlap_seconds(2_000, 3_000, 0, 1_000), 0);
    }

    #[test]
    fn identical_ranges_overlap_fully() {
        let (a, b) = (1_700_000_000_123, 1_700_000_042_987);
        assert_eq!(overlap_seconds(a, b, a, b), (b - a) as u64 / 1000);
    }

    #[test]
    fn touching_ranges_do_not_overlap() {
        assert_eq!(overlap_seconds(0, 5_000, 5_000, 9_000), 0);
    }

    #[test]
    fn overlap_is_floored_to_whole_seconds() {
        assert_eq!(overlap_seconds(0, 10_000, 8_001, 20_000), 1);
        assert_eq!(overlap_seconds(0, 10_000, 9_001, 20_000), 0);
    }

    #[test]
    fn containment_uses_inner_range() {
        assert_eq!(overlap_seconds(0, 100_000, 40_000, 43_500), 3);
    }

    #[test]
    fn closed_drops_sub_second_runs() {
        assert_eq!(TimeInterval::closed(1_000, 1_999), None);
        assert_eq!(TimeInterval::closed(1_000, 500), None);
        let run = TimeInterval::closed(1_000, 3_700).unwrap();
        assert_eq!(run.duration, 2);
        assert!(run.is_well_formed());
    }
}
