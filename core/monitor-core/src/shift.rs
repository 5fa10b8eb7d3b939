//! Shift calendar.
//!
//! Every calendar day has two fixed 12-hour shifts anchored on a wall-clock
//! start (08:30 by default):
//!
//! - `Shift1`: `[day_start, day_start + 12h)` on day N
//! - `Shift2`: `[day_start + 12h on day N, day_start on day N+1)`
//!
//! Boundaries are computed from the local calendar date, so month ends and
//! leap days need no special handling. Windows are half-open: an instant at
//! exactly the boundary belongs to the shift that starts there.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::{whole_seconds, EpochMillis};

pub const SHIFT_HOURS: i64 = 12;
pub const SHIFT_SECONDS: u64 = (SHIFT_HOURS * 3600) as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftName {
    #[serde(rename = "Shift1")]
    Day,
    #[serde(rename = "Shift2")]
    Night,
}

impl ShiftName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftName::Day => "Shift1",
            ShiftName::Night => "Shift2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub name: ShiftName,
    pub start: EpochMillis,
    pub end: EpochMillis,
}

impl ShiftWindow {
    pub fn contains(&self, instant: EpochMillis) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Seconds from shift start to `now`, capped at the end of the shift.
    pub fn elapsed_seconds(&self, now: EpochMillis) -> u64 {
        whole_seconds(self.start, now.min(self.end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("shift day start must be before 12:00 so both shifts fall on the same date (got {0})")]
pub struct InvalidShiftStart(pub NaiveTime);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftCalendar {
    day_start: NaiveTime,
}

impl Default for ShiftCalendar {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::from_hms_opt(8, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl ShiftCalendar {
    pub fn new(day_start: NaiveTime) -> Result<Self, InvalidShiftStart> {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        if day_start >= noon {
            return Err(InvalidShiftStart(day_start));
        }
        Ok(Self { day_start })
    }

    pub fn day_start(&self) -> NaiveTime {
        self.day_start
    }

    /// The shift window enclosing `instant`, evaluated in `tz`.
    pub fn window_for<Tz: TimeZone>(&self, tz: &Tz, instant: EpochMillis) -> ShiftWindow {
        let utc = Utc
            .timestamp_millis_opt(instant)
            .single()
            .unwrap_or_default();
        let date = utc.with_timezone(tz).date_naive();

        let day_start = self.day_shift_start(tz, date);
        let night_start = self.night_shift_start(tz, date);

        if instant < day_start {
            let previous = date.pred_opt().unwrap_or(date);
            ShiftWindow {
                name: ShiftName::Night,
                start: self.night_shift_start(tz, previous),
                end: day_start,
            }
        } else if instant < night_start {
            ShiftWindow {
                name: ShiftName::Day,
                start: day_start,
                end: night_start,
            }
        } else {
            let next = date.succ_opt().unwrap_or(date);
            ShiftWindow {
                name: ShiftName::Night,
                start: night_start,
                end: self.day_shift_start(tz, next),
            }
        }
    }

    fn day_shift_start<Tz: TimeZone>(&self, tz: &Tz, date: NaiveDate) -> EpochMillis {
        local_millis(tz, date.and_time(self.day_start))
    }

    fn night_shift_start<Tz: TimeZone>(&self, tz: &Tz, date: NaiveDate) -> EpochMillis {
        local_millis(
            tz,
            date.and_time(self.day_start) + chrono::Duration::hours(SHIFT_HOURS),
        )
    }
}

/// Resolves a wall-clock time to an instant. Ambiguous times (DST fall-back)
/// take the earlier instant; nonexistent times (DST spring-forward gap) take
/// the first instant after the gap.
fn local_millis<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> EpochMillis {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => tz
            .from_local_datetime(&(naive + chrono::Duration::hours(1)))
            .earliest()
            .map(|dt: DateTime<Tz>| dt.timestamp_millis())
            .unwrap_or_else(|| naive.and_utc().timestamp_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    /// Central European time for 2026: UTC+1, UTC+2 between the last
    /// Sundays of March and October (01:00 UTC transitions).
    #[derive(Debug, Clone, Copy)]
    struct CentralEurope2026;

    impl CentralEurope2026 {
        fn winter() -> FixedOffset {
            FixedOffset::east_opt(3600).unwrap()
        }

        fn summer() -> FixedOffset {
            FixedOffset::east_opt(7200).unwrap()
        }
    }

    impl TimeZone for CentralEurope2026 {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            CentralEurope2026
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            // Summer first: it maps the same wall clock to the earlier instant.
            let valid: Vec<FixedOffset> = [Self::summer(), Self::winter()]
                .into_iter()
                .filter(|offset| {
                    let utc = *local - chrono::Duration::seconds(offset.local_minus_utc() as i64);
                    self.offset_from_utc_datetime(&utc) == *offset
                })
                .collect();
            match valid.as_slice() {
                [] => LocalResult::None,
                [only] => LocalResult::Single(*only),
                [earlier, later, ..] => LocalResult::Ambiguous(*earlier, *later),
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            let spring = NaiveDate::from_ymd_opt(2026, 3, 29).unwrap().and_hms_opt(1, 0, 0).unwrap();
            let fall = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap().and_hms_opt(1, 0, 0).unwrap();
            if *utc >= spring && *utc < fall {
                Self::summer()
            } else {
                Self::winter()
            }
        }
    }

    fn utc_millis(rfc3339: &str) -> EpochMillis {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn boundary_instant_starts_day_shift() {
        let at = utc_millis("2026-03-10T08:30:00.000Z");
        let window = ShiftCalendar::default().window_for(&Utc, at);
        assert_eq!(window.name, ShiftName::Day);
        assert_eq!(window.start, at);
        assert_eq!(window.end, utc_millis("2026-03-10T20:30:00Z"));
    }

    #[test]
    fn instant_before_boundary_belongs_to_previous_night() {
        let at = utc_millis("2026-03-10T08:29:59.999Z");
        let window = ShiftCalendar::default().window_for(&Utc, at);
        assert_eq!(window.name, ShiftName::Night);
        assert_eq!(window.start, utc_millis("2026-03-09T20:30:00Z"));
        assert_eq!(window.end, utc_millis("2026-03-10T08:30:00Z"));
    }

    #[test]
    fn evening_boundary_starts_night_shift() {
        let at = utc_millis("2026-03-10T20:30:00Z");
        let window = ShiftCalendar::default().window_for(&Utc, at);
        assert_eq!(window.name, ShiftName::Night);
        assert_eq!(window.start, at);
        assert_eq!(window.end, utc_millis("2026-03-11T08:30:00Z"));
    }

    #[test]
    fn night_shift_wraps_month_end() {
        let calendar = ShiftCalendar::default();

        let before_midnight = calendar.window_for(&Utc, utc_millis("2026-02-28T23:00:00Z"));
        assert_eq!(before_midnight.end, utc_millis("2026-03-01T08:30:00Z"));

        let after_midnight = calendar.window_for(&Utc, utc_millis("2026-03-01T03:00:00Z"));
        assert_eq!(after_midnight.start, utc_millis("2026-02-28T20:30:00Z"));
        assert_eq!(before_midnight, after_midnight);
    }

    #[test]
    fn night_shift_wraps_year_end() {
        let window = ShiftCalendar::default().window_for(&Utc, utc_millis("2026-12-31T22:00:00Z"));
        assert_eq!(window.end, utc_millis("2027-01-01T08:30:00Z"));
    }

    #[test]
    fn windows_are_evaluated_in_the_given_zone() {
        let ist = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        // 03:00 UTC is 08:30 in +05:30.
        let at = utc_millis("2026-06-01T03:00:00Z");
        let window = ShiftCalendar::default().window_for(&ist, at);
        assert_eq!(window.name, ShiftName::Day);
        assert_eq!(window.start, at);
        assert_eq!(window.end, utc_millis("2026-06-01T15:00:00Z"));
    }

    #[test]
    fn windows_are_twelve_hours_without_dst() {
        let calendar = ShiftCalendar::default();
        let mut at = utc_millis("2026-01-01T00:00:00Z");
        for _ in 0..200 {
            let window = calendar.window_for(&Utc, at);
            assert!(window.contains(at));
            assert_eq!(whole_seconds(window.start, window.end), SHIFT_SECONDS);
            at += 3 * 3_600_000 + 17_000;
        }
    }

    #[test]
    fn elapsed_is_capped_at_shift_end() {
        let window = ShiftCalendar::default().window_for(&Utc, utc_millis("2026-03-10T09:00:00Z"));
        assert_eq!(window.elapsed_seconds(utc_millis("2026-03-10T09:00:00Z")), 1800);
        assert_eq!(
            window.elapsed_seconds(utc_millis("2026-03-11T09:00:00Z")),
            SHIFT_SECONDS
        );
    }

    #[test]
    fn custom_day_start() {
        let calendar = ShiftCalendar::new(NaiveTime::from_hms_opt(6, 0, 0).unwrap()).unwrap();
        let window = calendar.window_for(&Utc, utc_millis("2026-03-10T19:00:00Z"));
        assert_eq!(window.name, ShiftName::Night);
        assert_eq!(window.start, utc_millis("2026-03-10T18:00:00Z"));
    }

    #[test]
    fn day_start_inside_spring_gap_moves_forward_an_hour() {
        let calendar = ShiftCalendar::new(NaiveTime::from_hms_opt(2, 30, 0).unwrap()).unwrap();
        // 02:30 local does not exist on 2026-03-29; 03:30 CEST is 01:30 UTC.
        let window = calendar.window_for(&CentralEurope2026, utc_millis("2026-03-29T10:00:00Z"));

        assert_eq!(window.name, ShiftName::Day);
        assert_eq!(window.start, utc_millis("2026-03-29T01:30:00Z"));
        assert_eq!(window.end, utc_millis("2026-03-29T12:30:00Z"));
    }

    #[test]
    fn repeated_day_start_on_fall_back_takes_the_earlier_instant() {
        let calendar = ShiftCalendar::new(NaiveTime::from_hms_opt(2, 30, 0).unwrap()).unwrap();
        // 02:30 local happens twice on 2026-10-25: 00:30 UTC (CEST) and 01:30 UTC (CET).
        let window = calendar.window_for(&CentralEurope2026, utc_millis("2026-10-25T05:00:00Z"));

        assert_eq!(window.name, ShiftName::Day);
        assert_eq!(window.start, utc_millis("2026-10-25T00:30:00Z"));
        assert_eq!(window.end, utc_millis("2026-10-25T13:30:00Z"));
    }

    #[test]
    fn summer_offset_applies_between_transitions() {
        let window = ShiftCalendar::default()
            .window_for(&CentralEurope2026, utc_millis("2026-07-01T07:00:00Z"));
        assert_eq!(window.name, ShiftName::Day);
        assert_eq!(window.start, utc_millis("2026-07-01T06:30:00Z"));
    }

    #[test]
    fn rejects_afternoon_day_start() {
        assert!(ShiftCalendar::new(NaiveTime::from_hms_opt(13, 0, 0).unwrap()).is_err());
    }

    #[test]
    fn shift_names_serialize_as_dashboard_labels() {
        assert_eq!(serde_json::to_string(&ShiftName::Day).unwrap(), "\"Shift1\"");
        assert_eq!(ShiftName::Night.as_str(), "Shift2");
    }
}
