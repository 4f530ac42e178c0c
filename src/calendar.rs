//! Reporting-calendar arithmetic.
//!
//! Readings are stored as UTC instants, but "today", "yesterday" and "this
//! month" are dates at the site. The site's timezone is a fixed offset taken
//! from configuration.
//!
//! Day windows are half-open: `start <= timestamp < end`. Bound arithmetic is
//! checked, so dates at the edge of chrono's range yield `None` rather than
//! overflowing.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

// ---

/// Shift applied to UTC day bounds by the day-wise graph query (+05:30).
pub const DAYWISE_SHIFT_SECS: i64 = 5 * 3600 + 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Calendar {
    // ---
    pub fn new(offset: FixedOffset) -> Self {
        Calendar { offset }
    }

    /// Wall-clock time at the site.
    pub fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }

    /// Calendar date at the site for the given instant.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date()
    }

    /// First instant of `date` at the site.
    pub fn start_of(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let offset = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        date.and_time(NaiveTime::MIN)
            .checked_sub_signed(offset)
            .map(|naive| naive.and_utc())
    }

    /// Half-open window covering `date` at the site.
    pub fn day_window(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.start_of(date)?, self.start_of(date.succ_opt()?)?))
    }

    /// First instant of the month containing `date`.
    pub fn month_start(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.start_of(date.with_day(1)?)
    }
}

/// Half-open window used by the day-wise graph: the UTC bounds of `date`
/// shifted forward by [`DAYWISE_SHIFT_SECS`].
pub fn daywise_window(date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    // ---
    let shift = Duration::seconds(DAYWISE_SHIFT_SECS);
    let start = date.and_time(NaiveTime::MIN).and_utc().checked_add_signed(shift)?;
    let end = start.checked_add_signed(Duration::days(1))?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn ist() -> Calendar {
        Calendar::new(FixedOffset::east_opt(DAYWISE_SHIFT_SECS as i32).unwrap())
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_window_follows_offset() {
        // ---
        let cal = ist();
        let (start, end) = cal.day_window(day(2025, 3, 26)).unwrap();

        // IST midnight is 18:30 UTC the previous evening
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 25, 18, 30, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 26, 18, 30, 0).unwrap());
        assert_eq!(Some(end), cal.start_of(day(2025, 3, 27)));
    }

    #[test]
    fn test_day_window_keeps_last_microsecond() {
        // ---
        let cal = ist();
        let (start, end) = cal.day_window(day(2025, 3, 26)).unwrap();
        let late = end - Duration::microseconds(1);

        assert!(start <= late && late < end);
        assert_eq!(cal.date_of(late), day(2025, 3, 26));
    }

    #[test]
    fn test_date_of_crosses_midnight() {
        // ---
        let cal = ist();
        let late_utc = Utc.with_ymd_and_hms(2025, 3, 26, 19, 0, 0).unwrap();
        assert_eq!(cal.date_of(late_utc), day(2025, 3, 27));

        let utc_cal = Calendar::new(FixedOffset::east_opt(0).unwrap());
        assert_eq!(utc_cal.date_of(late_utc), day(2025, 3, 26));
    }

    #[test]
    fn test_month_start() {
        // ---
        let cal = ist();
        assert_eq!(cal.month_start(day(2025, 3, 26)), cal.start_of(day(2025, 3, 1)));
        assert_eq!(cal.month_start(day(2025, 3, 1)), cal.start_of(day(2025, 3, 1)));
    }

    #[test]
    fn test_daywise_window_is_shifted_utc_day() {
        // ---
        let (start, end) = daywise_window(day(2025, 1, 5)).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 5, 5, 30, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 6, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_extreme_dates_have_no_window() {
        // ---
        let cal = ist();
        assert_eq!(cal.start_of(NaiveDate::MIN), None);
        assert_eq!(cal.day_window(NaiveDate::MIN), None);
        assert_eq!(cal.day_window(NaiveDate::MAX), None);
        assert_eq!(daywise_window(NaiveDate::MAX), None);

        // West of UTC the first representable day still has a start
        let west = Calendar::new(FixedOffset::west_opt(3600).unwrap());
        assert!(west.start_of(NaiveDate::MIN).is_some());
    }
}
