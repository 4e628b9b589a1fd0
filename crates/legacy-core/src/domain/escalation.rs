//! Escalation policy: decides when a step of the sequence is due.
//!
//! Pure functions of the cycle start and "now"; no side effects, no failure
//! modes. All calendar arithmetic is done on UTC dates.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Number of days in the given month, leap years included.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|date| date.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

/// Is the step configured for `step_month_day` due, for a cycle started at `started_at`?
///
/// The month length is taken from the month containing `started_at`, not the
/// current month. A day that does not exist in that month (e.g. 31 in April)
/// fires on the last day of the month only; any other day fires on or after
/// the configured day, covering missed runs.
pub fn is_notification_due(started_at: DateTime<Utc>, step_month_day: u32, now: DateTime<Utc>) -> bool {
    let max_month_day = days_in_month(started_at.year(), started_at.month());
    let current_month_day = now.day();

    if step_month_day > max_month_day {
        return current_month_day == max_month_day;
    }

    current_month_day >= step_month_day
}

/// Has a new calendar month begun since `started_at`?
///
/// Only year and month are compared: Jan 31 -> Feb 1 counts, Jan 1 -> Jan 31 does not.
pub fn has_new_month_begun(started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now.year(), now.month()) > (started_at.year(), started_at.month())
}

/// Builds the date in the current month for `month_day`, clamped to the month end.
pub fn date_in_month_of(now: DateTime<Utc>, month_day: u32) -> NaiveDate {
    let last = days_in_month(now.year(), now.month());
    let day = month_day.clamp(1, last);
    NaiveDate::from_ymd_opt(now.year(), now.month(), day).unwrap_or_else(|| now.date_naive())
}

/// Same as [`date_in_month_of`], for the calendar month after `now`.
pub fn date_in_next_month_of(now: DateTime<Utc>, month_day: u32) -> NaiveDate {
    let (year, month) = match now.month() {
        12 => (now.year() + 1, 1),
        month => (now.year(), month + 1),
    };
    let day = month_day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| now.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    #[rstest]
    #[case::january(2025, 1, 31)]
    #[case::april(2025, 4, 30)]
    #[case::february(2025, 2, 28)]
    #[case::leap_february(2024, 2, 29)]
    #[case::century_february(2100, 2, 28)]
    #[case::leap_century_february(2000, 2, 29)]
    #[case::december(2025, 12, 31)]
    fn month_lengths(#[case] year: i32, #[case] month: u32, #[case] expected: u32) {
        assert_eq!(days_in_month(year, month), expected);
    }

    #[rstest]
    #[case::before(9, false)]
    #[case::on_day(10, true)]
    #[case::after_missed_run(17, true)]
    fn due_on_or_after_configured_day(#[case] today: u32, #[case] expected: bool) {
        let started = at(2025, 3, 1);
        assert_eq!(is_notification_due(started, 10, at(2025, 3, today)), expected);
    }

    #[rstest]
    #[case::april_29(at(2025, 4, 29), false)]
    #[case::april_30(at(2025, 4, 30), true)]
    #[case::may_1(at(2025, 5, 1), false)]
    fn day_31_in_april_falls_back_to_last_day(#[case] now: DateTime<Utc>, #[case] expected: bool) {
        let started = at(2025, 4, 2);
        assert_eq!(is_notification_due(started, 31, now), expected);
    }

    #[test]
    fn month_length_comes_from_started_month() {
        // Started in February: day 30 does not exist, so only the 28th qualifies,
        // even when "now" is already in a 31-day month.
        let started = at(2025, 2, 3);
        assert!(!is_notification_due(started, 30, at(2025, 3, 30)));
        assert!(is_notification_due(started, 30, at(2025, 3, 28)));
    }

    #[test]
    fn due_check_is_monotonic_within_month() {
        let started = at(2025, 7, 1);
        for step in [1, 5, 15, 28] {
            let mut was_due = false;
            for day in 1..=31 {
                let due = is_notification_due(started, step, at(2025, 7, day));
                assert!(!was_due || due, "step {step} stopped being due on day {day}");
                was_due = due;
            }
        }
    }

    #[rstest]
    #[case::same_month(at(2025, 1, 10), at(2025, 1, 31), false)]
    #[case::next_month_first_day(at(2025, 1, 31), at(2025, 2, 1), true)]
    #[case::next_month_before_start_day(at(2025, 1, 20), at(2025, 2, 10), true)]
    #[case::across_year(at(2024, 12, 10), at(2025, 1, 1), true)]
    #[case::same_month_next_year(at(2025, 1, 20), at(2026, 1, 5), true)]
    #[case::earlier_month(at(2025, 3, 1), at(2025, 2, 27), false)]
    fn new_month_begun(#[case] started: DateTime<Utc>, #[case] now: DateTime<Utc>, #[case] expected: bool) {
        assert_eq!(has_new_month_begun(started, now), expected);
    }

    #[test]
    fn date_in_month_clamps_to_month_end() {
        let now = at(2025, 4, 12);
        assert_eq!(date_in_month_of(now, 31), NaiveDate::from_ymd_opt(2025, 4, 30).unwrap());
        assert_eq!(date_in_month_of(now, 15), NaiveDate::from_ymd_opt(2025, 4, 15).unwrap());
        assert_eq!(date_in_month_of(now, 0), NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
    }

    #[rstest]
    #[case::next_month(at(2025, 3, 22), 10, (2025, 4, 10))]
    #[case::clamped(at(2025, 1, 15), 31, (2025, 2, 28))]
    #[case::december(at(2025, 12, 2), 5, (2026, 1, 5))]
    fn date_in_next_month(#[case] now: DateTime<Utc>, #[case] day: u32, #[case] expected: (i32, u32, u32)) {
        let (y, m, d) = expected;
        assert_eq!(date_in_next_month_of(now, day), NaiveDate::from_ymd_opt(y, m, d).unwrap());
    }
}
