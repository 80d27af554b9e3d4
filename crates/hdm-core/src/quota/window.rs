//! Rolling-window start computation for quota periods.
//!
//! Windows are calendar-aligned, not sliding: the hourly window starts at the
//! top of the current hour, the daily window at local midnight, the monthly
//! window on the first of the current month at 00:00.

use chrono::{DateTime, Datelike, LocalResult, NaiveDateTime, TimeZone, Timelike};

/// Unix seconds of the top of the hour containing `now`.
pub(crate) fn hour_start<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    now.clone()
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .map(|t| t.timestamp())
        .unwrap_or_else(|| now.timestamp())
}

/// Unix seconds of local midnight of the day containing `now`.
pub(crate) fn day_start<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let Some(midnight) = now.date_naive().and_hms_opt(0, 0, 0) else {
        return now.timestamp();
    };
    local_timestamp(now, midnight)
}

/// Unix seconds of 00:00 on the first day of the month containing `now`.
pub(crate) fn month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let Some(first_midnight) = now
        .date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return now.timestamp();
    };
    local_timestamp(now, first_midnight)
}

/// Resolve a naive local datetime in `now`'s zone. DST gaps fall back to `now`
/// itself; ambiguous times take the earlier instant (the wider window).
fn local_timestamp<Tz: TimeZone>(now: &DateTime<Tz>, naive: NaiveDateTime) -> i64 {
    match now.timezone().from_local_datetime(&naive) {
        LocalResult::Single(t) => t.timestamp(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
        LocalResult::None => now.timestamp(),
    }
}
