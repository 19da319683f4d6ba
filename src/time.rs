//! Calendar timestamp to Julian day conversion

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Nanoseconds in one day
pub const NANOSECONDS_PER_DAY: u64 = 86_400_000_000_000;

/// Julian day number of a proleptic Gregorian date.
///
/// Years use astronomical numbering (1 BC is year 0), which is what chrono
/// stores, so the civil calendar's missing year zero needs no special case.
/// Divisions floor toward negative infinity so dates before the epoch stay
/// exact.
pub fn to_julian_day(date: NaiveDate) -> i64 {
    let year = date.year() as i64;
    let month = date.month() as i64;
    let day = date.day() as i64;

    // Shift the year to start in March so the leap day is the last day.
    let a = (14 - month).div_euclid(12);
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;

    day + (153 * m + 2).div_euclid(5) + 365 * y + y.div_euclid(4) - y.div_euclid(100)
        + y.div_euclid(400)
        - 32045
}

/// Nanoseconds elapsed since midnight.
///
/// A leap second is clamped into the last nanosecond of the day.
pub fn nanoseconds_of_day(time: NaiveTime) -> u64 {
    let nanoseconds =
        time.num_seconds_from_midnight() as u64 * 1_000_000_000 + time.nanosecond() as u64;
    nanoseconds.min(NANOSECONDS_PER_DAY - 1)
}

/// Julian day and nanoseconds of day for a timestamp
pub fn to_julian_day_and_time(timestamp: NaiveDateTime) -> (i64, u64) {
    (
        to_julian_day(timestamp.date()),
        nanoseconds_of_day(timestamp.time()),
    )
}
