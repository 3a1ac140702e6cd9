//! Next-occurrence and days-until arithmetic for dated events.
//!
//! A recurring event repeats every year on the month/day of its base date.
//! A Feb 29 base date recurs on Feb 28 in years without a Feb 29; every
//! function below goes through [`anniversary_in`] so that rule is applied
//! in exactly one place.
//!
//! "Today" is always a calendar date in the user's timezone. Day differences
//! are computed between local midnights and rounded to the nearest whole day,
//! so a 23- or 25-hour DST day still counts as one day.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// The date on which `base` falls in `year`.
///
/// Feb 29 maps to Feb 28 when `year` is not a leap year. Years outside the
/// representable range return `base` unchanged.
pub fn anniversary_in(base: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, base.month(), base.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, base.month(), base.day() - 1))
        .unwrap_or(base)
}

/// The occurrence of an event that callers should plan against.
///
/// Non-recurring events always return `base`, even when it lies in the past.
/// Recurring events return this year's anniversary unless it is already
/// before `today`, in which case next year's anniversary is returned. An
/// anniversary falling on `today` counts as not yet passed.
pub fn occurrence_date(base: NaiveDate, recurring: bool, today: NaiveDate) -> NaiveDate {
    if !recurring {
        return base;
    }

    let this_year = anniversary_in(base, today.year());
    if this_year < today {
        anniversary_in(base, today.year() + 1)
    } else {
        this_year
    }
}

/// Whole days from `now`'s local date until the event's occurrence.
///
/// `0` means today, `1` tomorrow, negative values a past non-recurring date.
pub fn days_until<Tz: TimeZone>(date: NaiveDate, recurring: bool, now: &DateTime<Tz>) -> i64 {
    let tz = now.timezone();
    let today = now.date_naive();
    let target = occurrence_date(date, recurring, today);

    let from = local_midnight(&tz, today);
    let to = local_midnight(&tz, target);
    let seconds = (to - from).num_seconds() as f64;

    (seconds / SECONDS_PER_DAY).round() as i64
}

/// Resolve a local wall-clock time on `date` to an instant in `tz`.
///
/// Ambiguous times (autumn fall-back) resolve to the earlier instant. Times
/// inside a spring-forward gap are pushed forward by one hour, past the gap.
pub fn localize<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        }
    }
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    localize(tz, date, NaiveTime::MIN)
}
