//! Upcoming-window filtering for event listings.

use chrono::{DateTime, NaiveDate, TimeZone};

use crate::recurrence::{days_until, occurrence_date};

/// An item annotated with its next occurrence relative to "now".
#[derive(Debug, Clone, PartialEq)]
pub struct Upcoming<T> {
    pub item: T,
    pub next_occurrence: NaiveDate,
    pub days_until: i64,
}

/// Whether an occurrence `days` away falls in `[0, window]`.
pub fn is_upcoming(days: i64, window: i64) -> bool {
    (0..=window).contains(&days)
}

/// Keep items whose next occurrence is within `window` days, soonest first.
///
/// `date_of` extracts the base date and recurring flag of each item. Ties
/// keep their input order.
pub fn within_window<T, Tz, F>(
    items: impl IntoIterator<Item = T>,
    window: i64,
    now: &DateTime<Tz>,
    date_of: F,
) -> Vec<Upcoming<T>>
where
    Tz: TimeZone,
    F: Fn(&T) -> (NaiveDate, bool),
{
    let today = now.date_naive();
    let mut out: Vec<Upcoming<T>> = items
        .into_iter()
        .filter_map(|item| {
            let (base, recurring) = date_of(&item);
            let days = days_until(base, recurring, now);
            is_upcoming(days, window).then(|| Upcoming {
                next_occurrence: occurrence_date(base, recurring, today),
                days_until: days,
                item,
            })
        })
        .collect();

    out.sort_by_key(|u| u.days_until);
    out
}
