//! Notification plan builder.
//!
//! Turns an event occurrence date plus a user's reminder preferences into the
//! set of absolute delivery instants, one per enabled offset. Everything is
//! computed in the user's IANA timezone and normalised to UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::recurrence::localize;

// ---------------------------------------------------------------------------
// Notification kind
// ---------------------------------------------------------------------------

/// Which reminder offset a queue entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    WeekBefore,
    DayBefore,
    SameDay,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 3] = [
        NotificationKind::WeekBefore,
        NotificationKind::DayBefore,
        NotificationKind::SameDay,
    ];

    /// Wire and database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::WeekBefore => "week_before",
            NotificationKind::DayBefore => "day_before",
            NotificationKind::SameDay => "same_day",
        }
    }

    /// How many calendar days before the occurrence this reminder fires.
    pub fn days_before(self) -> u64 {
        match self {
            NotificationKind::WeekBefore => 7,
            NotificationKind::DayBefore => 1,
            NotificationKind::SameDay => 0,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week_before" => Ok(NotificationKind::WeekBefore),
            "day_before" => Ok(NotificationKind::DayBefore),
            "same_day" => Ok(NotificationKind::SameDay),
            other => Err(CoreError::validation(format!(
                "Unknown notification type '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Time of day
// ---------------------------------------------------------------------------

/// A 24h local time-of-day, serialised as `HH:MM`.
///
/// Parsing also accepts `HH:MM:SS` since Postgres `TIME` columns render that
/// way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn as_naive(self) -> NaiveTime {
        self.0
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        Self(t)
    }
}

impl FromStr for TimeOfDay {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(Self)
            .map_err(|_| CoreError::validation(format!("Invalid time of day '{s}', expected HH:MM")))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

pub const DEFAULT_TIMEZONE: &str = "UTC";

/// The reminder settings a plan is built from.
///
/// Missing fields deserialise to the defaults, so a partial preferences
/// object on the wire behaves like an edit of the default set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderPreferences {
    pub notify_week_before: bool,
    pub notify_day_before: bool,
    pub notify_same_day: bool,
    pub week_before_time: TimeOfDay,
    pub day_before_time: TimeOfDay,
    pub same_day_time: TimeOfDay,
    pub push_notifications_enabled: bool,
    pub browser_push_enabled: bool,
    pub timezone: String,
}

impl Default for ReminderPreferences {
    fn default() -> Self {
        Self {
            notify_week_before: false,
            notify_day_before: true,
            notify_same_day: false,
            week_before_time: TimeOfDay(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)),
            day_before_time: TimeOfDay(NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN)),
            same_day_time: TimeOfDay(NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN)),
            push_notifications_enabled: true,
            browser_push_enabled: true,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl ReminderPreferences {
    /// Enabled offsets paired with their local delivery time.
    pub fn enabled_offsets(&self) -> Vec<(NotificationKind, TimeOfDay)> {
        let mut out = Vec::with_capacity(3);
        if self.notify_week_before {
            out.push((NotificationKind::WeekBefore, self.week_before_time));
        }
        if self.notify_day_before {
            out.push((NotificationKind::DayBefore, self.day_before_time));
        }
        if self.notify_same_day {
            out.push((NotificationKind::SameDay, self.same_day_time));
        }
        out
    }

    pub fn tz(&self) -> Result<Tz, CoreError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| CoreError::validation(format!("Unknown timezone '{}'", self.timezone)))
    }

    /// Whether the dispatcher may deliver anything for this user.
    pub fn delivery_enabled(&self) -> bool {
        self.push_notifications_enabled && self.browser_push_enabled
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.tz().map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One candidate queue entry produced by [`build_plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedNotification {
    pub kind: NotificationKind,
    pub scheduled_time: DateTime<Utc>,
    pub occurrence_date: NaiveDate,
}

/// Build the delivery plan for one occurrence.
///
/// Entries scheduled at or before `now` are omitted. An invalid timezone is
/// the only error.
pub fn build_plan(
    occurrence: NaiveDate,
    prefs: &ReminderPreferences,
    now: DateTime<Utc>,
) -> Result<Vec<PlannedNotification>, CoreError> {
    let tz = prefs.tz()?;

    let plan = prefs
        .enabled_offsets()
        .into_iter()
        .filter_map(|(kind, time)| {
            let day = occurrence.checked_sub_days(Days::new(kind.days_before()))?;
            let scheduled_time = localize(&tz, day, time.as_naive()).with_timezone(&Utc);
            (scheduled_time > now).then_some(PlannedNotification {
                kind,
                scheduled_time,
                occurrence_date: occurrence,
            })
        })
        .collect();

    Ok(plan)
}
