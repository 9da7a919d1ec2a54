//! Scheduling data types.
//!
//! Layers, plannings and schedules are re-fetched on every dispatch run and
//! never persisted by the engine. `PlanningCommand` is the ephemeral
//! structure the resolver builds and the dispatcher consumes within a
//! single run.

use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Minutes since midnight, `0..=1440`.
///
/// A plain `NaiveTime` cannot express the exclusive end of a full-day
/// window (`24:00`), which the off-day override relies on, so schedule
/// bounds are kept as minute counts instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClockTime(u16);

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);
    pub const END_OF_DAY: ClockTime = ClockTime(24 * 60);

    /// Build from hour/minute components. Returns `None` out of range.
    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour > 24 || minute > 59 || (hour == 24 && minute != 0) {
            return None;
        }
        Some(ClockTime(hour * 60 + minute))
    }

    /// Parse an `"H:MM"` / `"HH:MM"` string.
    ///
    /// A missing or unparseable value defaults to midnight; schedule rows
    /// with blank bounds behave as if they started the day.
    pub fn parse_or_midnight(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or(Self::MIDNIGHT)
    }

    fn parse(value: &str) -> Option<Self> {
        let (hour, minute) = value.trim().split_once(':')?;
        let hour: u16 = hour.parse().ok()?;
        let minute: u16 = minute.parse().ok()?;
        Self::from_hm(hour, minute)
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Weekday bitmask used for planning off-days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOffMask(u8);

impl DayOffMask {
    pub const EMPTY: DayOffMask = DayOffMask(0);

    /// Build a mask from raw bits (bit 0 = Monday .. bit 6 = Sunday).
    pub fn from_bits(bits: u8) -> Self {
        DayOffMask(bits & 0x7f)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn with(self, day: Weekday) -> Self {
        DayOffMask(self.0 | 1 << day.num_days_from_monday())
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    /// Iterate the flagged weekdays, Monday first.
    pub fn days(self) -> impl Iterator<Item = Weekday> {
        ALL_WEEKDAYS.into_iter().filter(move |day| self.contains(*day))
    }
}

/// All weekdays, Monday first, matching the bitmask layout.
pub const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Grouping of devices used to associate them with a planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub name: String,
    /// Assigned planning, absent or `"None"` when unplanned.
    pub planning_id: Option<String>,
}

/// Named schedule definition with an activity window, off-day override and
/// fallback command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Planning {
    pub id: String,
    pub name: String,
    /// First calendar day the planning is active (inclusive).
    pub start_day: NaiveDate,
    /// Last calendar day the planning is active (inclusive).
    pub end_day: NaiveDate,
    /// Days on which the off-day command replaces all regular schedules.
    pub day_off: DayOffMask,
    /// Command dispatched all day on flagged off-days.
    pub command_id: String,
}

impl Planning {
    /// Whether the planning is active on the given calendar day.
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_day <= day && day <= self.end_day
    }
}

/// Concrete time-windowed command entry belonging to a planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub planning_id: String,
    /// `"H:MM"` / `"HH:MM"`; blank defaults to `00:00`.
    pub start: Option<String>,
    pub end: Option<String>,
    pub command_id: String,
}

/// Time-windowed command payload resolved for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadCommand {
    pub command_id: String,
    pub start: ClockTime,
    pub end: ClockTime,
}

impl PayloadCommand {
    /// Full-day off-day override payload for a planning.
    pub fn full_day(command_id: impl Into<String>) -> Self {
        Self { command_id: command_id.into(), start: ClockTime::MIDNIGHT, end: ClockTime::END_OF_DAY }
    }

    /// Whether this payload is the `00:00`–`24:00` off-day sentinel.
    pub fn is_full_day(&self) -> bool {
        self.start == ClockTime::MIDNIGHT && self.end == ClockTime::END_OF_DAY
    }

    /// Strict window match: `start < now < end`. A command whose window
    /// exactly starts or ends at `now` does not match.
    pub fn matches(&self, now: ClockTime) -> bool {
        self.start < now && now < self.end
    }
}

/// Ephemeral per-planning dispatch structure, built fresh each run.
#[derive(Debug, Clone, Default)]
pub struct PlanningCommand {
    pub planning_id: String,
    /// Device ids grouped under the planning, in encounter order; dispatch
    /// follows this order.
    pub device_ids: Vec<String>,
    /// Resolved payloads per weekday.
    pub commands_by_day: HashMap<Weekday, Vec<PayloadCommand>>,
}

impl PlanningCommand {
    pub fn new(planning_id: impl Into<String>) -> Self {
        Self { planning_id: planning_id.into(), ..Self::default() }
    }

    /// Payloads resolved for the given weekday, empty when none.
    pub fn commands_for(&self, day: Weekday) -> &[PayloadCommand] {
        self.commands_by_day.get(&day).map(Vec::as_slice).unwrap_or_default()
    }
}
