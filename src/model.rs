// src/model.rs
use chrono::{NaiveDate, TimeDelta};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Identifiers ---

pub type UserId = Uuid;
pub type LocationId = Uuid;
pub type ProjectId = Uuid;
pub type ActivityId = Uuid;
pub type LeaveId = Uuid;
pub type ResourceId = Uuid;
pub type CapacityId = Uuid;

// --- Working time ---

/// Length of one standard working day. Leaves, resources and capacities
/// default to this when no duration is given.
pub static DAILY_WORKING_TIME: Lazy<TimeDelta> = Lazy::new(|| TimeDelta::hours(7));

pub fn default_day_duration() -> TimeDelta {
    *DAILY_WORKING_TIME
}

pub fn default_activity_duration() -> TimeDelta {
    TimeDelta::hours(1)
}

// --- Wire format for durations ---

/// Durations cross the wire as whole minutes (signed). Anything below a
/// minute does not survive a round trip.
pub mod duration_minutes {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(value.num_minutes())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
    where
        D: Deserializer<'de>,
    {
        let minutes = i64::deserialize(deserializer)?;
        Ok(TimeDelta::minutes(minutes))
    }
}

/// Renders a duration as `13h07`. The zero duration renders as an empty
/// string, negative durations keep their sign, sub-minute residue is
/// dropped.
pub fn format_hours(value: TimeDelta) -> String {
    if value == TimeDelta::zero() {
        return String::new();
    }
    let sign = if value < TimeDelta::zero() { "-" } else { "" };
    let total_minutes = value.num_minutes().abs();
    format!("{}{}h{:02}", sign, total_minutes / 60, total_minutes % 60)
}

// --- Entities ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Opening flexitime balance, carried into every balance computation.
    #[serde(with = "duration_minutes", default = "TimeDelta::zero")]
    pub start_balance: TimeDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub title: String,
    pub comment: Option<String>,
}

/// A node of the project tree. Everything beyond parent/title is
/// computed on demand, never stored (see `project_tree`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub parent: Option<ProjectId>,
    pub title: String,
    pub comment: Option<String>,
}

/// Worked time reported by a user on a project for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub user: UserId,
    pub project: ProjectId,
    pub date: NaiveDate,
    #[serde(with = "duration_minutes", default = "default_activity_duration")]
    pub duration: TimeDelta,
    /// Estimated completion of the whole project after this activity,
    /// in percent. The latest non-null one wins.
    pub progression: Option<u8>,
    pub location: LocationId,
    #[serde(default)]
    pub is_teleworking: bool,
    #[serde(default)]
    pub is_business_trip: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    PaidLeave,
    CompensatoryRest,
    PublicHoliday,
    SickLeave,
    UnpaidLeave,
    Other,
}

impl LeaveKind {
    /// Stable one-letter code, kept from the legacy payroll export.
    pub fn code(&self) -> &'static str {
        match self {
            LeaveKind::PaidLeave => "C",
            LeaveKind::CompensatoryRest => "R",
            LeaveKind::PublicHoliday => "F",
            LeaveKind::SickLeave => "M",
            LeaveKind::UnpaidLeave => "S",
            LeaveKind::Other => "A",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LeaveKind::PaidLeave => "paid leave",
            LeaveKind::CompensatoryRest => "compensatory rest",
            LeaveKind::PublicHoliday => "public holiday",
            LeaveKind::SickLeave => "sick leave",
            LeaveKind::UnpaidLeave => "unpaid leave",
            LeaveKind::Other => "other",
        }
    }
}

/// Absence for one day. Compensatory rest is the one kind that does not
/// count towards the flexitime balance (it repays overtime already
/// counted there).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leave {
    pub id: LeaveId,
    pub user: UserId,
    pub kind: LeaveKind,
    pub date: NaiveDate,
    #[serde(with = "duration_minutes", default = "default_day_duration")]
    pub duration: TimeDelta,
}

/// Planned work for a user on a project. With `date` set the block is
/// pinned to that day and treated as already consumed; without a date it
/// is backlog for the allocation engine to place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub user: UserId,
    pub project: ProjectId,
    pub date: Option<NaiveDate>,
    #[serde(with = "duration_minutes", default = "default_day_duration")]
    pub duration: TimeDelta,
    pub comment: Option<String>,
}

/// Available working time for a user on one day. Several records on the
/// same day add up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub id: CapacityId,
    pub user: UserId,
    pub date: NaiveDate,
    #[serde(with = "duration_minutes", default = "default_day_duration")]
    pub duration: TimeDelta,
}
