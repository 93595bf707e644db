// src/project_tree.rs
//
// Everything a project "knows" about itself beyond title and parent is
// derived here from Activity and Resource rows, per node or over the
// whole subtree. Nothing is cached; the row counts stay small enough
// that a linear walk per request is the simple and correct choice.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::model::{duration_minutes, ProjectId, UserId};
use crate::store::TrackerStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAggregates {
    /// Hours assigned to this node via Resource rows.
    #[serde(with = "duration_minutes")]
    pub allotted_time: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub total_allotted_time: TimeDelta,
    /// Hours actually worked on this node via Activity rows.
    #[serde(with = "duration_minutes")]
    pub duration: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub total: TimeDelta,
    /// Latest reported completion percentage, 0 when none reported.
    pub progression: u8,
    pub total_progression: u8,
    #[serde(with = "duration_minutes")]
    pub remaining_time_needed: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub total_remaining_time_needed: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub remaining_time_allotted: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub total_remaining_time_allotted: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub margin: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub total_margin: TimeDelta,
    pub is_completed: bool,
    pub depth: usize,
}

/// Computes the full aggregate set for one project node. Returns None
/// when the project does not exist.
pub fn aggregate_project(store: &TrackerStore, id: ProjectId) -> Option<ProjectAggregates> {
    store.project(id)?;

    let allotted_time = own_allotted(store, id);
    let duration = own_duration(store, id);
    let progression = store.latest_progression(id).unwrap_or(0);
    let remaining_time_needed = remaining_needed(allotted_time, duration, progression);

    let mut total_allotted_time = TimeDelta::zero();
    let mut total = TimeDelta::zero();
    let mut total_remaining_time_needed = TimeDelta::zero();
    for node in store.descendants(id, true) {
        let node_allotted = own_allotted(store, node);
        let node_duration = own_duration(store, node);
        let node_progression = store.latest_progression(node).unwrap_or(0);
        total_allotted_time = total_allotted_time + node_allotted;
        total = total + node_duration;
        total_remaining_time_needed = total_remaining_time_needed
            + remaining_needed(node_allotted, node_duration, node_progression);
    }

    let remaining_time_allotted = allotted_time - duration;
    let total_remaining_time_allotted = total_allotted_time - total;

    Some(ProjectAggregates {
        allotted_time,
        total_allotted_time,
        duration,
        total,
        progression,
        total_progression: completion_percent(total, total_remaining_time_needed),
        remaining_time_needed,
        total_remaining_time_needed,
        remaining_time_allotted,
        total_remaining_time_allotted,
        margin: remaining_time_allotted - remaining_time_needed,
        total_margin: total_remaining_time_allotted - total_remaining_time_needed,
        is_completed: progression == 100,
        depth: store.depth(id),
    })
}

/// Worked time on this node only, restricted to one user's activities.
pub fn duration_by_user(store: &TrackerStore, id: ProjectId, user: UserId) -> TimeDelta {
    store
        .activities_on_project(id)
        .iter()
        .filter(|a| a.user == user)
        .fold(TimeDelta::zero(), |acc, a| acc + a.duration)
}

/// Worked time over the whole subtree, restricted to one user.
pub fn total_duration_by_user(store: &TrackerStore, id: ProjectId, user: UserId) -> TimeDelta {
    store
        .descendants(id, true)
        .into_iter()
        .fold(TimeDelta::zero(), |acc, node| {
            acc + duration_by_user(store, node, user)
        })
}

fn own_allotted(store: &TrackerStore, id: ProjectId) -> TimeDelta {
    store
        .resources_on_project(id)
        .iter()
        .fold(TimeDelta::zero(), |acc, r| acc + r.duration)
}

fn own_duration(store: &TrackerStore, id: ProjectId) -> TimeDelta {
    store
        .activities_on_project(id)
        .iter()
        .fold(TimeDelta::zero(), |acc, a| acc + a.duration)
}

/// Work still needed to finish the node. With no reported progress the
/// full allotment is assumed; otherwise the reported percentage is
/// extrapolated from the time already worked. Not clamped.
pub fn remaining_needed(allotted: TimeDelta, duration: TimeDelta, progression: u8) -> TimeDelta {
    if progression == 0 {
        return allotted;
    }
    let seconds = duration.num_seconds() as f64 * (100.0 / f64::from(progression) - 1.0);
    TimeDelta::seconds(seconds.round() as i64)
}

/// Subtree completion: worked time over worked-plus-needed. 0 when the
/// denominator is not positive (brand-new subtree, nothing reported),
/// deliberately not 100.
fn completion_percent(total: TimeDelta, needed: TimeDelta) -> u8 {
    let denominator = total + needed;
    if denominator <= TimeDelta::zero() {
        return 0;
    }
    let percent = 100 * total.num_seconds() / denominator.num_seconds();
    percent.clamp(0, 100) as u8
}
