// src/schedule.rs
//
// Daily Allocation Engine. Turns a user's Capacity, Resource and Leave
// rows into a forward-looking day-by-day schedule and greedily absorbs
// the outstanding project backlog into whatever slack the days offer.

use std::collections::HashMap;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::balance::{balance_as_of, day_before};
use crate::model::{duration_minutes, User};
use crate::project_tree;
use crate::store::TrackerStore;

/// One day of the schedule. `available` is the slack left after the
/// greedy pass, not the raw capacity minus commitments; an
/// over-committed day shows up negative and is never consumed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySlot {
    pub date: NaiveDate,
    #[serde(with = "duration_minutes")]
    pub capacity: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub booked: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub leave: TimeDelta,
    #[serde(with = "duration_minutes")]
    pub available: TimeDelta,
}

/// Backlog contribution of one project, before pinned time is deducted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectLoad {
    pub title: String,
    #[serde(with = "duration_minutes")]
    pub load: TimeDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub start_date: NaiveDate,
    /// Latest known capacity date. Equal to `start_date` when the user
    /// has no capacity records; can sit before `start_date` when all of
    /// them are in the past (the day list is empty either way).
    pub end_date: NaiveDate,
    pub day_count: usize,
    pub days: Vec<DaySlot>,
    /// First day on which the whole backlog is absorbed. Stays at
    /// `start_date` when the backlog overflows the horizon; a residual
    /// `total_load` above zero tells the two cases apart.
    pub next_available_date: NaiveDate,
    #[serde(with = "duration_minutes")]
    pub initial_load: TimeDelta,
    /// Residual backlog after the greedy pass.
    #[serde(with = "duration_minutes")]
    pub total_load: TimeDelta,
    pub project_loads: Vec<ProjectLoad>,
    /// Hours balance as of the day before `start_date`.
    #[serde(with = "duration_minutes")]
    pub balance: TimeDelta,
}

/// Builds the availability report for one user, looking forward from
/// `start_date` to the user's capacity horizon.
pub fn availability_report(
    store: &TrackerStore,
    user: &User,
    start_date: NaiveDate,
) -> AvailabilityReport {
    let resources = store.resources_for(user.id);
    let capacities = store.capacities_for(user.id);
    let leaves = store.leaves_for(user.id);

    // Outstanding load: each project the user holds resources on
    // contributes its share of the remaining work, where the share is
    // the user's part of the project's total allotment.
    let mut own_by_project: HashMap<_, TimeDelta> = HashMap::new();
    for resource in &resources {
        let entry = own_by_project
            .entry(resource.project)
            .or_insert_with(TimeDelta::zero);
        *entry = *entry + resource.duration;
    }

    let mut project_loads = Vec::new();
    let mut load_sum = TimeDelta::zero();
    for (project_id, own) in own_by_project {
        let (project, aggregates) = match (
            store.project(project_id),
            project_tree::aggregate_project(store, project_id),
        ) {
            (Some(project), Some(aggregates)) => (project, aggregates),
            _ => continue,
        };
        let share = if aggregates.allotted_time == TimeDelta::zero() {
            // Nothing formally allotted: the user carries the project
            // alone.
            1.0
        } else {
            own.num_seconds() as f64 / aggregates.allotted_time.num_seconds() as f64
        };
        let load = TimeDelta::seconds(
            (aggregates.remaining_time_needed.num_seconds() as f64 * share).round() as i64,
        );
        load_sum = load_sum + load;
        project_loads.push(ProjectLoad {
            title: project.title,
            load,
        });
    }
    project_loads.sort_by(|a, b| a.title.cmp(&b.title));

    // Date-pinned resources are already committed to a day; that time
    // must not be fitted into future slack a second time.
    let pinned = resources
        .iter()
        .filter(|r| r.date.is_some())
        .fold(TimeDelta::zero(), |acc, r| acc + r.duration);
    let initial_load = load_sum - pinned;

    let capacity_by_day = bucket_by_day(capacities.iter().map(|c| (c.date, c.duration)));
    let booked_by_day = bucket_by_day(
        resources
            .iter()
            .filter_map(|r| r.date.map(|date| (date, r.duration))),
    );
    let leave_by_day = bucket_by_day(leaves.iter().map(|l| (l.date, l.duration)));

    let horizon = store.latest_capacity_date(user.id);
    let end_date = horizon.unwrap_or(start_date);

    // Fold over the ascending day range, threading the residual load
    // and the first fully-absorbed date. No capacity records at all
    // means no days, not a single-day schedule.
    let (days, total_load, absorbed_on) = match horizon {
        None => (Vec::new(), initial_load, None),
        Some(end) => start_date
            .iter_days()
            .take_while(|date| *date <= end)
            .fold(
                (Vec::new(), initial_load, None),
                |(mut days, mut load, mut absorbed_on), date| {
                    let capacity = capacity_by_day
                        .get(&date)
                        .copied()
                        .unwrap_or_else(TimeDelta::zero);
                    let booked = booked_by_day
                        .get(&date)
                        .copied()
                        .unwrap_or_else(TimeDelta::zero);
                    let leave = leave_by_day
                        .get(&date)
                        .copied()
                        .unwrap_or_else(TimeDelta::zero);
                    let slack = capacity - booked - leave;

                    let mut available = slack;
                    if slack > TimeDelta::zero() && load > TimeDelta::zero() {
                        if load > slack {
                            load = load - slack;
                            available = TimeDelta::zero();
                        } else {
                            available = slack - load;
                            load = TimeDelta::zero();
                            // First day the backlog reaches zero; the
                            // load guard keeps later days from
                            // reassigning it.
                            absorbed_on = Some(date);
                        }
                    }
                    days.push(DaySlot {
                        date,
                        capacity,
                        booked,
                        leave,
                        available,
                    });
                    (days, load, absorbed_on)
                },
            ),
    };

    debug!(
        "Availability for {}: {} days, load {} -> {}",
        user.username,
        days.len(),
        initial_load.num_minutes(),
        total_load.num_minutes()
    );

    AvailabilityReport {
        start_date,
        end_date,
        day_count: days.len(),
        days,
        next_available_date: absorbed_on.unwrap_or(start_date),
        initial_load,
        total_load,
        project_loads,
        balance: balance_as_of(store, user, day_before(start_date)),
    }
}

fn bucket_by_day<I>(items: I) -> HashMap<NaiveDate, TimeDelta>
where
    I: Iterator<Item = (NaiveDate, TimeDelta)>,
{
    let mut buckets: HashMap<NaiveDate, TimeDelta> = HashMap::new();
    for (date, duration) in items {
        let entry = buckets.entry(date).or_insert_with(TimeDelta::zero);
        *entry = *entry + duration;
    }
    buckets
}
