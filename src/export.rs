// src/export.rs
use anyhow::Result;

use crate::model::{format_hours, UserId};
use crate::schedule::AvailabilityReport;
use crate::store::TrackerStore;

/// One user's activities as CSV, newest first. Zero durations render as
/// empty cells, like everywhere else hours are shown.
pub fn activities_csv(store: &TrackerStore, user: UserId) -> Result<Vec<u8>> {
    let mut activities = store.activities_for(user);
    activities.sort_by(|a, b| b.date.cmp(&a.date));

    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "Date",
        "Project",
        "Duration",
        "Progression",
        "Location",
        "Teleworking",
        "Business trip",
        "Comment",
    ])?;
    for activity in activities {
        let project = store
            .project(activity.project)
            .map(|p| p.title)
            .unwrap_or_default();
        let location = store
            .location(activity.location)
            .map(|l| l.title)
            .unwrap_or_default();
        writer.write_record([
            activity.date.to_string(),
            project,
            format_hours(activity.duration),
            activity
                .progression
                .map(|p| p.to_string())
                .unwrap_or_default(),
            location,
            yes_no(activity.is_teleworking),
            yes_no(activity.is_business_trip),
            activity.comment.unwrap_or_default(),
        ])?;
    }
    Ok(writer.into_inner()?)
}

/// One user's leaves as CSV, newest first. The one-letter codes are
/// what the payroll side ingests.
pub fn leaves_csv(store: &TrackerStore, user: UserId) -> Result<Vec<u8>> {
    let mut leaves = store.leaves_for(user);
    leaves.sort_by(|a, b| b.date.cmp(&a.date));

    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["Date", "Code", "Kind", "Duration"])?;
    for leave in leaves {
        writer.write_record([
            leave.date.to_string(),
            leave.kind.code().to_string(),
            leave.kind.label().to_string(),
            format_hours(leave.duration),
        ])?;
    }
    Ok(writer.into_inner()?)
}

/// A computed availability schedule as CSV, one row per day.
pub fn schedule_csv(report: &AvailabilityReport) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["Date", "Capacity", "Booked", "Leave", "Available"])?;
    for slot in &report.days {
        writer.write_record([
            slot.date.to_string(),
            format_hours(slot.capacity),
            format_hours(slot.booked),
            format_hours(slot.leave),
            format_hours(slot.available),
        ])?;
    }
    Ok(writer.into_inner()?)
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}
