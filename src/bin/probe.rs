// src/bin/probe.rs
//
// Smoke client: drives a running server through a small planning
// scenario end to end. Start the server first, then `cargo run --bin
// probe`.

use chrono::{Local, TimeDelta};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::error::Error;

// Response types, wire-side minutes kept as plain integers.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    counts: Counts,
}

#[derive(Debug, Deserialize)]
struct Counts {
    users: usize,
    projects: usize,
    capacities: usize,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DaySlot {
    date: String,
    capacity: i64,
    booked: i64,
    leave: i64,
    available: i64,
}

#[derive(Debug, Deserialize)]
struct Report {
    day_count: usize,
    days: Vec<DaySlot>,
    next_available_date: String,
    initial_load: i64,
    total_load: i64,
    balance: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url =
        std::env::var("PROBE_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let client = Client::new();
    let today = Local::now().date_naive();

    // Test 1: Status check
    println!("\n🔍 Checking server status...");
    let status = client
        .get(format!("{}/status", base_url))
        .send()
        .await?
        .json::<StatusResponse>()
        .await?;
    println!(
        "Server is {} ({} users, {} projects, {} capacity rows)",
        status.status, status.counts.users, status.counts.projects, status.counts.capacities
    );

    // Test 2: Seed a user, a location and a small project tree
    println!("\n🔍 Creating probe data...");
    let user = client
        .post(format!("{}/api/users", base_url))
        .json(&json!({
            "username": format!("probe-{}", today),
            "email": "probe@example.com",
        }))
        .send()
        .await?
        .json::<Created>()
        .await?;
    println!("Created user {}", user.id);

    let location = client
        .post(format!("{}/api/locations", base_url))
        .json(&json!({ "title": "Probe desk" }))
        .send()
        .await?
        .json::<Created>()
        .await?;

    let project = client
        .post(format!("{}/api/projects", base_url))
        .json(&json!({ "parent": null, "title": "Probe project" }))
        .send()
        .await?
        .json::<Created>()
        .await?;
    println!("Created project {}", project.id);

    // Test 3: Capacity for two days, a 4h backlog, 2h already worked
    for offset in 0..2 {
        let response = client
            .post(format!("{}/api/capacities", base_url))
            .json(&json!({
                "user": user.id,
                "date": (today + TimeDelta::days(offset)).to_string(),
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            println!("Capacity insert failed: {}", response.text().await?);
            return Ok(());
        }
    }

    client
        .post(format!("{}/api/resources", base_url))
        .json(&json!({
            "user": user.id,
            "project": project.id,
            "date": null,
            "duration": 240,
        }))
        .send()
        .await?
        .error_for_status()?;

    client
        .post(format!("{}/api/activities", base_url))
        .json(&json!({
            "user": user.id,
            "project": project.id,
            "date": (today - TimeDelta::days(1)).to_string(),
            "duration": 120,
            "progression": 50,
            "location": location.id,
        }))
        .send()
        .await?
        .error_for_status()?;
    println!("Seeded capacities, backlog and one worked activity");

    // Test 4: The availability report
    println!("\n🔍 Fetching the availability report...");
    let report = client
        .get(format!(
            "{}/api/report?user={}&date={}",
            base_url, user.id, today
        ))
        .send()
        .await?
        .json::<Report>()
        .await?;

    println!(
        "Report spans {} day(s), backlog {} min (residual {} min), balance {} min",
        report.day_count, report.initial_load, report.total_load, report.balance
    );
    for day in &report.days {
        println!(
            "  {}  capacity {:>4}  booked {:>4}  leave {:>4}  available {:>4}",
            day.date, day.capacity, day.booked, day.leave, day.available
        );
    }
    println!("Next free date: {}", report.next_available_date);

    // Test 5: CSV exports
    println!("\n🔍 Fetching the activities export...");
    let csv = client
        .get(format!(
            "{}/api/export/activities?user={}",
            base_url, user.id
        ))
        .send()
        .await?
        .text()
        .await?;
    println!("{}", csv.trim_end());

    println!("\n✅ Probe complete!");
    Ok(())
}
