// src/main.rs
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate, TimeDelta};
use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod balance;
mod export;
mod model;
mod project_tree;
mod schedule;
mod store;


use model::{
    default_activity_duration, default_day_duration, duration_minutes, Activity, ActivityId,
    Capacity, CapacityId, Leave, LeaveId, LeaveKind, Location, LocationId, Project, ProjectId,
    Resource, ResourceId, User, UserId,
};
use project_tree::ProjectAggregates;
use schedule::availability_report;
use store::{StoreError, TrackerStore};

// --- Error Handling ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("export failed: {0}")]
    Export(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        error!("Error occurred: {}", self);
        let (status_code, error_message) = match &self {
            AppError::Store(store_err) => match store_err {
                StoreError::UnknownUser(_)
                | StoreError::UnknownLocation(_)
                | StoreError::UnknownProject(_)
                | StoreError::UnknownActivity(_)
                | StoreError::UnknownLeave(_)
                | StoreError::UnknownResource(_)
                | StoreError::UnknownCapacity(_) => (StatusCode::NOT_FOUND, store_err.to_string()),
                StoreError::ProgressionOutOfRange(_) | StoreError::ProjectCycle { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, store_err.to_string())
                }
                StoreError::StillReferenced { .. } => {
                    (StatusCode::CONFLICT, store_err.to_string())
                }
            },
            // Keep internals out of the body; the log line above has
            // the details.
            AppError::Export(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Export failed.".to_string(),
            ),
        };

        (
            status_code,
            Json(serde_json::json!({ "error": error_message })),
        )
            .into_response()
    }
}

// --- Configuration ---

#[derive(Debug, Deserialize, Clone)]
struct AppConfig {
    #[serde(default = "default_host")]
    server_host: String,
    #[serde(default = "default_port")]
    server_port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl AppConfig {
    fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        envy::from_env::<AppConfig>()
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "timeplan-core",
    about = "Time tracking and resource planning service"
)]
struct Cli {
    /// Bind address, overrides SERVER_HOST.
    #[arg(long)]
    host: Option<String>,
    /// Port, overrides SERVER_PORT.
    #[arg(long)]
    port: Option<u16>,
    /// Populate the store with a small demo data set on startup.
    #[arg(long)]
    seed_demo: bool,
}

// --- State & Entry Point ---

#[derive(Clone)]
pub struct AppState {
    pub store: TrackerStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config =
        AppConfig::from_env().context("Failed to read configuration from environment")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting timeplan-core");

    let store = TrackerStore::new();
    if cli.seed_demo {
        seed_demo(&store)?;
    }

    let app = build_router(AppState { store });

    let host = cli.host.unwrap_or(config.server_host);
    let port = cli.port.unwrap_or(config.server_port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/api/users", post(create_user).get(list_users))
        .route("/api/users/{id}", delete(delete_user))
        .route("/api/locations", post(create_location).get(list_locations))
        .route("/api/locations/{id}", delete(delete_location))
        .route("/api/projects", post(create_project).get(list_projects))
        .route(
            "/api/projects/{id}",
            get(project_detail).delete(delete_project),
        )
        .route("/api/projects/{id}/move", post(move_project))
        .route("/api/activities", post(create_activity).get(list_activities))
        .route("/api/activities/{id}", delete(delete_activity))
        .route("/api/leaves", post(create_leave).get(list_leaves))
        .route("/api/leaves/{id}", delete(delete_leave))
        .route("/api/resources", post(create_resource).get(list_resources))
        .route("/api/resources/{id}", delete(delete_resource))
        .route("/api/capacities", post(create_capacity).get(list_capacities))
        .route("/api/capacities/{id}", delete(delete_capacity))
        .route("/api/report", get(report))
        .route("/api/export/activities", get(export_activities))
        .route("/api/export/leaves", get(export_leaves))
        .route("/api/export/schedule", get(export_schedule))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Request Payloads ---

#[derive(Debug, Deserialize)]
struct NewUser {
    username: String,
    email: String,
    #[serde(with = "duration_minutes", default = "TimeDelta::zero")]
    start_balance: TimeDelta,
}

#[derive(Debug, Deserialize)]
struct NewLocation {
    title: String,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewProject {
    parent: Option<ProjectId>,
    title: String,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MoveProject {
    parent: Option<ProjectId>,
}

#[derive(Debug, Deserialize)]
struct NewActivity {
    user: UserId,
    project: ProjectId,
    date: NaiveDate,
    #[serde(with = "duration_minutes", default = "default_activity_duration")]
    duration: TimeDelta,
    progression: Option<u8>,
    location: LocationId,
    #[serde(default)]
    is_teleworking: bool,
    #[serde(default)]
    is_business_trip: bool,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewLeave {
    user: UserId,
    kind: LeaveKind,
    date: NaiveDate,
    #[serde(with = "duration_minutes", default = "default_day_duration")]
    duration: TimeDelta,
}

#[derive(Debug, Deserialize)]
struct NewResource {
    user: UserId,
    project: ProjectId,
    date: Option<NaiveDate>,
    #[serde(with = "duration_minutes", default = "default_day_duration")]
    duration: TimeDelta,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewCapacity {
    user: UserId,
    date: NaiveDate,
    #[serde(with = "duration_minutes", default = "default_day_duration")]
    duration: TimeDelta,
}

/// Ownership scope for user-data reads; every such query names its
/// user explicitly.
#[derive(Debug, Deserialize)]
struct UserScope {
    user: UserId,
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    user: UserId,
    /// Schedule start, defaults to the current local date.
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct ProjectDetailQuery {
    user: Option<UserId>,
}

#[derive(Debug, Serialize)]
struct ProjectDetail {
    project: Project,
    children: Vec<ProjectId>,
    aggregates: ProjectAggregates,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_duration: Option<UserDuration>,
}

#[derive(Debug, Serialize)]
struct UserDuration {
    user: UserId,
    #[serde(with = "duration_minutes")]
    duration: TimeDelta,
    #[serde(with = "duration_minutes")]
    total_duration: TimeDelta,
}

// --- Handlers ---

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "counts": state.store.counts(),
    }))
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> impl IntoResponse {
    let user = state.store.add_user(User {
        id: Uuid::new_v4(),
        username: payload.username,
        email: payload.email,
        start_balance: payload.start_balance,
    });
    info!("Created user {} ({})", user.username, user.id);
    (StatusCode::CREATED, Json(user))
}

async fn list_users(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.users())
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<impl IntoResponse, AppError> {
    state.store.remove_user(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_location(
    State(state): State<AppState>,
    Json(payload): Json<NewLocation>,
) -> impl IntoResponse {
    let location = state.store.add_location(Location {
        id: Uuid::new_v4(),
        title: payload.title,
        comment: payload.comment,
    });
    (StatusCode::CREATED, Json(location))
}

async fn list_locations(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.locations())
}

async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<LocationId>,
) -> Result<impl IntoResponse, AppError> {
    state.store.remove_location(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_project(
    State(state): State<AppState>,
    Json(payload): Json<NewProject>,
) -> Result<impl IntoResponse, AppError> {
    let project = state.store.add_project(Project {
        id: Uuid::new_v4(),
        parent: payload.parent,
        title: payload.title,
        comment: payload.comment,
    })?;
    info!("Created project {} ({})", project.title, project.id);
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.projects())
}

async fn project_detail(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    Query(query): Query<ProjectDetailQuery>,
) -> Result<impl IntoResponse, AppError> {
    let project = state
        .store
        .project(id)
        .ok_or(StoreError::UnknownProject(id))?;
    let aggregates = project_tree::aggregate_project(&state.store, id)
        .ok_or(StoreError::UnknownProject(id))?;
    let user_duration = match query.user {
        Some(user_id) => {
            state
                .store
                .user(user_id)
                .ok_or(StoreError::UnknownUser(user_id))?;
            Some(UserDuration {
                user: user_id,
                duration: project_tree::duration_by_user(&state.store, id, user_id),
                total_duration: project_tree::total_duration_by_user(&state.store, id, user_id),
            })
        }
        None => None,
    };
    Ok(Json(ProjectDetail {
        project,
        children: state.store.children(id),
        aggregates,
        user_duration,
    }))
}

async fn move_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    Json(payload): Json<MoveProject>,
) -> Result<impl IntoResponse, AppError> {
    let project = state.store.reparent_project(id, payload.parent)?;
    info!("Moved project {} under {:?}", project.title, project.parent);
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> Result<impl IntoResponse, AppError> {
    state.store.remove_project(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_activity(
    State(state): State<AppState>,
    Json(payload): Json<NewActivity>,
) -> Result<impl IntoResponse, AppError> {
    let activity = state.store.add_activity(Activity {
        id: Uuid::new_v4(),
        user: payload.user,
        project: payload.project,
        date: payload.date,
        duration: payload.duration,
        progression: payload.progression,
        location: payload.location,
        is_teleworking: payload.is_teleworking,
        is_business_trip: payload.is_business_trip,
        comment: payload.comment,
    })?;
    Ok((StatusCode::CREATED, Json(activity)))
}

async fn list_activities(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .user(scope.user)
        .ok_or(StoreError::UnknownUser(scope.user))?;
    Ok(Json(state.store.activities_for(scope.user)))
}

async fn delete_activity(
    State(state): State<AppState>,
    Path(id): Path<ActivityId>,
) -> Result<impl IntoResponse, AppError> {
    state.store.remove_activity(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_leave(
    State(state): State<AppState>,
    Json(payload): Json<NewLeave>,
) -> Result<impl IntoResponse, AppError> {
    let leave = state.store.add_leave(Leave {
        id: Uuid::new_v4(),
        user: payload.user,
        kind: payload.kind,
        date: payload.date,
        duration: payload.duration,
    })?;
    Ok((StatusCode::CREATED, Json(leave)))
}

async fn list_leaves(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .user(scope.user)
        .ok_or(StoreError::UnknownUser(scope.user))?;
    Ok(Json(state.store.leaves_for(scope.user)))
}

async fn delete_leave(
    State(state): State<AppState>,
    Path(id): Path<LeaveId>,
) -> Result<impl IntoResponse, AppError> {
    state.store.remove_leave(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_resource(
    State(state): State<AppState>,
    Json(payload): Json<NewResource>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.store.add_resource(Resource {
        id: Uuid::new_v4(),
        user: payload.user,
        project: payload.project,
        date: payload.date,
        duration: payload.duration,
        comment: payload.comment,
    })?;
    Ok((StatusCode::CREATED, Json(resource)))
}

async fn list_resources(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .user(scope.user)
        .ok_or(StoreError::UnknownUser(scope.user))?;
    Ok(Json(state.store.resources_for(scope.user)))
}

async fn delete_resource(
    State(state): State<AppState>,
    Path(id): Path<ResourceId>,
) -> Result<impl IntoResponse, AppError> {
    state.store.remove_resource(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_capacity(
    State(state): State<AppState>,
    Json(payload): Json<NewCapacity>,
) -> Result<impl IntoResponse, AppError> {
    let capacity = state.store.add_capacity(Capacity {
        id: Uuid::new_v4(),
        user: payload.user,
        date: payload.date,
        duration: payload.duration,
    })?;
    Ok((StatusCode::CREATED, Json(capacity)))
}

async fn list_capacities(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .user(scope.user)
        .ok_or(StoreError::UnknownUser(scope.user))?;
    Ok(Json(state.store.capacities_for(scope.user)))
}

async fn delete_capacity(
    State(state): State<AppState>,
    Path(id): Path<CapacityId>,
) -> Result<impl IntoResponse, AppError> {
    state.store.remove_capacity(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .user(query.user)
        .ok_or(StoreError::UnknownUser(query.user))?;
    let start = query.date.unwrap_or_else(|| Local::now().date_naive());
    Ok(Json(availability_report(&state.store, &user, start)))
}

async fn export_activities(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .user(scope.user)
        .ok_or(StoreError::UnknownUser(scope.user))?;
    let bytes = export::activities_csv(&state.store, scope.user)?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], bytes))
}

async fn export_leaves(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .user(scope.user)
        .ok_or(StoreError::UnknownUser(scope.user))?;
    let bytes = export::leaves_csv(&state.store, scope.user)?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], bytes))
}

async fn export_schedule(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .user(query.user)
        .ok_or(StoreError::UnknownUser(query.user))?;
    let start = query.date.unwrap_or_else(|| Local::now().date_naive());
    let report = availability_report(&state.store, &user, start);
    let bytes = export::schedule_csv(&report)?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], bytes))
}

// --- Demo Data ---

/// Seeds a small planning scenario so the API has something to show
/// right after startup.
pub fn seed_demo(store: &TrackerStore) -> Result<()> {
    let today = Local::now().date_naive();

    let ada = store.add_user(User {
        id: Uuid::new_v4(),
        username: "ada".to_string(),
        email: "ada@example.com".to_string(),
        start_balance: TimeDelta::zero(),
    });
    let bob = store.add_user(User {
        id: Uuid::new_v4(),
        username: "bob".to_string(),
        email: "bob@example.com".to_string(),
        start_balance: TimeDelta::minutes(90),
    });

    let office = store.add_location(Location {
        id: Uuid::new_v4(),
        title: "Office".to_string(),
        comment: None,
    });
    store.add_location(Location {
        id: Uuid::new_v4(),
        title: "Home".to_string(),
        comment: Some("Remote days".to_string()),
    });

    let platform = store.add_project(Project {
        id: Uuid::new_v4(),
        parent: None,
        title: "Platform".to_string(),
        comment: None,
    })?;
    let engine = store.add_project(Project {
        id: Uuid::new_v4(),
        parent: Some(platform.id),
        title: "Engine".to_string(),
        comment: Some("Core rework".to_string()),
    })?;
    let tools = store.add_project(Project {
        id: Uuid::new_v4(),
        parent: Some(platform.id),
        title: "Tools".to_string(),
        comment: None,
    })?;

    // A whole working week of capacity for both users.
    for offset in 0..5 {
        let date = today + TimeDelta::days(offset);
        for user in [&ada, &bob] {
            store.add_capacity(Capacity {
                id: Uuid::new_v4(),
                user: user.id,
                date,
                duration: *model::DAILY_WORKING_TIME,
            })?;
        }
    }

    // Ada carries the Engine backlog plus one pinned afternoon.
    store.add_resource(Resource {
        id: Uuid::new_v4(),
        user: ada.id,
        project: engine.id,
        date: None,
        duration: TimeDelta::hours(10),
        comment: None,
    })?;
    store.add_resource(Resource {
        id: Uuid::new_v4(),
        user: ada.id,
        project: engine.id,
        date: Some(today + TimeDelta::days(1)),
        duration: TimeDelta::hours(2),
        comment: Some("Planning review".to_string()),
    })?;
    store.add_resource(Resource {
        id: Uuid::new_v4(),
        user: bob.id,
        project: tools.id,
        date: None,
        duration: TimeDelta::hours(6),
        comment: None,
    })?;

    store.add_activity(Activity {
        id: Uuid::new_v4(),
        user: ada.id,
        project: engine.id,
        date: today - TimeDelta::days(1),
        duration: TimeDelta::hours(7),
        progression: Some(30),
        location: office.id,
        is_teleworking: false,
        is_business_trip: false,
        comment: Some("Initial pass".to_string()),
    })?;

    store.add_leave(Leave {
        id: Uuid::new_v4(),
        user: bob.id,
        kind: LeaveKind::PaidLeave,
        date: today + TimeDelta::days(2),
        duration: *model::DAILY_WORKING_TIME,
    })?;

    let counts = store.counts();
    info!(
        "Seeded demo data: {} users, {} projects, {} capacity rows",
        counts.users, counts.projects, counts.capacities
    );
    Ok(())
}
