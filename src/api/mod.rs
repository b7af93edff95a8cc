//! HTTP surface for the engine's trigger paths: the externally-scheduled
//! cron entrypoints and the admin/public actions that schedule work and
//! fire detached dispatch.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveTime, Utc};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::automation::{on_lead_completed, on_lead_created, run_due_automations, run_milestone_scan};
use crate::notify::dispatch::spawn_dispatch;
use crate::notify::reminder::run_notification_cycle;
use crate::shared::models::{JobStatus, LeadStatus, NewJobSchedule, NewLead, NotificationStatus};
use crate::shared::state::AppState;
use crate::store::Store;

pub fn configure() -> Router<AppState> {
    Router::new()
        .route("/cron/automations", get(cron_automations))
        .route("/cron/notifications", get(cron_notifications))
        .route("/api/leads", post(create_lead))
        .route("/api/admin/leads/{id}", patch(update_lead))
        .route("/api/admin/schedules", post(create_schedule))
}

// ===== Cron entrypoints =====

fn cron_authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let secret = &state.config.cron_secret;
    if secret.is_empty() {
        return false;
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", secret))
        .unwrap_or(false)
}

/// GET /cron/automations: due-run processor plus the milestone scanner.
/// Safe to re-invoke; the uniqueness and existence checks make reruns
/// no-ops.
async fn cron_automations(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !cron_authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"})))
            .into_response();
    }

    let now = Utc::now();
    let mut report = run_due_automations(&state, now).await;
    report.reengagement += run_milestone_scan(&state, now).await;

    info!(
        "Automation cycle: {} follow-ups, {} reviews, {} referrals, {} re-engagement, {} skipped, {} errors",
        report.follow_ups,
        report.review_requests,
        report.referrals,
        report.reengagement,
        report.skipped,
        report.errors
    );
    Json(json!({"success": true, "results": report})).into_response()
}

/// GET /cron/notifications: pending dispatch sweep plus the 24h
/// reminder task.
async fn cron_notifications(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !cron_authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"})))
            .into_response();
    }

    let now = Utc::now();
    let report = run_notification_cycle(&state, now).await;

    Json(json!({
        "success": true,
        "processed": report.processed,
        "reminders": report.reminders,
        "timestamp": now,
    }))
    .into_response()
}

// ===== Lead intake and admin triggers =====

fn admin_authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let token = &state.config.admin_token;
    if token.is_empty() {
        return false;
    }
    headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == token)
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
pub struct LeadIntake {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub service_type: String,
    pub message: Option<String>,
}

/// POST /api/leads, the public contact intake. The response never waits on
/// downstream automation; creation hooks run detached.
async fn create_lead(State(state): State<AppState>, Json(body): Json<LeadIntake>) -> Response {
    if body.name.trim().is_empty()
        || body.phone.trim().is_empty()
        || body.address.trim().is_empty()
        || body.service_type.trim().is_empty()
        || !body.email.contains('@')
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Validation failed"})),
        )
            .into_response();
    }

    let now = Utc::now();
    let new_lead = NewLead {
        id: Uuid::new_v4(),
        name: body.name.trim().to_string(),
        email: body.email.trim().to_string(),
        phone: body.phone.trim().to_string(),
        address: body.address.trim().to_string(),
        service_type: body.service_type.trim().to_string(),
        message: body.message,
        status: LeadStatus::New.as_str().to_string(),
        source: "website".to_string(),
        created_at: now,
        updated_at: now,
    };

    let lead = match state.store.insert_lead(new_lead) {
        Ok(lead) => lead,
        Err(e) => {
            error!("Lead insert failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to submit. Please try again."})),
            )
                .into_response();
        }
    };

    let hook_state = state.clone();
    let hook_lead = lead.clone();
    tokio::spawn(async move {
        on_lead_created(&hook_state, &hook_lead).await;
    });

    (StatusCode::CREATED, Json(json!({"success": true, "id": lead.id}))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct LeadUpdate {
    pub status: String,
}

/// PATCH /api/admin/leads/{id}, the admin status change. The transition to
/// converted stamps completed_at (first time only) and fires the
/// completion hooks detached.
async fn update_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<LeadUpdate>,
) -> Response {
    if !admin_authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"})))
            .into_response();
    }

    let Some(status) = LeadStatus::parse(&body.status) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid status"})))
            .into_response();
    };

    let existing = match state.store.lead(id) {
        Ok(Some(lead)) => lead,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, Json(json!({"error": "Lead not found"})))
                .into_response();
        }
        Err(e) => {
            error!("Lead lookup failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to update"})),
            )
                .into_response();
        }
    };

    let newly_completed =
        status == LeadStatus::Converted && existing.completed_at.is_none();
    let completed_at = newly_completed.then(Utc::now);

    let updated = match state.store.update_lead_status(id, status, completed_at) {
        Ok(Some(lead)) => lead,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, Json(json!({"error": "Lead not found"})))
                .into_response();
        }
        Err(e) => {
            error!("Lead update failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to update"})),
            )
                .into_response();
        }
    };

    if newly_completed {
        let hook_state = state.clone();
        let hook_lead = updated.clone();
        tokio::spawn(async move {
            on_lead_completed(&hook_state, &hook_lead).await;
        });
    }

    Json(json!({"success": true, "data": updated})).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub lead_id: Uuid,
    pub technician_id: Uuid,
    pub scheduled_date: String,
    pub scheduled_time: String,
    pub estimated_duration: Option<i32>,
    pub notes: Option<String>,
    #[serde(default)]
    pub notify_now: bool,
}

/// POST /api/admin/schedules creates a job assignment. With notify_now
/// the dispatcher fires inline but detached: the response returns before
/// any channel settles.
async fn create_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ScheduleRequest>,
) -> Response {
    if !admin_authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"})))
            .into_response();
    }

    let Ok(scheduled_date) = NaiveDate::parse_from_str(&body.scheduled_date, "%Y-%m-%d") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "scheduled_date must be YYYY-MM-DD"})),
        )
            .into_response();
    };
    let scheduled_time = NaiveTime::parse_from_str(&body.scheduled_time, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&body.scheduled_time, "%H:%M:%S"));
    let Ok(scheduled_time) = scheduled_time else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "scheduled_time must be HH:MM"})),
        )
            .into_response();
    };

    let tech = match state.store.technician(body.technician_id) {
        Ok(Some(tech)) => tech,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Technician not found"})),
            )
                .into_response();
        }
        Err(e) => {
            error!("Technician lookup failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to create schedule"})),
            )
                .into_response();
        }
    };

    // Capacity check: cancelled jobs do not count against the day.
    match state.store.job_count_for_day(tech.id, scheduled_date) {
        Ok(count) if count >= tech.max_jobs_per_day as i64 => {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": format!(
                        "{} already has {} jobs on {} (max: {})",
                        tech.name, count, scheduled_date, tech.max_jobs_per_day
                    )
                })),
            )
                .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            error!("Capacity check failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to create schedule"})),
            )
                .into_response();
        }
    }

    let now = Utc::now();
    let new_job = NewJobSchedule {
        id: Uuid::new_v4(),
        lead_id: body.lead_id,
        technician_id: tech.id,
        scheduled_date,
        scheduled_time,
        estimated_duration: body.estimated_duration.unwrap_or(120),
        notes: body.notes,
        status: JobStatus::Scheduled.as_str().to_string(),
        notification_status: NotificationStatus::Pending.as_str().to_string(),
        notify_at: body.notify_now.then_some(now),
        created_at: now,
        updated_at: now,
    };

    let job = match state.store.insert_job(new_job) {
        Ok(job) => job,
        Err(e) => {
            error!("Job insert failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to create schedule"})),
            )
                .into_response();
        }
    };

    if body.notify_now {
        match state.store.lead(job.lead_id) {
            Ok(Some(lead)) => {
                spawn_dispatch(state.clone(), job.clone(), tech, lead);
            }
            Ok(None) => {
                error!("Job {} created for missing lead {}", job.id, job.lead_id);
            }
            Err(e) => {
                error!("Lead lookup for dispatch failed: {}", e);
            }
        }
    }

    (StatusCode::CREATED, Json(json!(job))).into_response()
}
