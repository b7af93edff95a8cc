//! Periodic notification work: the pending-dispatch sweep and the
//! 24-hour reminder task. Both run from the notifications cron
//! entrypoint and are safe to re-invoke.

use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::notify::dispatch::notify_technician;
use crate::notify::templates;
use crate::shared::models::NewTechNotification;
use crate::shared::state::AppState;
use crate::store::Store;

/// Distinct audit tag so reminder rows never mix with assignment
/// dispatch rows.
pub const REMINDER_TAG: &str = "reminder_24h";

const SWEEP_BATCH: i64 = 20;

#[derive(Debug, Default, Serialize)]
pub struct NotificationReport {
    pub processed: usize,
    pub reminders: usize,
}

/// Dispatch jobs whose notify_at has come due and send tomorrow's
/// reminders.
pub async fn run_notification_cycle(state: &AppState, now: DateTime<Utc>) -> NotificationReport {
    NotificationReport {
        processed: run_pending_sweep(state, now).await,
        reminders: run_reminders(state, now).await,
    }
}

async fn run_pending_sweep(state: &AppState, now: DateTime<Utc>) -> usize {
    let jobs = match state.store.jobs_pending_notification(now, SWEEP_BATCH) {
        Ok(jobs) => jobs,
        Err(e) => {
            error!("Failed to load pending notifications: {}", e);
            return 0;
        }
    };

    let mut processed = 0;
    for job in jobs {
        let tech = match state.store.technician(job.technician_id) {
            Ok(Some(tech)) => tech,
            Ok(None) => {
                warn!("Job {} references a missing technician, skipping", job.id);
                continue;
            }
            Err(e) => {
                error!("Failed to load technician for job {}: {}", job.id, e);
                continue;
            }
        };
        let lead = match state.store.lead(job.lead_id) {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                warn!("Job {} references a missing lead, skipping", job.id);
                continue;
            }
            Err(e) => {
                error!("Failed to load lead for job {}: {}", job.id, e);
                continue;
            }
        };

        notify_technician(state, &job, &tech, &lead).await;
        processed += 1;
    }
    processed
}

/// At most one reminder per job per calendar day (UTC). A reminder that
/// fails to send leaves no tagged row, so the next cycle retries it.
async fn run_reminders(state: &AppState, now: DateTime<Utc>) -> usize {
    let tomorrow = (now + Duration::hours(24)).date_naive();
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);

    let jobs = match state.store.jobs_on_date(tomorrow) {
        Ok(jobs) => jobs,
        Err(e) => {
            error!("Failed to load tomorrow's jobs: {}", e);
            return 0;
        }
    };

    let mut reminders = 0;
    for job in jobs {
        match state
            .store
            .has_notification_tagged_since(job.id, REMINDER_TAG, day_start)
        {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                error!("Reminder dedup check failed for job {}: {}", job.id, e);
                continue;
            }
        }

        let tech = match state.store.technician(job.technician_id) {
            Ok(Some(tech)) => tech,
            _ => continue,
        };
        let lead = match state.store.lead(job.lead_id) {
            Ok(Some(lead)) => lead,
            _ => continue,
        };

        let body = templates::reminder_sms(&state.config, &lead, &job);
        let result = state.sms.send(&tech.phone, &body).await;
        if !result.success {
            warn!(
                "Reminder SMS for job {} failed: {}",
                job.id,
                result.error.unwrap_or_default()
            );
            continue;
        }

        let row = NewTechNotification {
            id: Uuid::new_v4(),
            job_schedule_id: job.id,
            technician_id: tech.id,
            channel: "sms".to_string(),
            status: "sent".to_string(),
            external_id: result.external_id,
            response: Some(REMINDER_TAG.to_string()),
            created_at: Utc::now(),
        };
        if let Err(e) = state.store.log_tech_notification(row) {
            error!("Failed to log reminder for job {}: {}", job.id, e);
            continue;
        }
        reminders += 1;
    }

    if reminders > 0 {
        info!("Sent {} job reminder(s)", reminders);
    }
    reminders
}
