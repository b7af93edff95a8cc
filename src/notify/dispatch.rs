//! Multi-channel job-assignment dispatch.
//!
//! A single assignment fans out across the technician's preferred
//! channels. Every attempt settles independently and is logged as its own
//! audit row; the aggregate decides the job's notification state.

use chrono::Utc;
use futures::future::join_all;
use log::{error, info, warn};
use uuid::Uuid;

use crate::channels::{Channel, OutboundCall, OutboundEmail, SendResult};
use crate::notify::templates;
use crate::shared::models::{
    JobSchedule, JobStatus, Lead, NewTechNotification, NotificationPreference, NotificationStatus,
    Technician,
};
use crate::shared::state::AppState;
use crate::store::Store;

/// Provider-side cap on the assignment call, in line with the dialing
/// API's duration parameter.
const MAX_CALL_DURATION: u32 = 120;

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub channel: Channel,
    pub result: SendResult,
}

/// Channel fan-out order. The order doubles as the precedence used to
/// pick the notification status when several channels succeed: voice
/// ahead of sms ahead of email.
pub fn channels_for(preference: NotificationPreference) -> Vec<Channel> {
    match preference {
        NotificationPreference::All => vec![Channel::Voice, Channel::Sms, Channel::Email],
        NotificationPreference::Phone => vec![Channel::Voice],
        NotificationPreference::Sms => vec![Channel::Sms],
        NotificationPreference::Email => vec![Channel::Email],
    }
}

pub async fn notify_technician(
    state: &AppState,
    job: &JobSchedule,
    tech: &Technician,
    lead: &Lead,
) -> Vec<DispatchOutcome> {
    let channels = channels_for(tech.preference());

    let attempts = channels.iter().map(|&channel| {
        let state = state.clone();
        let job = job.clone();
        let tech = tech.clone();
        let lead = lead.clone();
        async move {
            let result = send_on_channel(&state, channel, &job, &tech, &lead).await;

            let row = NewTechNotification {
                id: Uuid::new_v4(),
                job_schedule_id: job.id,
                technician_id: tech.id,
                channel: channel.as_str().to_string(),
                status: if result.success { "sent" } else { "failed" }.to_string(),
                external_id: result.external_id.clone(),
                response: result.error.clone(),
                created_at: Utc::now(),
            };
            if let Err(e) = state.store.log_tech_notification(row) {
                warn!("Failed to log {} attempt for job {}: {}", channel, job.id, e);
            }

            DispatchOutcome { channel, result }
        }
    });

    // Wait for every channel to settle; one failure never short-circuits
    // the others.
    let outcomes = join_all(attempts).await;

    let primary = outcomes
        .iter()
        .find(|o| o.result.success)
        .map(|o| o.channel);

    let update = match primary {
        Some(channel) => {
            let notification_status = match channel {
                Channel::Voice => NotificationStatus::Calling,
                Channel::Sms => NotificationStatus::SmsSent,
                Channel::Email => NotificationStatus::Emailed,
            };
            state.store.set_job_notification_state(
                job.id,
                Some(JobStatus::Notified),
                notification_status,
            )
        }
        None => {
            state
                .store
                .set_job_notification_state(job.id, None, NotificationStatus::Failed)
        }
    };
    if let Err(e) = update {
        error!("Failed to update notification state for job {}: {}", job.id, e);
    }

    outcomes
}

async fn send_on_channel(
    state: &AppState,
    channel: Channel,
    job: &JobSchedule,
    tech: &Technician,
    lead: &Lead,
) -> SendResult {
    match channel {
        Channel::Voice => {
            let call = OutboundCall {
                to: tech.phone.clone(),
                script: templates::job_call_script(&state.config, tech, lead, job),
                first_sentence: templates::job_call_greeting(&state.config, tech),
                max_duration: MAX_CALL_DURATION,
            };
            state.voice.call(&call).await
        }
        Channel::Sms => {
            let body = templates::job_assignment_sms(&state.config, lead, job);
            state.sms.send(&tech.phone, &body).await
        }
        Channel::Email => match tech.email.as_deref() {
            Some(to) => {
                let template = templates::tech_job_notification(&state.config, tech, lead, job);
                let email = OutboundEmail {
                    to: to.to_string(),
                    to_name: Some(tech.name.clone()),
                    subject: template.subject,
                    html: template.html,
                    template: "tech_job_notification".to_string(),
                    lead_id: None,
                };
                let identity = state.settings.email_identity();
                crate::channels::send_logged(
                    state.store.as_ref(),
                    &identity,
                    state.email.as_ref(),
                    email,
                )
                .await
            }
            None => SendResult::failed("No email on file"),
        },
    }
}

/// Fire-and-forget dispatch from a synchronous admin action. The caller's
/// request completes immediately; the outcome is observable only through
/// the job row and the notification log.
pub fn spawn_dispatch(state: AppState, job: JobSchedule, tech: Technician, lead: Lead) {
    tokio::spawn(async move {
        let outcomes = notify_technician(&state, &job, &tech, &lead).await;
        let sent = outcomes.iter().filter(|o| o.result.success).count();
        info!(
            "Detached dispatch for job {} settled: {}/{} channels succeeded",
            job.id,
            sent,
            outcomes.len()
        );
    });
}
