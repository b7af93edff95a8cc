//! Technician confirmation entrypoints.
//!
//! Two trigger shapes converge on one transition: the email link and the
//! inbound SMS reply. Malformed, unmatched, or replayed requests get a
//! generic response and mutate nothing.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::channels::twilio_sms::{parse_inbound_webhook, twiml_response, validate_webhook_signature};
use crate::channels::Channel;
use crate::shared::models::{NewTechNotification, NotificationStatus};
use crate::shared::state::AppState;
use crate::store::{Store, StoreError};

const LINK_CONFIRM_TAG: &str = "email_click_confirm";

pub fn configure() -> Router<AppState> {
    Router::new().route(
        "/webhook/job-confirm",
        get(confirm_by_link).post(confirm_by_sms),
    )
}

#[derive(Debug, Deserialize)]
pub struct ConfirmLinkParams {
    pub schedule: Option<String>,
    pub tech: Option<String>,
    pub action: Option<String>,
}

/// GET /webhook/job-confirm?schedule=...&tech=...&action=confirm
pub async fn confirm_by_link(
    State(state): State<AppState>,
    Query(params): Query<ConfirmLinkParams>,
) -> Html<String> {
    let config = &state.config;

    let (Some(schedule), Some(tech), Some(action)) =
        (params.schedule, params.tech, params.action)
    else {
        return Html(confirm_page(
            config,
            "Invalid Link",
            "This confirmation link is invalid or expired.",
            false,
        ));
    };
    let (Ok(schedule_id), Ok(tech_id)) = (Uuid::parse_str(&schedule), Uuid::parse_str(&tech))
    else {
        return Html(confirm_page(
            config,
            "Invalid Link",
            "This confirmation link is invalid or expired.",
            false,
        ));
    };
    if action != "confirm" {
        return Html(confirm_page(
            config,
            "Invalid Link",
            "This confirmation link is invalid or expired.",
            false,
        ));
    }

    // Verify the job exists and is actually assigned to this technician
    // before any mutation. A mismatch reveals nothing.
    let job = match state.store.job_for_technician(schedule_id, tech_id) {
        Ok(Some(job)) => job,
        Ok(None) => {
            return Html(confirm_page(
                config,
                "Not Found",
                "This job schedule was not found.",
                false,
            ));
        }
        Err(e) => {
            warn!("Link confirmation lookup failed: {}", e);
            return Html(confirm_page(
                config,
                "Not Found",
                "This job schedule was not found.",
                false,
            ));
        }
    };

    if job.notification_status == NotificationStatus::Confirmed.as_str() {
        // Idempotent replay: no further mutation, no duplicate audit row.
        return Html(confirm_page(
            config,
            "Already Confirmed",
            &format!(
                "This job is already confirmed. See you on {}!",
                job.scheduled_date
            ),
            true,
        ));
    }

    if let Err(e) = apply_confirmation(
        state.store.as_ref(),
        job.id,
        tech_id,
        Channel::Email,
        LINK_CONFIRM_TAG.to_string(),
    ) {
        warn!("Link confirmation for job {} failed: {}", job.id, e);
        return Html(confirm_page(
            config,
            "Something Went Wrong",
            "We couldn't record your confirmation. Please call dispatch.",
            false,
        ));
    }
    info!("Job {} confirmed by technician {} via link", job.id, tech_id);

    let tech_first = state
        .store
        .technician(tech_id)
        .ok()
        .flatten()
        .map(|t| t.first_name().to_string())
        .unwrap_or_else(|| "Tech".to_string());

    Html(confirm_page(
        config,
        "Job Confirmed!",
        &format!(
            "Thanks {}! You've confirmed your job on {} at {}. We'll send you a reminder before the job.",
            tech_first, job.scheduled_date, job.scheduled_time
        ),
        true,
    ))
}

/// POST /webhook/job-confirm, the inbound-SMS provider callback. Only
/// affirmative replies confirm; everything else gets the help message.
pub async fn confirm_by_sms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let auth_token = &state.config.sms.auth_token;
    if !auth_token.is_empty() {
        let signature = headers
            .get("X-Twilio-Signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let url = format!("{}/webhook/job-confirm", state.config.site_url);
        if !validate_webhook_signature(auth_token, signature, &url, &params) {
            warn!("Rejected inbound SMS webhook with bad signature");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let inbound = match parse_inbound_webhook(&params) {
        Ok(inbound) => inbound,
        Err(_) => return twiml(twiml_response(None)),
    };
    let from = inbound.from.trim();
    if from.is_empty() {
        return twiml(twiml_response(None));
    }

    let body = inbound.body.trim().to_uppercase();
    if body == "YES" || body == "Y" || body == "CONFIRM" {
        if let Some(reply) = try_confirm_by_phone(&state, from, &body) {
            return twiml(reply);
        }
    }

    twiml(twiml_response(Some(&format!(
        "{} Dispatch: Reply YES to confirm your next job, or call {} for help.",
        state.config.company_name, state.config.dispatch_phone
    ))))
}

/// Resolve the sender to a technician and confirm their newest open job.
/// Returns the auto-reply on success, None for the generic fallback.
fn try_confirm_by_phone(state: &AppState, from: &str, body: &str) -> Option<String> {
    let tech = match state.store.technician_by_phone(from) {
        Ok(Some(tech)) => tech,
        Ok(None) => return None,
        Err(e) => {
            warn!("Technician lookup for inbound SMS failed: {}", e);
            return None;
        }
    };

    let job = match state.store.latest_open_job(tech.id) {
        Ok(Some(job)) => job,
        Ok(None) => return None,
        Err(e) => {
            warn!("Open-job lookup for technician {} failed: {}", tech.id, e);
            return None;
        }
    };

    if let Err(e) = apply_confirmation(
        state.store.as_ref(),
        job.id,
        tech.id,
        Channel::Sms,
        format!("sms_reply: {}", body),
    ) {
        warn!("SMS confirmation for job {} failed: {}", job.id, e);
        return None;
    }
    info!("Job {} confirmed by technician {} via SMS", job.id, tech.id);

    Some(twiml_response(Some(
        "Confirmed! You're all set for the job. We'll send a reminder before your appointment.",
    )))
}

/// The one confirm transition both trigger paths share: job and
/// notification state move to confirmed and one audit row is appended,
/// tagged with the confirmation source.
fn apply_confirmation(
    store: &dyn Store,
    job_id: Uuid,
    technician_id: Uuid,
    channel: Channel,
    source: String,
) -> Result<(), StoreError> {
    store.confirm_job(job_id)?;
    store.log_tech_notification(NewTechNotification {
        id: Uuid::new_v4(),
        job_schedule_id: job_id,
        technician_id,
        channel: channel.as_str().to_string(),
        status: "confirmed".to_string(),
        external_id: None,
        response: Some(source),
        created_at: Utc::now(),
    })
}

fn twiml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn confirm_page(
    config: &crate::config::AppConfig,
    title: &str,
    message: &str,
    success: bool,
) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title} - {company}</title>
  <style>
    body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 40px 20px; background: #f3f4f6; display: flex; justify-content: center; align-items: center; min-height: 100vh; }}
    .card {{ background: white; border-radius: 16px; padding: 40px; max-width: 420px; text-align: center; box-shadow: 0 4px 6px rgba(0,0,0,0.07); }}
    .icon {{ font-size: 48px; margin-bottom: 16px; }}
    h1 {{ font-size: 22px; color: #111827; margin: 0 0 12px; }}
    p {{ font-size: 15px; color: #6b7280; line-height: 1.6; margin: 0; }}
    .brand {{ margin-top: 24px; padding-top: 24px; border-top: 1px solid #e5e7eb; font-size: 13px; color: #9ca3af; }}
  </style>
</head>
<body>
  <div class="card">
    <div class="icon">{icon}</div>
    <h1>{title}</h1>
    <p>{message}</p>
    <div class="brand">{company} Dispatch</div>
  </div>
</body>
</html>"#,
        title = title,
        company = config.company_name,
        icon = if success { "&#9989;" } else { "&#10060;" },
        message = message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_util::harness;
    use chrono::Duration;

    fn link_params(schedule: &str, tech: &str, action: &str) -> ConfirmLinkParams {
        ConfirmLinkParams {
            schedule: Some(schedule.to_string()),
            tech: Some(tech.to_string()),
            action: Some(action.to_string()),
        }
    }

    fn sms_form(from: &str, body: &str) -> Form<HashMap<String, String>> {
        let mut params = HashMap::new();
        params.insert("From".to_string(), from.to_string());
        params.insert("Body".to_string(), body.to_string());
        params.insert("MessageSid".to_string(), "SM1".to_string());
        Form(params)
    }

    #[tokio::test]
    async fn link_confirmation_transitions_job() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        let tech = crate::tests::test_util::test_technician("all");
        let mut job = crate::tests::test_util::test_job(lead.id, tech.id);
        job.status = "notified".to_string();
        job.notification_status = "emailed".to_string();
        h.store.seed_technician(tech.clone());
        h.store.seed_job(job.clone());

        let page = confirm_by_link(
            State(h.state.clone()),
            Query(link_params(
                &job.id.to_string(),
                &tech.id.to_string(),
                "confirm",
            )),
        )
        .await;

        assert!(page.0.contains("Job Confirmed!"));
        assert!(page.0.contains("Rex"));

        let updated = h.store.job(job.id).unwrap().unwrap();
        assert_eq!(updated.status, "confirmed");
        assert_eq!(updated.notification_status, "confirmed");

        let rows = h.store.tech_notifications();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel, "email");
        assert_eq!(rows[0].status, "confirmed");
        assert_eq!(rows[0].response.as_deref(), Some("email_click_confirm"));
    }

    #[tokio::test]
    async fn mismatched_technician_mutates_nothing() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        let tech = crate::tests::test_util::test_technician("all");
        let other_tech = crate::tests::test_util::test_technician("all");
        let job = crate::tests::test_util::test_job(lead.id, tech.id);
        h.store.seed_technician(tech);
        h.store.seed_job(job.clone());

        let page = confirm_by_link(
            State(h.state.clone()),
            Query(link_params(
                &job.id.to_string(),
                &other_tech.id.to_string(),
                "confirm",
            )),
        )
        .await;

        assert!(page.0.contains("Not Found"));
        let unchanged = h.store.job(job.id).unwrap().unwrap();
        assert_eq!(unchanged.status, "scheduled");
        assert!(h.store.tech_notifications().is_empty());
    }

    #[tokio::test]
    async fn replayed_confirmation_adds_no_audit_row() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        let tech = crate::tests::test_util::test_technician("all");
        let mut job = crate::tests::test_util::test_job(lead.id, tech.id);
        job.status = "confirmed".to_string();
        job.notification_status = "confirmed".to_string();
        h.store.seed_technician(tech.clone());
        h.store.seed_job(job.clone());

        let page = confirm_by_link(
            State(h.state.clone()),
            Query(link_params(
                &job.id.to_string(),
                &tech.id.to_string(),
                "confirm",
            )),
        )
        .await;

        assert!(page.0.contains("Already Confirmed"));
        assert!(h.store.tech_notifications().is_empty());
    }

    #[tokio::test]
    async fn bad_action_is_rejected_generically() {
        let h = harness();
        let page = confirm_by_link(
            State(h.state.clone()),
            Query(link_params(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                "decline",
            )),
        )
        .await;
        assert!(page.0.contains("Invalid Link"));
    }

    #[tokio::test]
    async fn sms_yes_confirms_newest_open_job() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        let tech = crate::tests::test_util::test_technician("sms");
        let mut older = crate::tests::test_util::test_job(lead.id, tech.id);
        older.created_at = Utc::now() - Duration::hours(3);
        older.status = "notified".to_string();
        let mut newer = crate::tests::test_util::test_job(lead.id, tech.id);
        newer.status = "notified".to_string();
        h.store.seed_technician(tech.clone());
        h.store.seed_job(older.clone());
        h.store.seed_job(newer.clone());

        let response = confirm_by_sms(
            State(h.state.clone()),
            HeaderMap::new(),
            sms_form(&tech.phone, "yes"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // Exactly one job confirmed: the newest.
        let newer_row = h.store.job(newer.id).unwrap().unwrap();
        assert_eq!(newer_row.status, "confirmed");
        let older_row = h.store.job(older.id).unwrap().unwrap();
        assert_eq!(older_row.status, "notified");

        let rows = h.store.tech_notifications();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel, "sms");
        assert_eq!(rows[0].response.as_deref(), Some("sms_reply: YES"));
    }

    #[tokio::test]
    async fn non_affirmative_reply_gets_help_and_no_mutation() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        let tech = crate::tests::test_util::test_technician("sms");
        let mut job = crate::tests::test_util::test_job(lead.id, tech.id);
        job.status = "notified".to_string();
        h.store.seed_technician(tech.clone());
        h.store.seed_job(job.clone());

        confirm_by_sms(
            State(h.state.clone()),
            HeaderMap::new(),
            sms_form(&tech.phone, "what job?"),
        )
        .await;

        let unchanged = h.store.job(job.id).unwrap().unwrap();
        assert_eq!(unchanged.status, "notified");
        assert!(h.store.tech_notifications().is_empty());
    }

    #[tokio::test]
    async fn unknown_sender_gets_generic_fallback() {
        let h = harness();
        confirm_by_sms(
            State(h.state.clone()),
            HeaderMap::new(),
            sms_form("+12089990000", "YES"),
        )
        .await;
        assert!(h.store.tech_notifications().is_empty());
    }
}
