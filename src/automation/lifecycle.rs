//! Lead lifecycle hooks. Creation and completion events schedule the
//! delayed communications and may fire one immediate send. Every insert
//! is conditional on the (lead_id, automation_type) uniqueness, so
//! re-firing an event never duplicates a communication.

use chrono::{Duration, Utc};
use log::{error, info};

use crate::channels::{send_logged, OutboundEmail};
use crate::notify::templates;
use crate::shared::models::{AutomationType, Lead, NewAutomationRun, RunStatus};
use crate::shared::state::AppState;
use crate::store::Store;

/// New lead arrived through the intake form: thank them right away and
/// queue the one-hour follow-up.
pub async fn on_lead_created(state: &AppState, lead: &Lead) {
    let toggles = state.settings.automations();

    if toggles.auto_thank_you_email && !lead.email.is_empty() {
        send_thank_you(state, lead).await;
    }

    if toggles.auto_follow_up_1h {
        let run = NewAutomationRun::pending(
            lead.id,
            AutomationType::FollowUp1h,
            Utc::now() + Duration::hours(1),
        );
        match state.store.create_automation_run(run) {
            Ok(true) => info!("Scheduled 1h follow-up for lead {}", lead.id),
            Ok(false) => {}
            Err(e) => error!("Failed to schedule follow-up for lead {}: {}", lead.id, e),
        }
    }
}

/// Lead converted and the job is done: queue the review request and the
/// referral invite.
pub async fn on_lead_completed(state: &AppState, lead: &Lead) {
    let toggles = state.settings.automations();

    if toggles.auto_review_request {
        let run = NewAutomationRun::pending(
            lead.id,
            AutomationType::ReviewRequest,
            Utc::now() + Duration::hours(2),
        );
        if let Err(e) = state.store.create_automation_run(run) {
            error!("Failed to schedule review request for lead {}: {}", lead.id, e);
        }
    }

    if state.settings.referral_program().enabled {
        let run = NewAutomationRun::pending(
            lead.id,
            AutomationType::ReferralInvite,
            Utc::now() + Duration::hours(24),
        );
        if let Err(e) = state.store.create_automation_run(run) {
            error!("Failed to schedule referral invite for lead {}: {}", lead.id, e);
        }
    }
}

/// The immediate send still flows through the audit table: claim the
/// thank_you row first, and only the claimant sends.
async fn send_thank_you(state: &AppState, lead: &Lead) {
    let run = NewAutomationRun::pending(lead.id, AutomationType::ThankYou, Utc::now());
    let run_id = run.id;
    match state.store.create_automation_run(run) {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            error!("Failed to record thank-you run for lead {}: {}", lead.id, e);
            return;
        }
    }

    let template = templates::thank_you(&state.config, lead);
    let identity = state.settings.email_identity();
    let result = send_logged(
        state.store.as_ref(),
        &identity,
        state.email.as_ref(),
        OutboundEmail {
            to: lead.email.clone(),
            to_name: Some(lead.name.clone()),
            subject: template.subject,
            html: template.html,
            template: AutomationType::ThankYou.as_str().to_string(),
            lead_id: Some(lead.id),
        },
    )
    .await;

    let status = if result.success {
        RunStatus::Completed
    } else {
        RunStatus::Failed
    };
    if let Err(e) = state.store.finish_automation_run(run_id, status, Utc::now()) {
        error!("Failed to finish thank-you run for lead {}: {}", lead.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_util::harness;
    use serde_json::json;

    #[tokio::test]
    async fn creation_sends_thank_you_and_schedules_follow_up() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());

        on_lead_created(&h.state, &lead).await;

        assert_eq!(h.email.sent_count(), 1);
        let runs = h.store.automation_runs();
        assert_eq!(runs.len(), 2);

        let thank_you = runs
            .iter()
            .find(|r| r.automation_type == "thank_you")
            .unwrap();
        assert_eq!(thank_you.status, "completed");
        assert!(thank_you.executed_at.is_some());

        let follow_up = runs
            .iter()
            .find(|r| r.automation_type == "follow_up_1h")
            .unwrap();
        assert_eq!(follow_up.status, "pending");
        assert!(follow_up.scheduled_for.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn creation_hooks_are_idempotent() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());

        on_lead_created(&h.state, &lead).await;
        on_lead_created(&h.state, &lead).await;

        // Second invocation claims nothing, sends nothing.
        assert_eq!(h.email.sent_count(), 1);
        assert_eq!(h.store.automation_runs().len(), 2);
    }

    #[tokio::test]
    async fn disabled_toggles_schedule_nothing() {
        let h = harness();
        h.store
            .put_setting(
                "automations",
                json!({"auto_thank_you_email": false, "auto_follow_up_1h": false}),
            )
            .unwrap();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());

        on_lead_created(&h.state, &lead).await;

        assert_eq!(h.email.sent_count(), 0);
        assert!(h.store.automation_runs().is_empty());
    }

    #[tokio::test]
    async fn completion_schedules_review_and_referral() {
        let h = harness();
        h.store
            .put_setting("referral_program", json!({"enabled": true}))
            .unwrap();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());

        on_lead_completed(&h.state, &lead).await;

        let runs = h.store.automation_runs();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().any(|r| r.automation_type == "review_request"));
        assert!(runs.iter().any(|r| r.automation_type == "referral_invite"));
        assert!(runs.iter().all(|r| r.status == "pending"));
    }

    #[tokio::test]
    async fn completion_without_referral_program_schedules_review_only() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());

        on_lead_completed(&h.state, &lead).await;

        let runs = h.store.automation_runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].automation_type, "review_request");
    }

    #[tokio::test]
    async fn failed_thank_you_send_records_failed_run() {
        use crate::tests::test_util::{harness_with, FakeEmail, FakeSms, FakeVoice};

        let h = harness_with(
            FakeEmail::failing("smtp down"),
            FakeSms::succeeding(),
            FakeVoice::succeeding(),
        );
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());

        on_lead_created(&h.state, &lead).await;

        let runs = h.store.automation_runs();
        let thank_you = runs
            .iter()
            .find(|r| r.automation_type == "thank_you")
            .unwrap();
        assert_eq!(thank_you.status, "failed");
    }
}
