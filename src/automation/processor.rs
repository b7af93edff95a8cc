//! Automation run processor: executes due scheduled communications.
//!
//! Guard conditions are re-validated at execution time because the delay
//! window may have let the lead move on. A guard miss is `skipped`, a
//! provider miss is `failed`; both are terminal and re-sending requires a
//! new logical trigger.

use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::Serialize;

use crate::automation::referral::assign_referral_code;
use crate::channels::{send_logged, OutboundEmail, SendResult};
use crate::notify::templates;
use crate::shared::models::{AutomationRun, AutomationType, Lead, LeadStatus, RunStatus};
use crate::shared::state::AppState;
use crate::store::Store;

const RUN_BATCH: i64 = 50;

#[derive(Debug, Default, Serialize)]
pub struct AutomationReport {
    pub follow_ups: usize,
    pub review_requests: usize,
    pub referrals: usize,
    pub reengagement: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum RunOutcome {
    Sent(AutomationType),
    Skipped,
}

pub async fn run_due_automations(state: &AppState, now: DateTime<Utc>) -> AutomationReport {
    let mut report = AutomationReport::default();

    let due = match state.store.due_automation_runs(now, RUN_BATCH) {
        Ok(due) => due,
        Err(e) => {
            error!("Failed to load due automation runs: {}", e);
            report.errors += 1;
            return report;
        }
    };

    for (run, lead) in due {
        // The lead may have been removed out-of-band; the run is retired
        // rather than crashing the batch.
        let Some(lead) = lead else {
            finish(state, &run, RunStatus::Skipped);
            report.skipped += 1;
            continue;
        };

        let Some(kind) = AutomationType::parse(&run.automation_type) else {
            warn!(
                "Run {} has unknown automation type '{}', skipping",
                run.id, run.automation_type
            );
            finish(state, &run, RunStatus::Skipped);
            report.skipped += 1;
            continue;
        };

        match execute_run(state, &run, kind, &lead).await {
            Ok(RunOutcome::Sent(kind)) => match kind {
                AutomationType::FollowUp1h | AutomationType::ThankYou => report.follow_ups += 1,
                AutomationType::ReviewRequest => report.review_requests += 1,
                AutomationType::ReferralInvite => report.referrals += 1,
                AutomationType::Reengagement6m
                | AutomationType::Reengagement12m
                | AutomationType::Reengagement18m => report.reengagement += 1,
            },
            Ok(RunOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                // One row's failure never aborts the batch.
                error!("Automation error for run {}: {}", run.id, e);
                finish(state, &run, RunStatus::Failed);
                report.errors += 1;
            }
        }
    }

    report
}

async fn execute_run(
    state: &AppState,
    run: &AutomationRun,
    kind: AutomationType,
    lead: &Lead,
) -> Result<RunOutcome, anyhow::Error> {
    let email = match build_email(state, kind, lead).await? {
        Some(email) => email,
        None => {
            finish(state, run, RunStatus::Skipped);
            return Ok(RunOutcome::Skipped);
        }
    };

    let identity = state.settings.email_identity();
    let result: SendResult =
        send_logged(state.store.as_ref(), &identity, state.email.as_ref(), email).await;

    let status = if result.success {
        RunStatus::Completed
    } else {
        RunStatus::Failed
    };
    finish(state, run, status);
    Ok(RunOutcome::Sent(kind))
}

/// Re-validate the guard for this automation type and render its email.
/// `None` means the guard no longer holds and the run should be skipped.
async fn build_email(
    state: &AppState,
    kind: AutomationType,
    lead: &Lead,
) -> Result<Option<OutboundEmail>, anyhow::Error> {
    if lead.email.is_empty() {
        return Ok(None);
    }

    let template = match kind {
        AutomationType::FollowUp1h => {
            // The lead may have been contacted during the delay window.
            if lead.status != LeadStatus::New.as_str() {
                return Ok(None);
            }
            templates::follow_up_1h(&state.config, lead)
        }
        AutomationType::ThankYou => templates::thank_you(&state.config, lead),
        AutomationType::ReviewRequest => {
            let review = state.settings.google_review();
            if !review.enabled || review.url.is_empty() {
                return Ok(None);
            }
            templates::review_request(&state.config, lead, &review.url)
        }
        AutomationType::ReferralInvite => {
            let program = state.settings.referral_program();
            if !program.enabled {
                return Ok(None);
            }
            let code = match lead.referral_code.clone() {
                Some(code) => code,
                None => assign_referral_code(state.store.as_ref(), lead)?,
            };
            templates::referral_invite(&state.config, lead, &code, &program.reward_description)
        }
        AutomationType::Reengagement6m => templates::reengagement(&state.config, lead, 6),
        AutomationType::Reengagement12m => templates::reengagement(&state.config, lead, 12),
        AutomationType::Reengagement18m => templates::reengagement(&state.config, lead, 18),
    };

    Ok(Some(OutboundEmail {
        to: lead.email.clone(),
        to_name: Some(lead.name.clone()),
        subject: template.subject,
        html: template.html,
        template: kind.as_str().to_string(),
        lead_id: Some(lead.id),
    }))
}

fn finish(state: &AppState, run: &AutomationRun, status: RunStatus) {
    if let Err(e) = state
        .store
        .finish_automation_run(run.id, status, Utc::now())
    {
        error!("Failed to finish run {}: {}", run.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::NewAutomationRun;
    use crate::tests::test_util::{harness, harness_with, FakeEmail, FakeSms, FakeVoice};
    use chrono::Duration;
    use serde_json::json;
    use uuid::Uuid;

    fn due(kind: AutomationType, lead_id: Uuid) -> NewAutomationRun {
        NewAutomationRun::pending(lead_id, kind, Utc::now() - Duration::minutes(5))
    }

    #[tokio::test]
    async fn follow_up_sends_when_lead_still_new() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());
        h.store
            .create_automation_run(due(AutomationType::FollowUp1h, lead.id))
            .unwrap();

        let report = run_due_automations(&h.state, Utc::now()).await;

        assert_eq!(report.follow_ups, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(h.email.sent_count(), 1);
        let runs = h.store.automation_runs();
        assert_eq!(runs[0].status, "completed");
        assert!(runs[0].executed_at.is_some());
    }

    #[tokio::test]
    async fn follow_up_skips_contacted_lead() {
        let h = harness();
        let mut lead = crate::tests::test_util::test_lead();
        lead.status = "contacted".to_string();
        h.store.seed_lead(lead.clone());
        h.store
            .create_automation_run(due(AutomationType::FollowUp1h, lead.id))
            .unwrap();

        let report = run_due_automations(&h.state, Utc::now()).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(h.email.sent_count(), 0);
        assert_eq!(h.store.automation_runs()[0].status, "skipped");
    }

    #[tokio::test]
    async fn missing_lead_skips_run() {
        let h = harness();
        h.store
            .create_automation_run(due(AutomationType::FollowUp1h, Uuid::new_v4()))
            .unwrap();

        let report = run_due_automations(&h.state, Utc::now()).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(h.store.automation_runs()[0].status, "skipped");
    }

    #[tokio::test]
    async fn review_request_requires_flag_and_url() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());
        h.store
            .create_automation_run(due(AutomationType::ReviewRequest, lead.id))
            .unwrap();

        // Review settings default to disabled.
        let report = run_due_automations(&h.state, Utc::now()).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(h.email.sent_count(), 0);
    }

    #[tokio::test]
    async fn review_request_sends_when_configured() {
        let h = harness();
        h.store
            .put_setting(
                "google_review",
                json!({"enabled": true, "url": "https://g.page/r/review-us"}),
            )
            .unwrap();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());
        h.store
            .create_automation_run(due(AutomationType::ReviewRequest, lead.id))
            .unwrap();

        let report = run_due_automations(&h.state, Utc::now()).await;

        assert_eq!(report.review_requests, 1);
        assert_eq!(h.email.sent_count(), 1);
        let sent = h.email.sent.lock().unwrap();
        assert!(sent[0].html.contains("https://g.page/r/review-us"));
    }

    #[tokio::test]
    async fn referral_invite_assigns_code_lazily() {
        let h = harness();
        h.store
            .put_setting("referral_program", json!({"enabled": true}))
            .unwrap();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());
        h.store
            .create_automation_run(due(AutomationType::ReferralInvite, lead.id))
            .unwrap();

        let report = run_due_automations(&h.state, Utc::now()).await;

        assert_eq!(report.referrals, 1);
        let stored = h.store.lead(lead.id).unwrap().unwrap();
        let code = stored.referral_code.expect("code assigned before sending");
        let sent = h.email.sent.lock().unwrap();
        assert!(sent[0].html.contains(&code));
    }

    #[tokio::test]
    async fn provider_failure_marks_run_failed() {
        let h = harness_with(
            FakeEmail::failing("mailbox full"),
            FakeSms::succeeding(),
            FakeVoice::succeeding(),
        );
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());
        h.store
            .create_automation_run(due(AutomationType::FollowUp1h, lead.id))
            .unwrap();

        let report = run_due_automations(&h.state, Utc::now()).await;

        // The attempt is counted; the row lands terminal failed.
        assert_eq!(report.follow_ups, 1);
        assert_eq!(h.store.automation_runs()[0].status, "failed");
    }

    #[tokio::test]
    async fn one_bad_row_does_not_abort_the_batch() {
        let h = harness();
        let lead = crate::tests::test_util::test_lead();
        h.store.seed_lead(lead.clone());
        // Orphan run (no lead) plus a healthy one.
        h.store
            .create_automation_run(due(AutomationType::FollowUp1h, Uuid::new_v4()))
            .unwrap();
        h.store
            .create_automation_run(due(AutomationType::FollowUp1h, lead.id))
            .unwrap();

        let report = run_due_automations(&h.state, Utc::now()).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.follow_ups, 1);
        // Nothing is left pending.
        assert!(h
            .store
            .automation_runs()
            .iter()
            .all(|r| r.status != "pending"));
    }
}
