//! Re-engagement milestone scanner.
//!
//! Customers get a loyalty touch 6, 12, and 18 months after service. The
//! scanner looks at a 7-day trailing window behind each cutoff so a
//! missed daily run still catches everyone without re-notifying leads
//! already handled.

use chrono::{DateTime, Duration, Months, Utc};
use log::{error, info};

use crate::channels::{send_logged, OutboundEmail};
use crate::notify::templates;
use crate::shared::models::{AutomationType, NewAutomationRun, RunStatus};
use crate::shared::state::AppState;
use crate::store::Store;

const MILESTONE_MONTHS: [u32; 3] = [6, 12, 18];
const CANDIDATE_BATCH: i64 = 20;
const WINDOW_DAYS: i64 = 7;

/// Returns how many milestone emails were attempted.
pub async fn run_milestone_scan(state: &AppState, now: DateTime<Utc>) -> usize {
    if !state.settings.automations().auto_reengagement_12m {
        return 0;
    }

    let mut sent = 0;
    for months in MILESTONE_MONTHS {
        let Some(kind) = AutomationType::for_milestone(months) else {
            continue;
        };
        let Some(cutoff) = now.checked_sub_months(Months::new(months)) else {
            continue;
        };
        let window_start = cutoff - Duration::days(WINDOW_DAYS);

        let candidates = match state
            .store
            .reengagement_candidates(window_start, cutoff, CANDIDATE_BATCH)
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Milestone candidate query ({}m) failed: {}", months, e);
                continue;
            }
        };

        for lead in candidates {
            match state.store.automation_run_exists(lead.id, kind) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    error!("Milestone existence check for lead {} failed: {}", lead.id, e);
                    continue;
                }
            }

            let template = templates::reengagement(&state.config, &lead, months);
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
                    template: kind.as_str().to_string(),
                    lead_id: Some(lead.id),
                },
            )
            .await;

            let status = if result.success {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            };
            // Conditional insert: a concurrent scan that beat us to the
            // record wins and this one is a no-op.
            let record = NewAutomationRun::executed(lead.id, kind, status);
            match state.store.create_automation_run(record) {
                Ok(_) => sent += 1,
                Err(e) => {
                    error!("Failed to record {}m milestone for lead {}: {}", months, lead.id, e);
                }
            }
        }
    }

    if sent > 0 {
        info!("Milestone scan attempted {} re-engagement email(s)", sent);
    }
    sent
}
