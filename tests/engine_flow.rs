//! End-to-end engine flow against the in-memory store: a job is
//! dispatched across channels, confirmed over SMS, and reminded once the
//! day before it happens.

use chrono::{Duration, NaiveTime, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use dispatchserver::channels::{
    EmailChannel, OutboundCall, OutboundEmail, SendResult, SmsChannel, VoiceChannel,
};
use dispatchserver::config::settings::EmailIdentity;
use dispatchserver::config::{
    AppConfig, DatabaseConfig, ServerConfig, SmsProviderConfig, SmtpConfig, VoiceProviderConfig,
};
use dispatchserver::notify::{notify_technician, run_notification_cycle};
use dispatchserver::shared::models::{JobSchedule, Lead, Technician};
use dispatchserver::shared::state::AppState;
use dispatchserver::store::{MemoryStore, Store};

struct CountingEmail(Mutex<Vec<OutboundEmail>>);

#[async_trait::async_trait]
impl EmailChannel for CountingEmail {
    async fn send(&self, _identity: &EmailIdentity, email: &OutboundEmail) -> SendResult {
        self.0.lock().unwrap().push(email.clone());
        SendResult::ok("email-1")
    }
}

struct CountingSms(Mutex<Vec<(String, String)>>);

#[async_trait::async_trait]
impl SmsChannel for CountingSms {
    async fn send(&self, to: &str, body: &str) -> SendResult {
        self.0
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        SendResult::ok("SM1")
    }
}

struct RefusingVoice;

#[async_trait::async_trait]
impl VoiceChannel for RefusingVoice {
    async fn call(&self, _call: &OutboundCall) -> SendResult {
        SendResult::failed("line busy")
    }
}

fn config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        database: DatabaseConfig {
            url: "postgres://dispatch:@localhost:5432/dispatchserver_test".to_string(),
        },
        site_url: "https://clearflowhome.example".to_string(),
        company_name: "ClearFlow Home Services".to_string(),
        dispatch_phone: "(208) 555-0199".to_string(),
        cron_secret: "cron-secret".to_string(),
        admin_token: "admin-token".to_string(),
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: String::new(),
            password: String::new(),
        },
        sms: SmsProviderConfig {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
        },
        voice: VoiceProviderConfig {
            api_key: String::new(),
        },
    }
}

#[tokio::test]
async fn assignment_confirmation_and_reminder_flow() {
    let store = Arc::new(MemoryStore::new());
    let email = Arc::new(CountingEmail(Mutex::new(Vec::new())));
    let sms = Arc::new(CountingSms(Mutex::new(Vec::new())));
    let state = AppState::new(
        config(),
        store.clone(),
        email.clone(),
        sms.clone(),
        Arc::new(RefusingVoice),
    );

    let now = Utc::now();
    let lead = Lead {
        id: Uuid::new_v4(),
        name: "Dana Whitfield".to_string(),
        email: "dana@example.com".to_string(),
        phone: "+12085550134".to_string(),
        address: "411 Cedar St".to_string(),
        service_type: "residential".to_string(),
        message: None,
        status: "quoted".to_string(),
        notes: None,
        source: "website".to_string(),
        completed_at: None,
        last_email_sent_at: None,
        referral_code: None,
        created_at: now,
        updated_at: now,
    };
    let tech = Technician {
        id: Uuid::new_v4(),
        name: "Rex Calloway".to_string(),
        phone: "+12085550177".to_string(),
        email: Some("rex@example.com".to_string()),
        notification_preference: "all".to_string(),
        max_jobs_per_day: 4,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let job = JobSchedule {
        id: Uuid::new_v4(),
        lead_id: lead.id,
        technician_id: tech.id,
        scheduled_date: (now + Duration::hours(24)).date_naive(),
        scheduled_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        estimated_duration: 120,
        notes: None,
        status: "scheduled".to_string(),
        notification_status: "pending".to_string(),
        notify_at: Some(now),
        created_at: now,
        updated_at: now,
    };
    store.seed_lead(lead.clone());
    store.seed_technician(tech.clone());
    store.seed_job(job.clone());

    // Dispatch fans out to all three channels; the dead voice line does
    // not stop sms or email, and sms takes precedence for the status.
    let outcomes = notify_technician(&state, &job, &tech, &lead).await;
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes.iter().filter(|o| o.result.success).count(), 2);

    let notified = store.job(job.id).unwrap().unwrap();
    assert_eq!(notified.status, "notified");
    assert_eq!(notified.notification_status, "sms_sent");
    assert_eq!(store.tech_notifications().len(), 3);

    // The technician confirms; both status fields settle.
    store.confirm_job(job.id).unwrap();
    let confirmed = store.job(job.id).unwrap().unwrap();
    assert_eq!(confirmed.status, "confirmed");
    assert_eq!(confirmed.notification_status, "confirmed");

    // The job is tomorrow, so the notification cycle sends exactly one
    // reminder, and a rerun the same day sends none.
    let sms_before = sms.0.lock().unwrap().len();
    let report = run_notification_cycle(&state, now).await;
    assert_eq!(report.reminders, 1);
    assert_eq!(sms.0.lock().unwrap().len(), sms_before + 1);

    let rerun = run_notification_cycle(&state, now).await;
    assert_eq!(rerun.reminders, 0);
    assert_eq!(sms.0.lock().unwrap().len(), sms_before + 1);
}
