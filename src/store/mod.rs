//! Durable record store abstraction.
//!
//! The engine talks to storage through the `Store` trait so processors and
//! handlers stay unit-testable without a live database. `PgStore` is the
//! production diesel/Postgres backend; `MemoryStore` backs the tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::shared::models::{
    AutomationRun, AutomationType, JobSchedule, JobStatus, Lead, LeadStatus, NewAutomationRun,
    NewEmailLog, NewJobSchedule, NewLead, NewTechNotification, NotificationStatus, RunStatus,
    TechNotification, Technician,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("database error: {0}")]
    Query(#[from] diesel::result::Error),
}

pub trait Store: Send + Sync {
    // ===== Leads =====

    fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError>;

    fn lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError>;

    /// Single-row status update; `completed_at` is written only when
    /// provided, so a later status change never clears the stamp.
    fn update_lead_status(
        &self,
        id: Uuid,
        status: LeadStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Lead>, StoreError>;

    fn set_referral_code(&self, id: Uuid, code: &str) -> Result<(), StoreError>;

    fn touch_last_email(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Converted leads with an email whose `completed_at` falls inside the
    /// trailing milestone window.
    fn reengagement_candidates(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Lead>, StoreError>;

    // ===== Automation runs =====

    /// Conditional insert: no-op when a row for this
    /// (lead_id, automation_type) already exists. Returns whether a row
    /// was actually created.
    fn create_automation_run(&self, run: NewAutomationRun) -> Result<bool, StoreError>;

    fn due_automation_runs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<(AutomationRun, Option<Lead>)>, StoreError>;

    fn finish_automation_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        executed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn automation_run_exists(
        &self,
        lead_id: Uuid,
        kind: AutomationType,
    ) -> Result<bool, StoreError>;

    // ===== Technicians =====

    fn technician(&self, id: Uuid) -> Result<Option<Technician>, StoreError>;

    fn technician_by_phone(&self, phone: &str) -> Result<Option<Technician>, StoreError>;

    /// Jobs already booked for a technician on a date, cancelled excluded.
    fn job_count_for_day(
        &self,
        technician_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError>;

    // ===== Job schedules =====

    fn insert_job(&self, job: NewJobSchedule) -> Result<JobSchedule, StoreError>;

    fn job(&self, id: Uuid) -> Result<Option<JobSchedule>, StoreError>;

    fn job_for_technician(
        &self,
        job_id: Uuid,
        technician_id: Uuid,
    ) -> Result<Option<JobSchedule>, StoreError>;

    /// The technician's single most-recently-created job still awaiting
    /// confirmation (status scheduled or notified).
    fn latest_open_job(&self, technician_id: Uuid) -> Result<Option<JobSchedule>, StoreError>;

    fn jobs_pending_notification(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<JobSchedule>, StoreError>;

    /// Jobs on a date that still want a reminder: status in
    /// {scheduled, notified, confirmed} and notification_status not failed.
    fn jobs_on_date(&self, date: NaiveDate) -> Result<Vec<JobSchedule>, StoreError>;

    fn set_job_notification_state(
        &self,
        job_id: Uuid,
        status: Option<JobStatus>,
        notification_status: NotificationStatus,
    ) -> Result<(), StoreError>;

    fn confirm_job(&self, job_id: Uuid) -> Result<(), StoreError>;

    // ===== Notification audit log =====

    fn log_tech_notification(&self, row: NewTechNotification) -> Result<(), StoreError>;

    fn has_notification_tagged_since(
        &self,
        job_id: Uuid,
        tag: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    fn notifications_for_job(&self, job_id: Uuid) -> Result<Vec<TechNotification>, StoreError>;

    // ===== Email audit log =====

    fn log_email(&self, row: NewEmailLog) -> Result<(), StoreError>;

    // ===== Settings =====

    fn settings(&self) -> Result<Vec<(String, serde_json::Value)>, StoreError>;

    fn put_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
}
