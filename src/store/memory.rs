//! In-memory `Store` used by unit tests. Behavior mirrors `PgStore`,
//! including the conditional-insert semantics on automation runs.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::shared::models::{
    AutomationRun, AutomationType, EmailLog, JobSchedule, JobStatus, Lead, LeadStatus,
    NewAutomationRun, NewEmailLog, NewJobSchedule, NewLead, NewTechNotification,
    NotificationStatus, RunStatus, TechNotification, Technician,
};
use crate::shared::utils::normalize_phone;

#[derive(Default)]
struct Inner {
    leads: Vec<Lead>,
    automation_runs: Vec<AutomationRun>,
    technicians: Vec<Technician>,
    job_schedules: Vec<JobSchedule>,
    tech_notifications: Vec<TechNotification>,
    email_logs: Vec<EmailLog>,
    settings: HashMap<String, serde_json::Value>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Seed and inspection helpers for tests.

    pub fn seed_lead(&self, lead: Lead) {
        self.lock().leads.push(lead);
    }

    pub fn seed_technician(&self, technician: Technician) {
        self.lock().technicians.push(technician);
    }

    pub fn seed_job(&self, job: JobSchedule) {
        self.lock().job_schedules.push(job);
    }

    pub fn automation_runs(&self) -> Vec<AutomationRun> {
        self.lock().automation_runs.clone()
    }

    pub fn tech_notifications(&self) -> Vec<TechNotification> {
        self.lock().tech_notifications.clone()
    }

    pub fn email_logs(&self) -> Vec<EmailLog> {
        self.lock().email_logs.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let row = Lead {
            id: lead.id,
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            address: lead.address,
            service_type: lead.service_type,
            message: lead.message,
            status: lead.status,
            notes: None,
            source: lead.source,
            completed_at: None,
            last_email_sent_at: None,
            referral_code: None,
            created_at: lead.created_at,
            updated_at: lead.updated_at,
        };
        self.lock().leads.push(row.clone());
        Ok(row)
    }

    fn lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(self.lock().leads.iter().find(|l| l.id == id).cloned())
    }

    fn update_lead_status(
        &self,
        id: Uuid,
        status: LeadStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Lead>, StoreError> {
        let mut inner = self.lock();
        let Some(lead) = inner.leads.iter_mut().find(|l| l.id == id) else {
            return Ok(None);
        };
        lead.status = status.as_str().to_string();
        if let Some(at) = completed_at {
            lead.completed_at = Some(at);
        }
        lead.updated_at = Utc::now();
        Ok(Some(lead.clone()))
    }

    fn set_referral_code(&self, id: Uuid, code: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(lead) = inner.leads.iter_mut().find(|l| l.id == id) {
            lead.referral_code = Some(code.to_string());
            lead.updated_at = Utc::now();
        }
        Ok(())
    }

    fn touch_last_email(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(lead) = inner.leads.iter_mut().find(|l| l.id == id) {
            lead.last_email_sent_at = Some(at);
        }
        Ok(())
    }

    fn reengagement_candidates(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Lead>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .leads
            .iter()
            .filter(|l| l.status == LeadStatus::Converted.as_str())
            .filter(|l| !l.email.is_empty())
            .filter(|l| {
                l.completed_at
                    .map(|at| at >= window_start && at <= window_end)
                    .unwrap_or(false)
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn create_automation_run(&self, run: NewAutomationRun) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let exists = inner
            .automation_runs
            .iter()
            .any(|r| r.lead_id == run.lead_id && r.automation_type == run.automation_type);
        if exists {
            return Ok(false);
        }
        inner.automation_runs.push(AutomationRun {
            id: run.id,
            lead_id: run.lead_id,
            automation_type: run.automation_type,
            status: run.status,
            scheduled_for: run.scheduled_for,
            executed_at: run.executed_at,
            created_at: run.created_at,
        });
        Ok(true)
    }

    fn due_automation_runs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<(AutomationRun, Option<Lead>)>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .automation_runs
            .iter()
            .filter(|r| r.status == RunStatus::Pending.as_str())
            .filter(|r| r.scheduled_for.map(|at| at <= now).unwrap_or(false))
            .take(limit as usize)
            .map(|r| {
                let lead = inner.leads.iter().find(|l| l.id == r.lead_id).cloned();
                (r.clone(), lead)
            })
            .collect())
    }

    fn finish_automation_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        executed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(run) = inner.automation_runs.iter_mut().find(|r| r.id == run_id) {
            run.status = status.as_str().to_string();
            run.executed_at = Some(executed_at);
        }
        Ok(())
    }

    fn automation_run_exists(
        &self,
        lead_id: Uuid,
        kind: AutomationType,
    ) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .automation_runs
            .iter()
            .any(|r| r.lead_id == lead_id && r.automation_type == kind.as_str()))
    }

    fn technician(&self, id: Uuid) -> Result<Option<Technician>, StoreError> {
        Ok(self.lock().technicians.iter().find(|t| t.id == id).cloned())
    }

    fn technician_by_phone(&self, phone: &str) -> Result<Option<Technician>, StoreError> {
        let wanted = normalize_phone(phone);
        Ok(self
            .lock()
            .technicians
            .iter()
            .filter(|t| t.is_active)
            .find(|t| normalize_phone(&t.phone) == wanted)
            .cloned())
    }

    fn job_count_for_day(
        &self,
        technician_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        Ok(self
            .lock()
            .job_schedules
            .iter()
            .filter(|j| j.technician_id == technician_id)
            .filter(|j| j.scheduled_date == date)
            .filter(|j| j.status != JobStatus::Cancelled.as_str())
            .count() as i64)
    }

    fn insert_job(&self, job: NewJobSchedule) -> Result<JobSchedule, StoreError> {
        let row = JobSchedule {
            id: job.id,
            lead_id: job.lead_id,
            technician_id: job.technician_id,
            scheduled_date: job.scheduled_date,
            scheduled_time: job.scheduled_time,
            estimated_duration: job.estimated_duration,
            notes: job.notes,
            status: job.status,
            notification_status: job.notification_status,
            notify_at: job.notify_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
        };
        self.lock().job_schedules.push(row.clone());
        Ok(row)
    }

    fn job(&self, id: Uuid) -> Result<Option<JobSchedule>, StoreError> {
        Ok(self.lock().job_schedules.iter().find(|j| j.id == id).cloned())
    }

    fn job_for_technician(
        &self,
        job_id: Uuid,
        technician_id: Uuid,
    ) -> Result<Option<JobSchedule>, StoreError> {
        Ok(self
            .lock()
            .job_schedules
            .iter()
            .find(|j| j.id == job_id && j.technician_id == technician_id)
            .cloned())
    }

    fn latest_open_job(&self, technician_id: Uuid) -> Result<Option<JobSchedule>, StoreError> {
        Ok(self
            .lock()
            .job_schedules
            .iter()
            .filter(|j| j.technician_id == technician_id)
            .filter(|j| {
                j.status == JobStatus::Scheduled.as_str()
                    || j.status == JobStatus::Notified.as_str()
            })
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    fn jobs_pending_notification(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<JobSchedule>, StoreError> {
        Ok(self
            .lock()
            .job_schedules
            .iter()
            .filter(|j| j.notification_status == NotificationStatus::Pending.as_str())
            .filter(|j| j.notify_at.map(|at| at <= now).unwrap_or(false))
            .filter(|j| j.status != JobStatus::Cancelled.as_str())
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn jobs_on_date(&self, date: NaiveDate) -> Result<Vec<JobSchedule>, StoreError> {
        Ok(self
            .lock()
            .job_schedules
            .iter()
            .filter(|j| j.scheduled_date == date)
            .filter(|j| {
                j.status == JobStatus::Scheduled.as_str()
                    || j.status == JobStatus::Notified.as_str()
                    || j.status == JobStatus::Confirmed.as_str()
            })
            .filter(|j| j.notification_status != NotificationStatus::Failed.as_str())
            .cloned()
            .collect())
    }

    fn set_job_notification_state(
        &self,
        job_id: Uuid,
        status: Option<JobStatus>,
        notification_status: NotificationStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(job) = inner.job_schedules.iter_mut().find(|j| j.id == job_id) {
            if let Some(status) = status {
                job.status = status.as_str().to_string();
            }
            job.notification_status = notification_status.as_str().to_string();
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    fn confirm_job(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.set_job_notification_state(
            job_id,
            Some(JobStatus::Confirmed),
            NotificationStatus::Confirmed,
        )
    }

    fn log_tech_notification(&self, row: NewTechNotification) -> Result<(), StoreError> {
        self.lock().tech_notifications.push(TechNotification {
            id: row.id,
            job_schedule_id: row.job_schedule_id,
            technician_id: row.technician_id,
            channel: row.channel,
            status: row.status,
            external_id: row.external_id,
            response: row.response,
            created_at: row.created_at,
        });
        Ok(())
    }

    fn has_notification_tagged_since(
        &self,
        job_id: Uuid,
        tag: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .tech_notifications
            .iter()
            .any(|n| {
                n.job_schedule_id == job_id
                    && n.response.as_deref() == Some(tag)
                    && n.created_at >= since
            }))
    }

    fn notifications_for_job(&self, job_id: Uuid) -> Result<Vec<TechNotification>, StoreError> {
        Ok(self
            .lock()
            .tech_notifications
            .iter()
            .filter(|n| n.job_schedule_id == job_id)
            .cloned()
            .collect())
    }

    fn log_email(&self, row: NewEmailLog) -> Result<(), StoreError> {
        self.lock().email_logs.push(EmailLog {
            id: row.id,
            to_email: row.to_email,
            to_name: row.to_name,
            from_email: row.from_email,
            subject: row.subject,
            template: row.template,
            body_preview: row.body_preview,
            external_id: row.external_id,
            status: row.status,
            lead_id: row.lead_id,
            created_at: row.created_at,
        });
        Ok(())
    }

    fn settings(&self) -> Result<Vec<(String, serde_json::Value)>, StoreError> {
        Ok(self
            .lock()
            .settings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn put_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.lock().settings.insert(key.to_string(), value);
        Ok(())
    }
}
