use chrono::{DateTime, NaiveDate, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sql_types::{Bool, Text};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::shared::models::schema::{
    automation_runs, email_logs, job_schedules, leads, settings, tech_notifications, technicians,
};
use crate::shared::models::{
    AutomationRun, AutomationType, JobSchedule, JobStatus, Lead, LeadStatus, NewAutomationRun,
    NewEmailLog, NewJobSchedule, NewLead, NewTechNotification, NotificationStatus, RunStatus,
    TechNotification, Technician,
};
use crate::shared::utils::{normalize_phone, DbPool};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        Ok(self.pool.get()?)
    }
}

impl Store for PgStore {
    fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let mut conn = self.conn()?;
        let row = diesel::insert_into(leads::table)
            .values(&lead)
            .returning(Lead::as_returning())
            .get_result(&mut conn)?;
        Ok(row)
    }

    fn lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        let mut conn = self.conn()?;
        let row = leads::table
            .find(id)
            .select(Lead::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn update_lead_status(
        &self,
        id: Uuid,
        status: LeadStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Lead>, StoreError> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        let row = if let Some(at) = completed_at {
            diesel::update(leads::table.find(id))
                .set((
                    leads::status.eq(status.as_str()),
                    leads::completed_at.eq(Some(at)),
                    leads::updated_at.eq(now),
                ))
                .returning(Lead::as_returning())
                .get_result(&mut conn)
                .optional()?
        } else {
            diesel::update(leads::table.find(id))
                .set((leads::status.eq(status.as_str()), leads::updated_at.eq(now)))
                .returning(Lead::as_returning())
                .get_result(&mut conn)
                .optional()?
        };
        Ok(row)
    }

    fn set_referral_code(&self, id: Uuid, code: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::update(leads::table.find(id))
            .set((
                leads::referral_code.eq(Some(code)),
                leads::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn touch_last_email(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::update(leads::table.find(id))
            .set(leads::last_email_sent_at.eq(Some(at)))
            .execute(&mut conn)?;
        Ok(())
    }

    fn reengagement_candidates(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Lead>, StoreError> {
        let mut conn = self.conn()?;
        let rows = leads::table
            .filter(leads::status.eq(LeadStatus::Converted.as_str()))
            .filter(leads::completed_at.is_not_null())
            .filter(leads::completed_at.ge(Some(window_start)))
            .filter(leads::completed_at.le(Some(window_end)))
            .filter(leads::email.ne(""))
            .limit(limit)
            .select(Lead::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn create_automation_run(&self, run: NewAutomationRun) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let inserted = diesel::insert_into(automation_runs::table)
            .values(&run)
            .on_conflict((automation_runs::lead_id, automation_runs::automation_type))
            .do_nothing()
            .execute(&mut conn)?;
        Ok(inserted == 1)
    }

    fn due_automation_runs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<(AutomationRun, Option<Lead>)>, StoreError> {
        let mut conn = self.conn()?;
        let rows = automation_runs::table
            .left_join(leads::table)
            .filter(automation_runs::status.eq(RunStatus::Pending.as_str()))
            .filter(automation_runs::scheduled_for.le(Some(now)))
            .limit(limit)
            .select((AutomationRun::as_select(), Option::<Lead>::as_select()))
            .load(&mut conn)?;
        Ok(rows)
    }

    fn finish_automation_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        executed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::update(automation_runs::table.find(run_id))
            .set((
                automation_runs::status.eq(status.as_str()),
                automation_runs::executed_at.eq(Some(executed_at)),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn automation_run_exists(
        &self,
        lead_id: Uuid,
        kind: AutomationType,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let count: i64 = automation_runs::table
            .filter(automation_runs::lead_id.eq(lead_id))
            .filter(automation_runs::automation_type.eq(kind.as_str()))
            .count()
            .get_result(&mut conn)?;
        Ok(count > 0)
    }

    fn technician(&self, id: Uuid) -> Result<Option<Technician>, StoreError> {
        let mut conn = self.conn()?;
        let row = technicians::table
            .find(id)
            .select(Technician::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn technician_by_phone(&self, phone: &str) -> Result<Option<Technician>, StoreError> {
        let mut conn = self.conn()?;
        // Normalize both sides so provider-formatted caller ids match
        // however the number was entered by the admin.
        let row = technicians::table
            .filter(technicians::is_active.eq(true))
            .filter(
                sql::<Bool>("regexp_replace(phone, '[^0-9+]', '', 'g') = ")
                    .bind::<Text, _>(normalize_phone(phone)),
            )
            .select(Technician::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn job_count_for_day(
        &self,
        technician_id: Uuid,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let count = job_schedules::table
            .filter(job_schedules::technician_id.eq(technician_id))
            .filter(job_schedules::scheduled_date.eq(date))
            .filter(job_schedules::status.ne(JobStatus::Cancelled.as_str()))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    fn insert_job(&self, job: NewJobSchedule) -> Result<JobSchedule, StoreError> {
        let mut conn = self.conn()?;
        let row = diesel::insert_into(job_schedules::table)
            .values(&job)
            .returning(JobSchedule::as_returning())
            .get_result(&mut conn)?;
        Ok(row)
    }

    fn job(&self, id: Uuid) -> Result<Option<JobSchedule>, StoreError> {
        let mut conn = self.conn()?;
        let row = job_schedules::table
            .find(id)
            .select(JobSchedule::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn job_for_technician(
        &self,
        job_id: Uuid,
        technician_id: Uuid,
    ) -> Result<Option<JobSchedule>, StoreError> {
        let mut conn = self.conn()?;
        let row = job_schedules::table
            .filter(job_schedules::id.eq(job_id))
            .filter(job_schedules::technician_id.eq(technician_id))
            .select(JobSchedule::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn latest_open_job(&self, technician_id: Uuid) -> Result<Option<JobSchedule>, StoreError> {
        let mut conn = self.conn()?;
        let row = job_schedules::table
            .filter(job_schedules::technician_id.eq(technician_id))
            .filter(job_schedules::status.eq_any([
                JobStatus::Scheduled.as_str(),
                JobStatus::Notified.as_str(),
            ]))
            .order(job_schedules::created_at.desc())
            .select(JobSchedule::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn jobs_pending_notification(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<JobSchedule>, StoreError> {
        let mut conn = self.conn()?;
        let rows = job_schedules::table
            .filter(job_schedules::notification_status.eq(NotificationStatus::Pending.as_str()))
            .filter(job_schedules::notify_at.le(Some(now)))
            .filter(job_schedules::status.ne(JobStatus::Cancelled.as_str()))
            .limit(limit)
            .select(JobSchedule::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn jobs_on_date(&self, date: NaiveDate) -> Result<Vec<JobSchedule>, StoreError> {
        let mut conn = self.conn()?;
        let rows = job_schedules::table
            .filter(job_schedules::scheduled_date.eq(date))
            .filter(job_schedules::status.eq_any([
                JobStatus::Scheduled.as_str(),
                JobStatus::Notified.as_str(),
                JobStatus::Confirmed.as_str(),
            ]))
            .filter(job_schedules::notification_status.ne(NotificationStatus::Failed.as_str()))
            .select(JobSchedule::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn set_job_notification_state(
        &self,
        job_id: Uuid,
        status: Option<JobStatus>,
        notification_status: NotificationStatus,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        match status {
            Some(status) => {
                diesel::update(job_schedules::table.find(job_id))
                    .set((
                        job_schedules::status.eq(status.as_str()),
                        job_schedules::notification_status.eq(notification_status.as_str()),
                        job_schedules::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
            None => {
                diesel::update(job_schedules::table.find(job_id))
                    .set((
                        job_schedules::notification_status.eq(notification_status.as_str()),
                        job_schedules::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
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
        let mut conn = self.conn()?;
        diesel::insert_into(tech_notifications::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    fn has_notification_tagged_since(
        &self,
        job_id: Uuid,
        tag: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let count: i64 = tech_notifications::table
            .filter(tech_notifications::job_schedule_id.eq(job_id))
            .filter(tech_notifications::response.eq(Some(tag)))
            .filter(tech_notifications::created_at.ge(since))
            .count()
            .get_result(&mut conn)?;
        Ok(count > 0)
    }

    fn notifications_for_job(&self, job_id: Uuid) -> Result<Vec<TechNotification>, StoreError> {
        let mut conn = self.conn()?;
        let rows = tech_notifications::table
            .filter(tech_notifications::job_schedule_id.eq(job_id))
            .order(tech_notifications::created_at.asc())
            .select(TechNotification::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn log_email(&self, row: NewEmailLog) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::insert_into(email_logs::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    fn settings(&self) -> Result<Vec<(String, serde_json::Value)>, StoreError> {
        let mut conn = self.conn()?;
        let rows = settings::table
            .select((settings::key, settings::value))
            .load::<(String, serde_json::Value)>(&mut conn)?;
        Ok(rows)
    }

    fn put_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::insert_into(settings::table)
            .values((
                settings::id.eq(Uuid::new_v4()),
                settings::key.eq(key),
                settings::value.eq(&value),
                settings::updated_at.eq(Utc::now()),
            ))
            .on_conflict(settings::key)
            .do_update()
            .set((settings::value.eq(&value), settings::updated_at.eq(Utc::now())))
            .execute(&mut conn)?;
        Ok(())
    }
}
