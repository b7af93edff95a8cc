use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Quoted,
    Converted,
    Closed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Quoted => "quoted",
            Self::Converted => "converted",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "contacted" => Some(Self::Contacted),
            "quoted" => Some(Self::Quoted),
            "converted" => Some(Self::Converted),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationType {
    ThankYou,
    FollowUp1h,
    ReviewRequest,
    ReferralInvite,
    Reengagement6m,
    Reengagement12m,
    Reengagement18m,
}

impl AutomationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThankYou => "thank_you",
            Self::FollowUp1h => "follow_up_1h",
            Self::ReviewRequest => "review_request",
            Self::ReferralInvite => "referral_invite",
            Self::Reengagement6m => "reengagement_6m",
            Self::Reengagement12m => "reengagement_12m",
            Self::Reengagement18m => "reengagement_18m",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "thank_you" => Some(Self::ThankYou),
            "follow_up_1h" => Some(Self::FollowUp1h),
            "review_request" => Some(Self::ReviewRequest),
            "referral_invite" => Some(Self::ReferralInvite),
            "reengagement_6m" => Some(Self::Reengagement6m),
            "reengagement_12m" => Some(Self::Reengagement12m),
            "reengagement_18m" => Some(Self::Reengagement18m),
            _ => None,
        }
    }

    pub fn for_milestone(months: u32) -> Option<Self> {
        match months {
            6 => Some(Self::Reengagement6m),
            12 => Some(Self::Reengagement12m),
            18 => Some(Self::Reengagement18m),
            _ => None,
        }
    }
}

impl std::fmt::Display for AutomationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Completed,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Technician channel preference. Unrecognized values fall back to email,
/// the one channel every technician record can satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPreference {
    All,
    Phone,
    Sms,
    Email,
}

impl NotificationPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Phone => "phone",
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "all" => Self::All,
            "phone" => Self::Phone,
            "sms" => Self::Sms,
            _ => Self::Email,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    Notified,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Notified => "notified",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "notified" => Some(Self::Notified),
            "confirmed" => Some(Self::Confirmed),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Calling,
    SmsSent,
    Emailed,
    Confirmed,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Calling => "calling",
            Self::SmsSent => "sms_sent",
            Self::Emailed => "emailed",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = leads)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub service_type: String,
    pub message: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub source: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_email_sent_at: Option<DateTime<Utc>>,
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = leads)]
pub struct NewLead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub service_type: String,
    pub message: Option<String>,
    pub status: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One scheduled-or-executed lead-lifecycle communication. The unique
/// index on (lead_id, automation_type) is what turns duplicate scheduling
/// attempts into silent no-ops; rows are never deleted.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = automation_runs)]
pub struct AutomationRun {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub automation_type: String,
    pub status: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = automation_runs)]
pub struct NewAutomationRun {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub automation_type: String,
    pub status: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewAutomationRun {
    pub fn pending(lead_id: Uuid, kind: AutomationType, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            automation_type: kind.as_str().to_string(),
            status: RunStatus::Pending.as_str().to_string(),
            scheduled_for: Some(scheduled_for),
            executed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn executed(lead_id: Uuid, kind: AutomationType, status: RunStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            lead_id,
            automation_type: kind.as_str().to_string(),
            status: status.as_str().to_string(),
            scheduled_for: None,
            executed_at: Some(now),
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = technicians)]
pub struct Technician {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub notification_preference: String,
    pub max_jobs_per_day: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Technician {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }

    pub fn preference(&self) -> NotificationPreference {
        NotificationPreference::parse(&self.notification_preference)
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = job_schedules)]
pub struct JobSchedule {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub technician_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub estimated_duration: i32,
    pub notes: Option<String>,
    pub status: String,
    pub notification_status: String,
    pub notify_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = job_schedules)]
pub struct NewJobSchedule {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub technician_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub estimated_duration: i32,
    pub notes: Option<String>,
    pub status: String,
    pub notification_status: String,
    pub notify_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = tech_notifications)]
pub struct TechNotification {
    pub id: Uuid,
    pub job_schedule_id: Uuid,
    pub technician_id: Uuid,
    pub channel: String,
    pub status: String,
    pub external_id: Option<String>,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = tech_notifications)]
pub struct NewTechNotification {
    pub id: Uuid,
    pub job_schedule_id: Uuid,
    pub technician_id: Uuid,
    pub channel: String,
    pub status: String,
    pub external_id: Option<String>,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = email_logs)]
pub struct EmailLog {
    pub id: Uuid,
    pub to_email: String,
    pub to_name: Option<String>,
    pub from_email: String,
    pub subject: String,
    pub template: String,
    pub body_preview: Option<String>,
    pub external_id: Option<String>,
    pub status: String,
    pub lead_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = email_logs)]
pub struct NewEmailLog {
    pub id: Uuid,
    pub to_email: String,
    pub to_name: Option<String>,
    pub from_email: String,
    pub subject: String,
    pub template: String,
    pub body_preview: Option<String>,
    pub external_id: Option<String>,
    pub status: String,
    pub lead_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

pub mod schema {
    diesel::table! {
        leads (id) {
            id -> Uuid,
            name -> Text,
            email -> Text,
            phone -> Text,
            address -> Text,
            service_type -> Text,
            message -> Nullable<Text>,
            status -> Text,
            notes -> Nullable<Text>,
            source -> Text,
            completed_at -> Nullable<Timestamptz>,
            last_email_sent_at -> Nullable<Timestamptz>,
            referral_code -> Nullable<Text>,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        automation_runs (id) {
            id -> Uuid,
            lead_id -> Uuid,
            automation_type -> Text,
            status -> Text,
            scheduled_for -> Nullable<Timestamptz>,
            executed_at -> Nullable<Timestamptz>,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        technicians (id) {
            id -> Uuid,
            name -> Text,
            phone -> Text,
            email -> Nullable<Text>,
            notification_preference -> Text,
            max_jobs_per_day -> Int4,
            is_active -> Bool,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        job_schedules (id) {
            id -> Uuid,
            lead_id -> Uuid,
            technician_id -> Uuid,
            scheduled_date -> Date,
            scheduled_time -> Time,
            estimated_duration -> Int4,
            notes -> Nullable<Text>,
            status -> Text,
            notification_status -> Text,
            notify_at -> Nullable<Timestamptz>,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        tech_notifications (id) {
            id -> Uuid,
            job_schedule_id -> Uuid,
            technician_id -> Uuid,
            channel -> Text,
            status -> Text,
            external_id -> Nullable<Text>,
            response -> Nullable<Text>,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        email_logs (id) {
            id -> Uuid,
            to_email -> Text,
            to_name -> Nullable<Text>,
            from_email -> Text,
            subject -> Text,
            template -> Text,
            body_preview -> Nullable<Text>,
            external_id -> Nullable<Text>,
            status -> Text,
            lead_id -> Nullable<Uuid>,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        settings (id) {
            id -> Uuid,
            key -> Text,
            value -> Jsonb,
            updated_at -> Timestamptz,
        }
    }

    diesel::joinable!(automation_runs -> leads (lead_id));
    diesel::joinable!(job_schedules -> leads (lead_id));
    diesel::joinable!(job_schedules -> technicians (technician_id));
    diesel::joinable!(tech_notifications -> job_schedules (job_schedule_id));
    diesel::joinable!(tech_notifications -> technicians (technician_id));

    diesel::allow_tables_to_appear_in_same_query!(
        leads,
        automation_runs,
        technicians,
        job_schedules,
        tech_notifications,
        email_logs,
        settings,
    );
}

pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn automation_type_round_trip() {
        for kind in [
            AutomationType::ThankYou,
            AutomationType::FollowUp1h,
            AutomationType::ReviewRequest,
            AutomationType::ReferralInvite,
            AutomationType::Reengagement6m,
            AutomationType::Reengagement12m,
            AutomationType::Reengagement18m,
        ] {
            assert_eq!(AutomationType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AutomationType::parse("quote_follow_up"), None);
    }

    #[test]
    fn milestone_types() {
        assert_eq!(
            AutomationType::for_milestone(6),
            Some(AutomationType::Reengagement6m)
        );
        assert_eq!(
            AutomationType::for_milestone(12),
            Some(AutomationType::Reengagement12m)
        );
        assert_eq!(
            AutomationType::for_milestone(18),
            Some(AutomationType::Reengagement18m)
        );
        assert_eq!(AutomationType::for_milestone(24), None);
    }

    #[test]
    fn unknown_preference_falls_back_to_email() {
        assert_eq!(
            NotificationPreference::parse("carrier_pigeon"),
            NotificationPreference::Email
        );
        assert_eq!(NotificationPreference::parse("all"), NotificationPreference::All);
        assert_eq!(
            NotificationPreference::parse("phone"),
            NotificationPreference::Phone
        );
    }

    #[test]
    fn lead_first_name() {
        let lead = Lead {
            id: Uuid::new_v4(),
            name: "Dana Whitfield".to_string(),
            email: "dana@example.com".to_string(),
            phone: "+12085550134".to_string(),
            address: "411 Cedar St".to_string(),
            service_type: "residential".to_string(),
            message: None,
            status: "new".to_string(),
            notes: None,
            source: "website".to_string(),
            completed_at: None,
            last_email_sent_at: None,
            referral_code: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(lead.first_name(), "Dana");
    }
}
