pub mod dispatch;
pub mod reminder;
pub mod templates;

pub use dispatch::{channels_for, notify_technician, spawn_dispatch, DispatchOutcome};
pub use reminder::{run_notification_cycle, NotificationReport, REMINDER_TAG};
