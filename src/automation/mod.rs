pub mod lifecycle;
pub mod milestones;
pub mod processor;
pub mod referral;

pub use lifecycle::{on_lead_completed, on_lead_created};
pub use milestones::run_milestone_scan;
pub use processor::{run_due_automations, AutomationReport};
pub use referral::{assign_referral_code, generate_referral_code};
