use chrono::{NaiveDate, NaiveTime, Timelike};
use diesel::{
    r2d2::{ConnectionManager, Pool},
    PgConnection,
};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn() -> Result<DbPool, r2d2::Error> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://dispatch:@localhost:5432/dispatchserver".to_string());
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().build(manager)
}

/// "Wednesday, March 4" style rendering for technician-facing messages.
pub fn format_job_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}

/// 12-hour clock rendering, e.g. 14:30 -> "2:30 PM".
pub fn format_job_time(time: NaiveTime) -> String {
    let hour = time.hour();
    let ampm = if hour >= 12 { "PM" } else { "AM" };
    let h12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{}:{:02} {}", h12, time.minute(), ampm)
}

pub fn service_label(service_type: &str) -> String {
    match service_type {
        "residential" => "Residential Duct Cleaning".to_string(),
        "commercial" => "Commercial HVAC Vent Cleaning".to_string(),
        "dryer-vent" => "Dryer Vent Cleaning".to_string(),
        "window-washing" => "Window Washing".to_string(),
        other => other.replace('-', " "),
    }
}

/// First 200 characters of an HTML body with the tags stripped, kept as a
/// preview in the email audit log.
pub fn body_preview(html: &str) -> String {
    let mut out = String::with_capacity(200);
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => {
                if c.is_whitespace() {
                    if !out.ends_with(' ') && !out.is_empty() {
                        out.push(' ');
                    }
                } else {
                    out.push(c);
                }
                if out.len() >= 200 {
                    break;
                }
            }
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Keep digits and a leading '+' so provider-formatted and user-entered
/// phone numbers compare equal.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}
