//! Outbound message content: HTML email templates, SMS bodies, and the
//! voice-agent call script. Rendering is pure so every builder is
//! testable without providers.

use crate::config::AppConfig;
use crate::shared::models::{JobSchedule, Lead, Technician};
use crate::shared::utils::{format_job_date, format_job_time, service_label};

const BRAND_COLOR: &str = "#1e40af";
const ACCENT_COLOR: &str = "#16a34a";

#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub subject: String,
    pub html: String,
}

fn email_wrapper(config: &AppConfig, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
</head>
<body style="margin:0;padding:0;background-color:#f3f4f6;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;">
  <table cellpadding="0" cellspacing="0" width="100%" style="max-width:600px;margin:0 auto;background-color:#ffffff;">
    <tr>
      <td style="background-color:{brand};padding:24px 32px;">
        <h1 style="margin:0;color:#ffffff;font-size:20px;font-weight:700;">{company}</h1>
      </td>
    </tr>
    <tr>
      <td style="padding:32px;">
        {content}
      </td>
    </tr>
    <tr>
      <td style="padding:24px 32px;background-color:#f9fafb;border-top:1px solid #e5e7eb;">
        <p style="margin:0;font-size:12px;color:#9ca3af;line-height:1.5;">
          {company} &middot; {phone}<br>
          <a href="{site}" style="color:{brand};">{site}</a>
        </p>
      </td>
    </tr>
  </table>
</body>
</html>"#,
        brand = BRAND_COLOR,
        company = config.company_name,
        phone = config.dispatch_phone,
        site = config.site_url,
        content = content,
    )
}

pub fn thank_you(config: &AppConfig, lead: &Lead) -> EmailTemplate {
    let first = lead.first_name();
    let service = service_label(&lead.service_type);
    let content = format!(
        r#"<h2 style="margin:0 0 16px;color:#111827;font-size:18px;">Thanks for reaching out!</h2>
<p style="color:#374151;font-size:14px;line-height:1.6;margin:0 0 16px;">
  Hi {first}, we received your request for <strong>{service}</strong> and we're excited to help.
</p>
<ol style="color:#374151;font-size:14px;line-height:1.8;margin:0 0 24px;padding-left:20px;">
  <li>We'll review your request within the next hour</li>
  <li>A team member will reach out to schedule your free estimate</li>
  <li>We'll provide a detailed quote before any work begins</li>
</ol>
<p style="color:#374151;font-size:14px;line-height:1.6;margin:0;">
  Questions in the meantime? Call us at <strong>{phone}</strong>.<br>
  <strong>The {company} Team</strong>
</p>"#,
        first = first,
        service = service,
        phone = config.dispatch_phone,
        company = config.company_name,
    );
    EmailTemplate {
        subject: format!("Thanks for contacting {}, {}!", config.company_name, first),
        html: email_wrapper(config, &content),
    }
}

pub fn follow_up_1h(config: &AppConfig, lead: &Lead) -> EmailTemplate {
    let first = lead.first_name();
    let service = service_label(&lead.service_type);
    let content = format!(
        r#"<h2 style="margin:0 0 16px;color:#111827;font-size:18px;">We haven't forgotten about you!</h2>
<p style="color:#374151;font-size:14px;line-height:1.6;margin:0 0 16px;">
  Hi {first}, just a quick note that we received your request for <strong>{service}</strong> and we're putting together your estimate.
</p>
<p style="color:#374151;font-size:14px;line-height:1.6;margin:0 0 24px;">
  We'll be reaching out shortly. If you'd like to get started right away, give us a call:
</p>
<a href="tel:{phone}" style="display:inline-block;background-color:{accent};color:#ffffff;text-decoration:none;padding:12px 24px;border-radius:8px;font-size:14px;font-weight:600;">
  Call {phone}
</a>"#,
        first = first,
        service = service,
        phone = config.dispatch_phone,
        accent = ACCENT_COLOR,
    );
    EmailTemplate {
        subject: format!("{}, we're working on your quote", first),
        html: email_wrapper(config, &content),
    }
}

pub fn review_request(config: &AppConfig, lead: &Lead, review_url: &str) -> EmailTemplate {
    let first = lead.first_name();
    let service = service_label(&lead.service_type);
    let content = format!(
        r#"<h2 style="margin:0 0 16px;color:#111827;font-size:18px;">How did we do?</h2>
<p style="color:#374151;font-size:14px;line-height:1.6;margin:0 0 16px;">
  Hi {first}, thank you for choosing {company} for your {service}. We hope you're noticing the difference!
</p>
<p style="color:#374151;font-size:14px;line-height:1.6;margin:0 0 24px;">
  If you have a moment, we'd really appreciate a quick review. It helps other homeowners find us and keeps our small business growing.
</p>
<a href="{url}" style="display:inline-block;background-color:{accent};color:#ffffff;text-decoration:none;padding:14px 28px;border-radius:8px;font-size:15px;font-weight:600;">
  Leave a Google Review
</a>"#,
        first = first,
        company = config.company_name,
        service = service,
        url = review_url,
        accent = ACCENT_COLOR,
    );
    EmailTemplate {
        subject: format!("{}, how did we do?", first),
        html: email_wrapper(config, &content),
    }
}

pub fn reengagement(config: &AppConfig, lead: &Lead, months: u32) -> EmailTemplate {
    let first = lead.first_name();
    let service = service_label(&lead.service_type).to_lowercase();
    let content = format!(
        r#"<h2 style="margin:0 0 16px;color:#111827;font-size:18px;">Time for a tune-up!</h2>
<p style="color:#374151;font-size:14px;line-height:1.6;margin:0 0 16px;">
  Hi {first}, it's been about {months} months since we last cleaned your {service}. Dusty seasons make regular cleanings count.
</p>
<ul style="color:#374151;font-size:14px;line-height:1.8;margin:0 0 24px;padding-left:20px;">
  <li>Visible dust around vents</li>
  <li>Increased allergy symptoms</li>
  <li>Higher energy bills</li>
  <li>Musty or stale odors</li>
</ul>
<a href="{site}/contact" style="display:inline-block;background-color:{brand};color:#ffffff;text-decoration:none;padding:12px 24px;border-radius:8px;font-size:14px;font-weight:600;">
  Schedule Your Next Cleaning
</a>
<p style="color:#6b7280;font-size:13px;line-height:1.6;margin:24px 0 0;">
  Or call us at {phone}
</p>"#,
        first = first,
        months = months,
        service = service,
        site = config.site_url,
        brand = BRAND_COLOR,
        phone = config.dispatch_phone,
    );
    EmailTemplate {
        subject: format!("It's been {} months - time for another cleaning?", months),
        html: email_wrapper(config, &content),
    }
}

pub fn referral_invite(
    config: &AppConfig,
    lead: &Lead,
    referral_code: &str,
    reward_description: &str,
) -> EmailTemplate {
    let first = lead.first_name();
    let content = format!(
        r#"<h2 style="margin:0 0 16px;color:#111827;font-size:18px;">Share the love, earn rewards!</h2>
<p style="color:#374151;font-size:14px;line-height:1.6;margin:0 0 16px;">
  Hi {first}, thanks again for choosing {company}! We have a special offer for you:
</p>
<div style="background-color:#f0f9ff;border:2px dashed {brand};border-radius:12px;padding:24px;text-align:center;margin:0 0 24px;">
  <p style="color:#6b7280;font-size:13px;margin:0 0 8px;">YOUR REFERRAL CODE</p>
  <p style="color:{brand};font-size:24px;font-weight:700;margin:0 0 8px;letter-spacing:2px;">{code}</p>
  <p style="color:#374151;font-size:14px;margin:0;">
    Share this code with friends and family. They get <strong>{reward}</strong> and you'll receive the same discount on your next service!
  </p>
</div>
<a href="{site}/contact" style="display:inline-block;background-color:{brand};color:#ffffff;text-decoration:none;padding:12px 24px;border-radius:8px;font-size:14px;font-weight:600;">
  Visit Our Website
</a>"#,
        first = first,
        company = config.company_name,
        brand = BRAND_COLOR,
        code = referral_code,
        reward = reward_description,
        site = config.site_url,
    );
    EmailTemplate {
        subject: format!(
            "Share the clean air, {} - give your friends {}",
            first, reward_description
        ),
        html: email_wrapper(config, &content),
    }
}

pub fn confirm_link(config: &AppConfig, job: &JobSchedule, tech: &Technician) -> String {
    format!(
        "{}/webhook/job-confirm?schedule={}&tech={}&action=confirm",
        config.site_url, job.id, tech.id
    )
}

pub fn tech_job_notification(
    config: &AppConfig,
    tech: &Technician,
    lead: &Lead,
    job: &JobSchedule,
) -> EmailTemplate {
    let service = service_label(&lead.service_type);
    let date_str = format_job_date(job.scheduled_date);
    let time_str = format_job_time(job.scheduled_time);
    let confirm_url = confirm_link(config, job, tech);
    let notes = job
        .notes
        .as_deref()
        .map(|n| {
            format!(
                r#"<p style="color:#374151;font-size:14px;margin:8px 0 0;"><strong>Notes:</strong> {}</p>"#,
                n
            )
        })
        .unwrap_or_default();
    let content = format!(
        r#"<h2 style="margin:0 0 16px;color:#111827;font-size:18px;">New Job Assignment</h2>
<p style="color:#374151;font-size:14px;line-height:1.6;margin:0 0 20px;">
  Hi {tech_first}, you've been assigned a new job. Here are the details:
</p>
<div style="background-color:#f0f9ff;border-radius:12px;padding:20px;margin:0 0 24px;">
  <p style="color:#111827;font-size:15px;font-weight:600;margin:0 0 8px;">{service}</p>
  <p style="color:#111827;font-size:15px;margin:0 0 8px;">{date} at {time} &middot; about {duration} minutes</p>
  <p style="color:#111827;font-size:15px;margin:0 0 8px;">{address}</p>
  <p style="color:#111827;font-size:15px;margin:0;">Customer: {customer} &middot; <a href="tel:{customer_phone}" style="color:{brand};">{customer_phone}</a></p>
  {notes}
</div>
<div style="text-align:center;margin:0 0 24px;">
  <a href="{confirm_url}" style="display:inline-block;background-color:{accent};color:#ffffff;text-decoration:none;padding:14px 32px;border-radius:8px;font-size:15px;font-weight:600;">
    Confirm This Job
  </a>
</div>
<p style="color:#6b7280;font-size:13px;line-height:1.6;margin:0;text-align:center;">
  Can't make it? Reply to this email or call dispatch at {dispatch_phone}
</p>"#,
        tech_first = tech.first_name(),
        service = service,
        date = date_str,
        time = time_str,
        duration = job.estimated_duration,
        address = lead.address,
        customer = lead.name,
        customer_phone = lead.phone,
        brand = BRAND_COLOR,
        accent = ACCENT_COLOR,
        confirm_url = confirm_url,
        notes = notes,
        dispatch_phone = config.dispatch_phone,
    );
    EmailTemplate {
        subject: format!("New Job Assignment: {} on {}", service, date_str),
        html: email_wrapper(config, &content),
    }
}

pub fn job_assignment_sms(config: &AppConfig, lead: &Lead, job: &JobSchedule) -> String {
    format!(
        "{} Job Assignment:\n{}\n{}\n{} at {}\nCustomer: {} ({})\n\nReply YES to confirm.",
        config.company_name,
        service_label(&lead.service_type),
        lead.address,
        format_job_date(job.scheduled_date),
        format_job_time(job.scheduled_time),
        lead.name,
        lead.phone,
    )
}

pub fn reminder_sms(config: &AppConfig, lead: &Lead, job: &JobSchedule) -> String {
    format!(
        "{} Reminder: You have a job tomorrow ({}) at {}. {}. Customer: {}.",
        config.company_name,
        format_job_date(job.scheduled_date),
        format_job_time(job.scheduled_time),
        lead.address,
        lead.name,
    )
}

pub fn job_call_script(
    config: &AppConfig,
    tech: &Technician,
    lead: &Lead,
    job: &JobSchedule,
) -> String {
    format!(
        "You are calling {tech}, a technician for {company}.\n\
         You need to notify them about a new job assignment.\n\n\
         Job Details:\n\
         - Customer: {customer}\n\
         - Service: {service}\n\
         - Address: {address}\n\
         - Date: {date}\n\
         - Time: {time}\n\
         - Duration: approximately {duration} minutes\n\n\
         Tell the technician about the job and ask them to confirm they can make it.\n\
         If they confirm, thank them and let them know the customer's contact info will be sent via text.\n\
         If they can't make it, thank them and let them know we'll find another tech.\n\n\
         Be professional, friendly, and brief.",
        tech = tech.name,
        company = config.company_name,
        customer = lead.name,
        service = service_label(&lead.service_type),
        address = lead.address,
        date = format_job_date(job.scheduled_date),
        time = format_job_time(job.scheduled_time),
        duration = job.estimated_duration,
    )
}

pub fn job_call_greeting(config: &AppConfig, tech: &Technician) -> String {
    format!(
        "Hi {}, this is {} dispatch calling with a new job assignment for you.",
        tech.first_name(),
        config.company_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_util::{test_config, test_job, test_lead, test_technician};

    #[test]
    fn assignment_email_embeds_confirmation_link() {
        let config = test_config();
        let lead = test_lead();
        let tech = test_technician("all");
        let job = test_job(lead.id, tech.id);

        let template = tech_job_notification(&config, &tech, &lead, &job);
        let expected = format!(
            "{}/webhook/job-confirm?schedule={}&tech={}&action=confirm",
            config.site_url, job.id, tech.id
        );
        assert!(template.html.contains(&expected));
        assert!(template.subject.starts_with("New Job Assignment"));
    }

    #[test]
    fn assignment_sms_asks_for_confirmation() {
        let config = test_config();
        let lead = test_lead();
        let tech = test_technician("sms");
        let job = test_job(lead.id, tech.id);

        let sms = job_assignment_sms(&config, &lead, &job);
        assert!(sms.ends_with("Reply YES to confirm."));
        assert!(sms.contains(&lead.address));
    }

    #[test]
    fn call_script_names_both_parties() {
        let config = test_config();
        let lead = test_lead();
        let tech = test_technician("phone");
        let job = test_job(lead.id, tech.id);

        let script = job_call_script(&config, &tech, &lead, &job);
        assert!(script.contains(&tech.name));
        assert!(script.contains(&lead.name));

        let greeting = job_call_greeting(&config, &tech);
        assert!(greeting.contains(tech.first_name()));
    }

    #[test]
    fn reengagement_mentions_months() {
        let config = test_config();
        let lead = test_lead();
        let template = reengagement(&config, &lead, 6);
        assert!(template.subject.contains("6 months"));
        assert!(template.html.contains("about 6 months"));
    }

    #[test]
    fn referral_invite_carries_code_and_reward() {
        let config = test_config();
        let lead = test_lead();
        let template = referral_invite(&config, &lead, "CF-DANA-7Q2K", "10% off");
        assert!(template.html.contains("CF-DANA-7Q2K"));
        assert!(template.html.contains("10% off"));
    }
}
