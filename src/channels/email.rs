use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{error, warn};
use uuid::Uuid;

use super::{EmailChannel, SendResult};
use crate::config::settings::EmailIdentity;
use crate::config::SmtpConfig;
use crate::shared::models::NewEmailLog;
use crate::shared::utils::body_preview;
use crate::store::Store;

/// One lead- or technician-facing email, carrying the template tag and
/// optional lead reference the audit log records.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
    pub template: String,
    pub lead_id: Option<Uuid>,
}

pub struct SmtpEmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailChannel {
    pub fn new(config: &SmtpConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait::async_trait]
impl EmailChannel for SmtpEmailChannel {
    async fn send(&self, identity: &EmailIdentity, email: &OutboundEmail) -> SendResult {
        let from = format!("{} <{}>", identity.from_name, identity.from_email);
        let to = match email.to_name.as_deref() {
            Some(name) => format!("{} <{}>", name, email.to),
            None => email.to.clone(),
        };

        let message = Message::builder()
            .from(match from.parse() {
                Ok(mailbox) => mailbox,
                Err(e) => return SendResult::failed(format!("invalid from address: {}", e)),
            })
            .reply_to(match identity.reply_to.parse() {
                Ok(mailbox) => mailbox,
                Err(e) => return SendResult::failed(format!("invalid reply-to address: {}", e)),
            })
            .to(match to.parse() {
                Ok(mailbox) => mailbox,
                Err(e) => return SendResult::failed(format!("invalid recipient: {}", e)),
            })
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone());

        let message = match message {
            Ok(m) => m,
            Err(e) => return SendResult::failed(format!("failed to build message: {}", e)),
        };

        match self.transport.send(message).await {
            Ok(response) => SendResult::ok(response.code().to_string()),
            Err(e) => {
                error!("SMTP send to {} failed: {}", email.to, e);
                SendResult::failed(e.to_string())
            }
        }
    }
}

/// Send an email and append the audit row, stamping the lead's
/// last-email marker on success. Every lead-facing send in the engine
/// goes through here so the email log stays complete.
pub async fn send_logged(
    store: &dyn Store,
    identity: &EmailIdentity,
    channel: &dyn EmailChannel,
    email: OutboundEmail,
) -> SendResult {
    let result = channel.send(identity, &email).await;

    let log = NewEmailLog {
        id: Uuid::new_v4(),
        to_email: email.to.clone(),
        to_name: email.to_name.clone(),
        from_email: identity.from_email.clone(),
        subject: email.subject.clone(),
        template: email.template.clone(),
        body_preview: Some(body_preview(&email.html)),
        external_id: result.external_id.clone(),
        status: if result.success { "sent" } else { "failed" }.to_string(),
        lead_id: email.lead_id,
        created_at: Utc::now(),
    };
    if let Err(e) = store.log_email(log) {
        warn!("Failed to record email log row: {}", e);
    }

    if result.success {
        if let Some(lead_id) = email.lead_id {
            if let Err(e) = store.touch_last_email(lead_id, Utc::now()) {
                warn!("Failed to stamp last_email_sent_at: {}", e);
            }
        }
    }

    result
}
