use serde::{Deserialize, Serialize};

pub mod bland_voice;
pub mod email;
pub mod twilio_sms;

pub use bland_voice::BlandVoiceChannel;
pub use email::{send_logged, OutboundEmail, SmtpEmailChannel};
pub use twilio_sms::TwilioSmsChannel;

/// One independent delivery path for technician notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Voice,
    Sms,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single send attempt on a single channel. Adapter-level
/// failures are folded in here rather than bubbling as errors, so
/// dispatch can always record every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    pub fn ok(external_id: impl Into<String>) -> Self {
        Self {
            success: true,
            external_id: Some(external_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("network error: {0}")]
    Network(String),
    #[error("provider error [{code}]: {message}")]
    Api { code: String, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("channel not configured")]
    NotConfigured,
}

/// A voice call request: the generated call script plus the line the
/// agent opens with, bounded by a provider-side duration limit.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub to: String,
    pub script: String,
    pub first_sentence: String,
    pub max_duration: u32,
}

#[async_trait::async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send(
        &self,
        identity: &crate::config::settings::EmailIdentity,
        email: &OutboundEmail,
    ) -> SendResult;
}

#[async_trait::async_trait]
pub trait SmsChannel: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> SendResult;
}

#[async_trait::async_trait]
pub trait VoiceChannel: Send + Sync {
    async fn call(&self, call: &OutboundCall) -> SendResult;
}
