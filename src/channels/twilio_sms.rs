use log::{error, warn};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use super::{ChannelError, SendResult, SmsChannel};
use crate::config::SmsProviderConfig;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioSmsChannel {
    config: SmsProviderConfig,
    http_client: Client,
    base_url: String,
}

impl TwilioSmsChannel {
    pub fn new(config: SmsProviderConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
            base_url: TWILIO_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(config: SmsProviderConfig, base_url: impl Into<String>) -> Self {
        Self {
            config,
            http_client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn is_configured(&self) -> bool {
        !self.config.account_sid.is_empty() && !self.config.auth_token.is_empty()
    }

    pub async fn send_sms(&self, to: &str, body: &str) -> Result<String, ChannelError> {
        if !self.is_configured() {
            return Err(ChannelError::NotConfigured);
        }

        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url, self.config.account_sid
        );

        let params = [
            ("To", to),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| ChannelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let api_error: TwilioApiError = response.json().await.unwrap_or(TwilioApiError {
                code: 0,
                message: "Unknown error".to_string(),
            });
            return Err(ChannelError::Api {
                code: if api_error.code != 0 {
                    api_error.code.to_string()
                } else {
                    status.as_u16().to_string()
                },
                message: api_error.message,
            });
        }

        let message: TwilioMessageResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Parse(e.to_string()))?;

        Ok(message.sid)
    }
}

#[async_trait::async_trait]
impl SmsChannel for TwilioSmsChannel {
    async fn send(&self, to: &str, body: &str) -> SendResult {
        match self.send_sms(to, body).await {
            Ok(sid) => SendResult::ok(sid),
            Err(ChannelError::NotConfigured) => {
                warn!("SMS provider not configured, message to {} not sent", to);
                SendResult::failed("SMS provider not configured")
            }
            Err(e) => {
                error!("SMS send to {} failed: {}", to, e);
                SendResult::failed(e.to_string())
            }
        }
    }
}

/// An inbound message posted by the provider's webhook.
#[derive(Debug, Clone)]
pub struct InboundSms {
    pub message_sid: String,
    pub from: String,
    pub body: String,
}

pub fn parse_inbound_webhook(params: &HashMap<String, String>) -> Result<InboundSms, ChannelError> {
    let from = params
        .get("From")
        .ok_or_else(|| ChannelError::Parse("Missing From".to_string()))?
        .clone();
    let message_sid = params
        .get("MessageSid")
        .cloned()
        .unwrap_or_default();
    let body = params.get("Body").cloned().unwrap_or_default();
    Ok(InboundSms {
        message_sid,
        from,
        body,
    })
}

/// TwiML reply for the webhook response. With no message, an empty
/// `<Response/>` acknowledges without replying.
pub fn twiml_response(message: Option<&str>) -> String {
    let mut twiml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>");
    if let Some(msg) = message {
        twiml.push_str(&format!("\n  <Message>{}</Message>", escape_xml(msg)));
    }
    twiml.push_str("\n</Response>");
    twiml
}

/// Twilio signs webhooks with HMAC-SHA1 over the full URL followed by the
/// sorted form parameters, keyed by the account auth token.
pub fn validate_webhook_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &HashMap<String, String>,
) -> bool {
    use hmac::{Hmac, Mac};
    use sha1::Sha1;

    let mut sorted_params: Vec<(&String, &String)> = params.iter().collect();
    sorted_params.sort_by(|a, b| a.0.cmp(b.0));

    let mut data = url.to_string();
    for (key, value) in sorted_params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data.as_bytes());
    let computed = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        mac.finalize().into_bytes(),
    );

    signature == computed
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioApiError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmsProviderConfig {
        SmsProviderConfig {
            account_sid: "AC0000000000000000000000000000test".to_string(),
            auth_token: "secret-token".to_string(),
            from_number: "+12085550100".to_string(),
        }
    }

    #[tokio::test]
    async fn send_parses_message_sid() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                "/Accounts/AC0000000000000000000000000000test/Messages.json",
            )
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"sid": "SM123", "status": "queued"}"#)
            .create_async()
            .await;

        let channel = TwilioSmsChannel::with_base_url(config(), server.url());
        let result = SmsChannel::send(&channel, "+12085550134", "Reply YES to confirm.").await;

        mock.assert_async().await;
        assert!(result.success);
        assert_eq!(result.external_id.as_deref(), Some("SM123"));
    }

    #[tokio::test]
    async fn api_error_becomes_failed_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "POST",
                "/Accounts/AC0000000000000000000000000000test/Messages.json",
            )
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code": 21211, "message": "Invalid 'To' phone number"}"#)
            .create_async()
            .await;

        let channel = TwilioSmsChannel::with_base_url(config(), server.url());
        let result = SmsChannel::send(&channel, "bogus", "hello").await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("21211"));
    }

    #[tokio::test]
    async fn unconfigured_channel_fails_without_network() {
        let channel = TwilioSmsChannel::new(SmsProviderConfig {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
        });
        let result = SmsChannel::send(&channel, "+12085550134", "hello").await;
        assert!(!result.success);
    }

    #[test]
    fn parses_inbound_webhook() {
        let mut params = HashMap::new();
        params.insert("MessageSid".to_string(), "SM9".to_string());
        params.insert("From".to_string(), "+12085550134".to_string());
        params.insert("Body".to_string(), "YES".to_string());

        let inbound = parse_inbound_webhook(&params).unwrap();
        assert_eq!(inbound.from, "+12085550134");
        assert_eq!(inbound.body, "YES");

        params.remove("From");
        assert!(parse_inbound_webhook(&params).is_err());
    }

    #[test]
    fn twiml_escapes_content() {
        let twiml = twiml_response(Some("Confirmed! You're <all set> & ready."));
        assert!(twiml.contains("&apos;"));
        assert!(twiml.contains("&lt;all set&gt;"));
        assert!(twiml.contains("&amp;"));
        assert!(!twiml.contains("<all set>"));

        assert_eq!(
            twiml_response(None),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n</Response>"
        );
    }

    #[test]
    fn signature_validation_round_trip() {
        use hmac::{Hmac, Mac};
        use sha1::Sha1;

        let mut params = HashMap::new();
        params.insert("From".to_string(), "+12085550134".to_string());
        params.insert("Body".to_string(), "YES".to_string());

        let url = "https://example.com/webhook/job-confirm";
        let mut data = url.to_string();
        data.push_str("BodyYES");
        data.push_str("From+12085550134");

        let mut mac = Hmac::<Sha1>::new_from_slice(b"secret-token").unwrap();
        mac.update(data.as_bytes());
        let expected = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            mac.finalize().into_bytes(),
        );

        assert!(validate_webhook_signature("secret-token", &expected, url, &params));
        assert!(!validate_webhook_signature("secret-token", "bogus", url, &params));
        assert!(!validate_webhook_signature("other-token", &expected, url, &params));
    }
}
