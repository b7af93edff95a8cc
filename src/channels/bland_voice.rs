use log::{error, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ChannelError, OutboundCall, SendResult, VoiceChannel};
use crate::config::VoiceProviderConfig;

const BLAND_API_BASE: &str = "https://api.bland.ai/v1";

/// Outbound conversational calls through the Bland.ai dialing API. The
/// agent reads the generated call script; the provider enforces the
/// duration cap, the engine applies no client-side timeout.
pub struct BlandVoiceChannel {
    config: VoiceProviderConfig,
    http_client: Client,
    base_url: String,
}

impl BlandVoiceChannel {
    pub fn new(config: VoiceProviderConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
            base_url: BLAND_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(config: VoiceProviderConfig, base_url: impl Into<String>) -> Self {
        Self {
            config,
            http_client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn dispatch_call(&self, call: &OutboundCall) -> Result<String, ChannelError> {
        if self.config.api_key.is_empty() {
            return Err(ChannelError::NotConfigured);
        }

        let body = json!({
            "phone_number": call.to,
            "task": call.script,
            "voice": "mason",
            "first_sentence": call.first_sentence,
            "wait_for_greeting": true,
            "max_duration": call.max_duration,
        });

        let response = self
            .http_client
            .post(format!("{}/calls", self.base_url))
            .header("authorization", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Network(e.to_string()))?;

        let status = response.status();
        let payload: CallResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Parse(e.to_string()))?;

        match payload.call_id {
            Some(call_id) => Ok(call_id),
            None => Err(ChannelError::Api {
                code: status.as_u16().to_string(),
                message: payload
                    .message
                    .or(payload.error)
                    .unwrap_or_else(|| "call was not created".to_string()),
            }),
        }
    }
}

#[async_trait::async_trait]
impl VoiceChannel for BlandVoiceChannel {
    async fn call(&self, call: &OutboundCall) -> SendResult {
        match self.dispatch_call(call).await {
            Ok(call_id) => SendResult::ok(call_id),
            Err(ChannelError::NotConfigured) => {
                warn!("Voice provider not configured, call to {} not placed", call.to);
                SendResult::failed("Voice provider not configured")
            }
            Err(e) => {
                error!("Voice call to {} failed: {}", call.to, e);
                SendResult::failed(e.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    call_id: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> OutboundCall {
        OutboundCall {
            to: "+12085550134".to_string(),
            script: "You are calling Rex about a new job assignment.".to_string(),
            first_sentence: "Hi Rex, this is dispatch calling.".to_string(),
            max_duration: 120,
        }
    }

    #[tokio::test]
    async fn call_id_means_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calls")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "success", "call_id": "c-778"}"#)
            .create_async()
            .await;

        let channel = BlandVoiceChannel::with_base_url(
            VoiceProviderConfig {
                api_key: "sk-test".to_string(),
            },
            server.url(),
        );
        let result = VoiceChannel::call(&channel, &call()).await;

        mock.assert_async().await;
        assert!(result.success);
        assert_eq!(result.external_id.as_deref(), Some("c-778"));
    }

    #[tokio::test]
    async fn missing_call_id_means_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/calls")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "invalid phone number"}"#)
            .create_async()
            .await;

        let channel = BlandVoiceChannel::with_base_url(
            VoiceProviderConfig {
                api_key: "sk-test".to_string(),
            },
            server.url(),
        );
        let result = VoiceChannel::call(&channel, &call()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("invalid phone number"));
    }

    #[tokio::test]
    async fn unconfigured_channel_fails_fast() {
        let channel = BlandVoiceChannel::new(VoiceProviderConfig {
            api_key: String::new(),
        });
        let result = VoiceChannel::call(&channel, &call()).await;
        assert!(!result.success);
    }
}
