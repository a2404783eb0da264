//! Chat-platform boundary.
//!
//! The polling engine and command handlers only ever talk to `ChatGateway`;
//! `DiscordGateway` is the production implementation over the Discord REST
//! API. Tests use `testing::RecordingGateway`.

use async_trait::async_trait;
use echowatch_core::config::GatewayConfig;
use echowatch_core::models::Report;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API error ({code}): {message}")]
    Api { code: u16, message: String },
}

/// Content of a delivered or edited message: plain text or a structured
/// report (rendered as an embed by the Discord implementation).
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Report(Report),
}

/// Contract consumed from the chat platform: deliver a message into a
/// channel (returning its reference) and edit an existing one in place.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send(&self, channel_id: &str, body: &MessageBody) -> Result<String, GatewayError>;

    async fn edit(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &MessageBody,
    ) -> Result<(), GatewayError>;
}

// ============================================================================
// Discord REST implementation
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Debug, Clone)]
pub struct DiscordGateway {
    client: Client,
    base_url: String,
    token: String,
}

impl DiscordGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_base_url(config, config.base_url.clone())
    }

    /// Create a gateway with a custom base URL (for testing / integration)
    pub fn with_base_url(config: &GatewayConfig, base_url: String) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: config.bot_token.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    fn body_json(body: &MessageBody) -> serde_json::Value {
        match body {
            MessageBody::Text(text) => serde_json::json!({ "content": text }),
            MessageBody::Report(report) => serde_json::json!({
                "embeds": [{
                    "title": report.title,
                    "color": report.color,
                    "description": report.fields.join("\n"),
                }]
            }),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        tracing::error!(code = status.as_u16(), message = %message, "Discord API error");
        Err(GatewayError::Api {
            code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatGateway for DiscordGateway {
    async fn send(&self, channel_id: &str, body: &MessageBody) -> Result<String, GatewayError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.auth_header())
            .json(&Self::body_json(body))
            .send()
            .await?;

        let created: CreatedMessage = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn edit(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &MessageBody,
    ) -> Result<(), GatewayError> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.base_url, channel_id, message_id
        );
        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, self.auth_header())
            .json(&Self::body_json(body))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

// ============================================================================
// Test double
// ============================================================================

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum GatewayEvent {
        Sent {
            channel_id: String,
            body: MessageBody,
        },
        Edited {
            channel_id: String,
            message_id: String,
            body: MessageBody,
        },
    }

    /// In-memory gateway that records every call and hands out sequential
    /// message ids (`msg-1`, `msg-2`, ...). Flip `fail` to make every call
    /// error, for exercising the `Failed` terminal path.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub events: Mutex<Vec<GatewayEvent>>,
        next_id: AtomicU64,
        pub fail: AtomicBool,
    }

    impl RecordingGateway {
        pub fn events(&self) -> Vec<GatewayEvent> {
            self.events.lock().unwrap().clone()
        }

        fn check_fail(&self) -> Result<(), GatewayError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(GatewayError::Api {
                    code: 500,
                    message: "recording gateway forced failure".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ChatGateway for RecordingGateway {
        async fn send(&self, channel_id: &str, body: &MessageBody) -> Result<String, GatewayError> {
            self.check_fail()?;
            self.events.lock().unwrap().push(GatewayEvent::Sent {
                channel_id: channel_id.to_string(),
                body: body.clone(),
            });
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("msg-{id}"))
        }

        async fn edit(
            &self,
            channel_id: &str,
            message_id: &str,
            body: &MessageBody,
        ) -> Result<(), GatewayError> {
            self.check_fail()?;
            self.events.lock().unwrap().push(GatewayEvent::Edited {
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
                body: body.clone(),
            });
            Ok(())
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
