//! Thin request layer for the Echo anti-cheat API.
//!
//! Two read operations drive the whole polling lifecycle:
//! - `fetch_by_pin` — list of scan entries for a PIN (empty until the agent
//!   has uploaded anything)
//! - `fetch_by_identifier` — the full scan record for one uuid
//!
//! plus `issue_pin` for starting a new scan. No retries at this layer —
//! retry policy belongs to the polling engine.

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::models::{PinIssued, ScanListEntry, ScanRecord};

/// Scan API failure taxonomy. The polling engine keys its logging and
/// absorb-or-surface decisions off these variants.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no scan data available")]
    NotFound,

    #[error("API key rejected")]
    Unauthorized,

    #[error("rate limited by the Echo API")]
    RateLimited,

    #[error("transient API failure: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transient(e.to_string())
    }
}

/// Echo scan API client.
#[derive(Debug, Clone)]
pub struct ScanClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ScanClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        Self::with_base_url(config, config.base_url.clone())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: &ApiConfig, base_url: String) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Request a fresh one-time scan PIN.
    pub async fn issue_pin(&self) -> Result<PinIssued, ClientError> {
        self.get_json("/v1/user/pin").await
    }

    /// Fetch the scan list for a PIN. Succeeds only if the remote returns a
    /// non-empty list; an empty list maps to `NotFound` so callers have a
    /// single "nothing there yet" signal.
    pub async fn fetch_by_pin(&self, pin: &str) -> Result<Vec<ScanListEntry>, ClientError> {
        let entries: Vec<ScanListEntry> = self.get_json(&format!("/v1/scan/{pin}")).await?;
        if entries.is_empty() {
            return Err(ClientError::NotFound);
        }
        Ok(entries)
    }

    /// Fetch the full scan record for a scan uuid.
    pub async fn fetch_by_identifier(&self, id: &str) -> Result<ScanRecord, ClientError> {
        self.get_json(&format!("/v1/scan/{id}")).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        Ok(response.json().await?)
    }
}

fn classify_status(status: StatusCode, body: String) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized,
        StatusCode::NOT_FOUND => ClientError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited,
        code => {
            tracing::error!(code = code.as_u16(), body = %body, "Echo API error");
            ClientError::Transient(format!("HTTP {}: {}", code.as_u16(), body))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
