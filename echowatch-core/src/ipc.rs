use serde::{Deserialize, Serialize};

/// Command surface of the bridge. Carried as MessagePack frames over the
/// unix socket; chat-platform adapters and the admin CLI both speak this.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BridgeRequest {
    Ping,
    /// Issue a new PIN and start a polling session for it.
    BeginScan {
        channel_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    /// Restart polling for an already-issued PIN (e.g. after a stop, or
    /// for a PIN issued out-of-band).
    Start {
        pin: String,
        channel_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    /// One-shot fetch + format, independent of any session.
    GetResult {
        pin: String,
        channel_id: String,
    },
    /// Cancel one session, or all of them when `pin` is absent.
    Stop {
        #[serde(default)]
        pin: Option<String>,
    },
    /// Most recent log entries. Default 20, max 100.
    RecentLogs {
        #[serde(default)]
        count: Option<usize>,
    },
    /// Active session PINs.
    Status,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BridgeResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl BridgeResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }
}
