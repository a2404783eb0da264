//! Command dispatch for the bridge's IPC surface.

use std::sync::Arc;

use chrono::Utc;
use echowatch_core::ipc::{BridgeRequest, BridgeResponse};
use tokio::sync::broadcast;

use crate::gateway::MessageBody;
use crate::logbuf::{LogLevel, DEFAULT_RECENT};
use crate::poller::{self, PollerContext};
use crate::store::{Session, StoreError};

/// Everything a command handler needs: the poller collaborators plus the
/// shutdown channel new loops subscribe to.
pub struct BotState {
    pub ctx: Arc<PollerContext>,
    pub shutdown: broadcast::Sender<()>,
}

pub async fn handle_request(request: BridgeRequest, state: &BotState) -> BridgeResponse {
    match request {
        BridgeRequest::Ping => BridgeResponse::pong(),

        BridgeRequest::BeginScan {
            channel_id,
            user_id,
        } => match handle_begin_scan(state, channel_id, user_id).await {
            Ok(data) => BridgeResponse::ok(data),
            Err(e) => BridgeResponse::err(e.to_string()),
        },

        BridgeRequest::Start {
            pin,
            channel_id,
            user_id,
        } => match handle_start(state, pin, channel_id, user_id).await {
            Ok(data) => BridgeResponse::ok(data),
            Err(e) => BridgeResponse::err(e.to_string()),
        },

        BridgeRequest::GetResult { pin, channel_id } => {
            match handle_get_result(state, &pin, &channel_id).await {
                Ok(data) => BridgeResponse::ok(data),
                Err(e) => BridgeResponse::err(e.to_string()),
            }
        }

        BridgeRequest::Stop { pin } => handle_stop(state, pin),

        BridgeRequest::RecentLogs { count } => {
            let entries = state.ctx.logbuf.recent(count.unwrap_or(DEFAULT_RECENT));
            match serde_json::to_value(&entries) {
                Ok(logs) => BridgeResponse::ok(serde_json::json!({
                    "count": entries.len(),
                    "logs": logs,
                })),
                Err(e) => BridgeResponse::err(e.to_string()),
            }
        }

        BridgeRequest::Status => {
            let sessions: Vec<serde_json::Value> = state
                .ctx
                .store
                .list()
                .into_iter()
                .map(|s| {
                    serde_json::json!({
                        "pin": s.pin,
                        "channelId": s.channel_id,
                        "createdAt": s.created_at,
                    })
                })
                .collect();
            BridgeResponse::ok(serde_json::json!({
                "active": sessions.len(),
                "sessions": sessions,
            }))
        }
    }
}

/// Issue a new PIN, announce it, and start a polling session for it.
async fn handle_begin_scan(
    state: &BotState,
    channel_id: String,
    user_id: Option<String>,
) -> anyhow::Result<serde_json::Value> {
    let ctx = &state.ctx;

    let issued = ctx.client.issue_pin().await?;
    let pin = issued.pin;

    // Check before announcing anything, so a duplicate leaves no stray
    // messages behind.
    if ctx.store.contains(&pin) {
        return Err(StoreError::AlreadyActive(pin).into());
    }

    let link = issued
        .links
        .and_then(|l| l.fivem)
        .unwrap_or_else(|| "Download link unavailable".to_string());

    ctx.gateway
        .send(
            &channel_id,
            &MessageBody::Text(format!("New PIN: {pin}\n{link}")),
        )
        .await?;

    // The status message every later state change edits in place.
    let message_id = ctx
        .gateway
        .send(
            &channel_id,
            &MessageBody::Text(format!("Starting polling for PIN {pin}...")),
        )
        .await?;

    let session = Session {
        pin: pin.clone(),
        channel_id,
        message_id,
        user_id,
        created_at: Utc::now(),
    };

    let cancelled = ctx.store.create(session.clone())?;
    if let Err(e) = ctx.store.persist() {
        tracing::error!(pin = %pin, error = %e, "Snapshot persist failed after session create");
    }

    ctx.logbuf.record(
        LogLevel::Info,
        "polling session started",
        serde_json::json!({"pin": pin}),
    );

    poller::spawn_session_loop(
        ctx.clone(),
        session,
        cancelled,
        false,
        state.shutdown.subscribe(),
    );

    Ok(serde_json::json!({ "pin": pin, "started": true }))
}

/// Re-attach a polling session to an already-issued PIN — after a `stop`,
/// or for a PIN issued outside `begin_scan`.
async fn handle_start(
    state: &BotState,
    pin: String,
    channel_id: String,
    user_id: Option<String>,
) -> anyhow::Result<serde_json::Value> {
    let ctx = &state.ctx;

    if ctx.store.contains(&pin) {
        return Err(StoreError::AlreadyActive(pin).into());
    }

    let message_id = ctx
        .gateway
        .send(
            &channel_id,
            &MessageBody::Text(format!("Starting polling for PIN {pin}...")),
        )
        .await?;

    let session = Session {
        pin: pin.clone(),
        channel_id,
        message_id,
        user_id,
        created_at: Utc::now(),
    };

    let cancelled = ctx.store.create(session.clone())?;
    if let Err(e) = ctx.store.persist() {
        tracing::error!(pin = %pin, error = %e, "Snapshot persist failed after session create");
    }

    ctx.logbuf.record(
        LogLevel::Info,
        "polling session restarted",
        serde_json::json!({"pin": pin}),
    );

    poller::spawn_session_loop(
        ctx.clone(),
        session,
        cancelled,
        false,
        state.shutdown.subscribe(),
    );

    Ok(serde_json::json!({ "pin": pin, "started": true }))
}

/// One-shot fetch + format, independent of any session. Success delivers the
/// report to the channel; errors surface to the caller as text.
async fn handle_get_result(
    state: &BotState,
    pin: &str,
    channel_id: &str,
) -> anyhow::Result<serde_json::Value> {
    let ctx = &state.ctx;

    let report = poller::fetch_report(&ctx.client, &ctx.game_tag, pin).await?;
    ctx.gateway
        .send(channel_id, &MessageBody::Report(report))
        .await?;

    Ok(serde_json::json!({ "pin": pin, "delivered": true }))
}

/// Flag one session (or all of them) for cancellation. Loops observe the
/// flag within one iteration period.
fn handle_stop(state: &BotState, pin: Option<String>) -> BridgeResponse {
    let ctx = &state.ctx;

    match pin {
        Some(pin) => {
            let flagged = ctx.store.mark_cancelled(&pin);
            BridgeResponse::ok(serde_json::json!({
                "pin": pin,
                "cancelled": flagged,
            }))
        }
        None => {
            let mut count = 0usize;
            for session in ctx.store.list() {
                if ctx.store.mark_cancelled(&session.pin) {
                    count += 1;
                }
            }
            BridgeResponse::ok(serde_json::json!({ "cancelled_count": count }))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
