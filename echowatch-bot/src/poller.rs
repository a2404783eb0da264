//! Polling engine — one asynchronous loop per active session.
//!
//! Each loop owns the retry/cancellation contract for its PIN:
//! `Starting → Polling → (Completed | Cancelled | Failed)`. Terminal states
//! edit the status message one last time, remove the session from the store
//! and re-persist the snapshot. Errors inside the loop are absorbed — a
//! transient remote failure must not abandon a multi-minute scan.
//!
//! Readiness is content-based: the scan is done exactly when the formatter
//! stops reporting `IncompleteScan`, never because of a status code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use echowatch_core::client::ClientError;
use echowatch_core::models::Report;
use echowatch_core::report::{self, FormatterError};
use echowatch_core::{EchowatchError, ScanClient};
use tokio::sync::broadcast;

use crate::gateway::{ChatGateway, MessageBody};
use crate::logbuf::{LogBuffer, LogLevel};
use crate::store::{Session, SessionStore};

/// Outcome of one poll step. Not-ready is a first-class branch, not a
/// caught error.
#[derive(Debug)]
pub enum PollOutcome {
    Pending,
    Ready(Report),
}

/// How a session loop ended. `Shutdown` is process teardown: the session
/// stays in the store so the snapshot resumes it on the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Completed,
    Cancelled,
    Failed,
    Shutdown,
}

/// Shared collaborators for every polling loop. Loops share only the store
/// and the log buffer, both safe for concurrent access.
pub struct PollerContext {
    pub client: ScanClient,
    pub gateway: Arc<dyn ChatGateway>,
    pub store: SessionStore,
    pub logbuf: LogBuffer,
    pub game_tag: String,
    pub interval: Duration,
}

pub fn spawn_session_loop(
    ctx: Arc<PollerContext>,
    session: Session,
    cancelled: Arc<AtomicBool>,
    resume: bool,
    shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<SessionEnd> {
    tokio::spawn(run_session_loop(ctx, session, cancelled, resume, shutdown))
}

/// One-shot fetch + format for a PIN. Every failure surfaces; the polling
/// loop is what decides which of them mean "keep waiting".
pub async fn fetch_report(
    client: &ScanClient,
    game_tag: &str,
    pin: &str,
) -> Result<Report, EchowatchError> {
    let entries = client.fetch_by_pin(pin).await?;
    let entry = report::match_ready_entry(&entries, game_tag)?;
    let uuid = entry
        .uuid
        .as_deref()
        .ok_or_else(|| FormatterError::Malformed("ready entry has no uuid".to_string()))?;
    let record = client.fetch_by_identifier(uuid).await?;
    Ok(report::build_report(&record)?)
}

/// One poll iteration for a session. Maps the two expected "not ready yet"
/// signals — empty list and `IncompleteScan` — to `Pending`; everything
/// else is a real error for the caller to absorb.
pub async fn poll_step(ctx: &PollerContext, pin: &str) -> Result<PollOutcome, EchowatchError> {
    match fetch_report(&ctx.client, &ctx.game_tag, pin).await {
        Ok(report) => Ok(PollOutcome::Ready(report)),
        Err(EchowatchError::Client(ClientError::NotFound)) => Ok(PollOutcome::Pending),
        Err(EchowatchError::Formatter(FormatterError::IncompleteScan)) => Ok(PollOutcome::Pending),
        Err(e) => Err(e),
    }
}

pub async fn run_session_loop(
    ctx: Arc<PollerContext>,
    session: Session,
    cancelled: Arc<AtomicBool>,
    resume: bool,
    mut shutdown: broadcast::Receiver<()>,
) -> SessionEnd {
    let pin = session.pin.clone();

    if resume {
        // Restored sessions re-enter Polling directly; no duplicate
        // "polling begun" notice.
        tracing::info!(pin = %pin, "Resuming polling loop from snapshot");
    } else {
        let notice = format!("Polling started for PIN {pin}. Waiting for scan results...");
        if let Err(e) = ctx
            .gateway
            .edit(&session.channel_id, &session.message_id, &MessageBody::Text(notice))
            .await
        {
            tracing::warn!(pin = %pin, error = %e, "Failed to deliver polling-started notice");
        }
        tracing::info!(pin = %pin, interval = ?ctx.interval, "Polling loop started");
    }

    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval() fires immediately; consume that tick so iterations are
    // spaced one full period apart, like the upstream cadence.
    ticker.tick().await;

    let end = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.recv() => break SessionEnd::Shutdown,
        }

        if cancelled.load(Ordering::SeqCst) {
            break SessionEnd::Cancelled;
        }

        match poll_step(&ctx, &pin).await {
            Ok(PollOutcome::Ready(report)) => {
                match ctx
                    .gateway
                    .edit(
                        &session.channel_id,
                        &session.message_id,
                        &MessageBody::Report(report),
                    )
                    .await
                {
                    Ok(()) => break SessionEnd::Completed,
                    Err(e) => {
                        tracing::error!(pin = %pin, error = %e, "Failed to deliver final report");
                        ctx.logbuf.record(
                            LogLevel::Error,
                            "final report delivery failed",
                            serde_json::json!({"pin": pin, "error": e.to_string()}),
                        );
                        break SessionEnd::Failed;
                    }
                }
            }
            Ok(PollOutcome::Pending) => {
                tracing::debug!(pin = %pin, "Scan not ready yet");
            }
            Err(EchowatchError::Client(ClientError::RateLimited)) => {
                // Cadence stays fixed: the interval is already sized below
                // the API's throttling threshold.
                tracing::warn!(pin = %pin, "Echo API rate limited; continuing at fixed cadence");
                ctx.logbuf.record(
                    LogLevel::Warn,
                    "rate limited during poll",
                    serde_json::json!({"pin": pin}),
                );
            }
            Err(e) => {
                tracing::error!(pin = %pin, error = %e, "Poll iteration failed; will retry");
                ctx.logbuf.record(
                    LogLevel::Error,
                    "poll iteration failed",
                    serde_json::json!({"pin": pin, "error": e.to_string()}),
                );
            }
        }
    };

    finish(&ctx, &session, end).await;
    end
}

/// Terminal handling: final status edit (where applicable), store removal,
/// snapshot persist. Shutdown skips all of it so the session resumes on the
/// next run.
async fn finish(ctx: &PollerContext, session: &Session, end: SessionEnd) {
    let pin = &session.pin;

    match end {
        SessionEnd::Shutdown => {
            tracing::info!(pin = %pin, "Polling loop suspended for shutdown; session kept");
            return;
        }
        SessionEnd::Completed => {
            tracing::info!(pin = %pin, "Scan completed; report delivered");
            ctx.logbuf.record(
                LogLevel::Info,
                "scan completed",
                serde_json::json!({"pin": pin}),
            );
        }
        SessionEnd::Cancelled => {
            let notice = format!("Polling stopped for PIN {pin}.");
            if let Err(e) = ctx
                .gateway
                .edit(&session.channel_id, &session.message_id, &MessageBody::Text(notice))
                .await
            {
                tracing::warn!(pin = %pin, error = %e, "Failed to deliver stopped notice");
            }
            tracing::info!(pin = %pin, "Polling cancelled");
            ctx.logbuf.record(
                LogLevel::Info,
                "polling cancelled",
                serde_json::json!({"pin": pin}),
            );
        }
        SessionEnd::Failed => {
            tracing::error!(pin = %pin, "Polling loop ended in failure");
        }
    }

    ctx.store.remove(pin);
    if let Err(e) = ctx.store.persist() {
        // Non-fatal: memory stays authoritative until the next persist.
        tracing::error!(pin = %pin, error = %e, "Snapshot persist failed after session removal");
        ctx.logbuf.record(
            LogLevel::Error,
            "snapshot persist failed",
            serde_json::json!({"pin": pin, "error": e.to_string()}),
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
