//! echowatch-cli — admin frontend for the Echowatch scan bridge.
//!
//! Speaks the bot's unix-socket IPC protocol (4-byte little-endian length
//! prefix + MessagePack) and pretty-prints the JSON responses. Chat-platform
//! adapters use the same wire format; this tool exists for operating and
//! debugging a running bot.
//!
//! # Subcommands
//! - `begin <channel-id> [--user <id>]` — issue a PIN and start a session
//! - `start <pin> <channel-id>`         — restart polling for a known PIN
//! - `result <pin> <channel-id>`        — one-shot fetch + deliver
//! - `stop [<pin>]`                     — cancel one or all sessions
//! - `logs [-n <count>]`                — recent log entries
//! - `status`                           — active sessions
//! - `ping`                             — liveness

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use echowatch_core::ipc::{BridgeRequest, BridgeResponse};
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

const DEFAULT_SOCKET: &str = "/tmp/echowatch.sock";

#[derive(Debug, Parser)]
#[command(
    name = "echowatch-cli",
    version,
    about = "Echowatch scan bridge — unix-socket admin CLI"
)]
struct Cli {
    /// Bot IPC socket path (overrides ECHOWATCH_SOCKET env var)
    #[arg(long, env = "ECHOWATCH_SOCKET", default_value = DEFAULT_SOCKET)]
    socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Issue a new PIN and start polling for it
    Begin {
        /// Channel the announcements and status message go to
        channel_id: String,

        /// User the session is attributed to
        #[arg(long)]
        user: Option<String>,
    },

    /// Restart polling for an already-issued PIN
    Start {
        pin: String,
        channel_id: String,

        /// User the session is attributed to
        #[arg(long)]
        user: Option<String>,
    },

    /// One-shot result fetch for a PIN, delivered to a channel
    Result {
        pin: String,
        channel_id: String,
    },

    /// Cancel one session, or all of them
    Stop {
        pin: Option<String>,
    },

    /// Show recent log entries
    Logs {
        /// Number of entries (default 20, max 100)
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// List active sessions
    Status,

    /// Check the bot is alive
    Ping,
}

impl Commands {
    fn into_request(self) -> BridgeRequest {
        match self {
            Commands::Begin { channel_id, user } => BridgeRequest::BeginScan {
                channel_id,
                user_id: user,
            },
            Commands::Start {
                pin,
                channel_id,
                user,
            } => BridgeRequest::Start {
                pin,
                channel_id,
                user_id: user,
            },
            Commands::Result { pin, channel_id } => BridgeRequest::GetResult { pin, channel_id },
            Commands::Stop { pin } => BridgeRequest::Stop { pin },
            Commands::Logs { count } => BridgeRequest::RecentLogs { count },
            Commands::Status => BridgeRequest::Status,
            Commands::Ping => BridgeRequest::Ping,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let request = cli.command.into_request();

    let stream = UnixStream::connect(&cli.socket)
        .await
        .with_context(|| format!("failed to connect to {}", cli.socket))?;
    let (read, write) = stream.into_split();
    let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    let payload = rmp_serde::to_vec_named(&request).context("failed to encode request")?;
    framed_write.send(Bytes::from(payload)).await?;

    let frame = framed_read
        .next()
        .await
        .context("connection closed before a response arrived")??;
    let response: BridgeResponse =
        rmp_serde::from_slice(&frame).context("failed to decode response")?;

    match response.status.as_str() {
        "ok" => {
            let data = response.data.unwrap_or(serde_json::Value::Null);
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        _ => {
            eprintln!(
                "error: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
            std::process::exit(1);
        }
    }
}
