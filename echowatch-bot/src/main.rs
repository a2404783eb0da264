use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use echowatch_core::{EchowatchConfig, ScanClient};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use echowatch_bot::gateway::DiscordGateway;
use echowatch_bot::logbuf::LogBuffer;
use echowatch_bot::poller::{self, PollerContext};
use echowatch_bot::router::BotState;
use echowatch_bot::server;
use echowatch_bot::store::SessionStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "echowatch.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match EchowatchConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    if args.health {
        match std::fs::metadata(&config.store.snapshot_path) {
            Ok(_) => println!("✅ Session snapshot present: {}", config.store.snapshot_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                println!("✅ No session snapshot yet (fresh start): {}", config.store.snapshot_path)
            }
            Err(e) => {
                println!("❌ Session snapshot unreadable: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Echowatch config OK ({})", args.config);
        return Ok(());
    }

    let client = match ScanClient::new(&config.api) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to build scan client: {}", e);
            std::process::exit(1);
        }
    };
    let gateway = match DiscordGateway::new(&config.gateway) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Failed to build chat gateway: {}", e);
            std::process::exit(1);
        }
    };

    let store = SessionStore::restore(&config.store.snapshot_path);
    let logbuf = LogBuffer::new(config.log.capacity, &config.log.mirror_path);

    let ctx = Arc::new(PollerContext {
        client,
        gateway: Arc::new(gateway),
        store,
        logbuf,
        game_tag: config.api.game_tag.clone(),
        interval: Duration::from_secs(config.polling.interval_seconds),
    });

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Resume a polling loop for every session recovered from the snapshot.
    for session in ctx.store.list() {
        let Some(cancelled) = ctx.store.cancellation_handle(&session.pin) else {
            continue;
        };
        tracing::info!(pin = %session.pin, "Resuming session from snapshot");
        poller::spawn_session_loop(ctx.clone(), session, cancelled, true, tx.subscribe());
    }

    let state = Arc::new(BotState {
        ctx,
        shutdown: tx.clone(),
    });

    server::run_unix_server(&config.service.socket_path, state, tx.subscribe()).await?;

    Ok(())
}
