//! Chat room server - Entry Point
//!
//! Loads the configuration, starts the watcher and the Broadcaster actor,
//! then accepts connections.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatroom::{serve, AppError, AppState, ConfigWatcher, RoomHandle, SharedConfig};

/// Channel buffer size for room commands
const CHANNEL_BUFFER_SIZE: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "chatroom", about = "Single-room WebSocket chat server")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:2022")]
    addr: String,

    /// Path to the TOML configuration file
    #[arg(long, default_value = "config/chatroom.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chatroom=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatroom=info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    // Configuration is mandatory
    let config = SharedConfig::load(&cli.config)?;
    let snapshot = config.snapshot();
    info!(
        "Loaded {}: {} banned words, message-queue {}",
        cli.config.display(),
        snapshot.sensitive.len(),
        snapshot.message_queue
    );
    let _watcher = ConfigWatcher::start(&cli.config, config.clone())?;

    let listener = TcpListener::bind(&cli.addr).await?;
    info!("Chat room listening on ws://{}/ws", cli.addr);

    let room = RoomHandle::spawn(CHANNEL_BUFFER_SIZE);
    info!("Broadcaster actor started");

    serve(listener, AppState::new(room, config)).await;
    Ok(())
}
