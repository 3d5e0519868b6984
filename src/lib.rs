//! Single-Room WebSocket Chat Broadcaster
//!
//! A WebSocket chat room built with tokio-tungstenite using the Actor
//! pattern for membership and fan-out.
//!
//! # Features
//! - Admission by nickname (`/ws?token=...&nickname=...`), unique per room
//! - Private welcome, join and leave notices
//! - Chat relay with banned-word masking and `@mention` extraction
//! - Bounded per-connection mailboxes; a full mailbox drops the message
//!   for that member only
//! - Banned-word list hot-reloaded from a TOML file
//!
//! # Architecture
//! - `Broadcaster` is the single actor owning the membership registry;
//!   every join, leave and broadcast is a command on its queue
//! - Each connection runs a send loop (mailbox → socket) and a receive
//!   loop (socket → filter → broadcaster)
//! - `SharedConfig` hands out immutable snapshots that the watcher swaps
//!   atomically
//!
//! # Example
//! ```ignore
//! use std::path::Path;
//! use tokio::net::TcpListener;
//! use chatroom::{serve, AppState, RoomHandle, SharedConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SharedConfig::load(Path::new("config/chatroom.toml")).unwrap();
//!     let state = AppState::new(RoomHandle::spawn(256), config);
//!     let listener = TcpListener::bind("127.0.0.1:2022").await.unwrap();
//!     serve(listener, state).await;
//! }
//! ```

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod handshake;
pub mod member;
pub mod message;
pub mod room;
pub mod state;
pub mod types;
pub mod watcher;

use tokio::net::TcpListener;
use tracing::{error, info};

// Re-export main types for convenience
pub use broadcaster::{Broadcaster, RoomCommand, RoomHandle};
pub use config::{ChatConfig, SharedConfig};
pub use error::{AppError, ConfigError};
pub use filter::ContentFilter;
pub use handler::handle_connection;
pub use member::{Delivery, Member};
pub use message::{ErrorCode, ServerMessage, UserInfo};
pub use room::{FanOut, Registry};
pub use state::AppState;
pub use types::{Nickname, SessionId};
pub use watcher::ConfigWatcher;

/// Accept connections forever, one handler task each
pub async fn serve(listener: TcpListener, state: AppState) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let state = state.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
