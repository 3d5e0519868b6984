//! Error types for the chat room
//!
//! Defines application-level errors and configuration errors.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// admission errors (send error message to the peer, then close).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The room's coordination task is gone
    #[error("Room closed")]
    RoomClosed,

    /// Nickname outside the allowed length
    #[error("Invalid nickname: {0:?}")]
    InvalidNickname(String),

    /// Nickname held (or reserved) by another live session
    #[error("Nickname already taken: {0}")]
    NicknameTaken(String),

    /// Configuration could not be loaded or watched
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration loading and watching errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// `message-queue` outside 1..=MAX_MESSAGE_QUEUE
    #[error("message-queue must be between 1 and {max}, got {0}", max = crate::config::MAX_MESSAGE_QUEUE)]
    InvalidQueueLength(usize),

    #[error("failed to watch config: {0}")]
    Watch(#[from] notify::Error),
}
