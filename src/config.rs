//! Process-wide chat configuration
//!
//! `ChatConfig` is parsed from a TOML file; `SharedConfig` hands out
//! immutable `Arc` snapshots of it and replaces the whole snapshot on
//! reload, so readers never see a half-updated banned-word list.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default mailbox capacity
pub const DEFAULT_MESSAGE_QUEUE: usize = 1024;

/// Largest accepted mailbox capacity
pub const MAX_MESSAGE_QUEUE: usize = 1 << 20;

fn default_message_queue() -> usize {
    DEFAULT_MESSAGE_QUEUE
}

/// Parsed configuration document
///
/// ```toml
/// sensitive = ["spam", "eggs"]
/// message-queue = 1024
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChatConfig {
    /// Banned words, masked in chat text in this order
    ///
    /// Required, so a truncated or empty file is rejected instead of
    /// clearing the list.
    pub sensitive: Vec<String>,
    /// Capacity of each connection's mailbox, 1..=`MAX_MESSAGE_QUEUE`
    #[serde(default = "default_message_queue")]
    pub message_queue: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            sensitive: Vec::new(),
            message_queue: DEFAULT_MESSAGE_QUEUE,
        }
    }
}

impl ChatConfig {
    /// Parse and validate a TOML document
    ///
    /// `path` is only used for error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: ChatConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if !(1..=MAX_MESSAGE_QUEUE).contains(&config.message_queue) {
            return Err(ConfigError::InvalidQueueLength(config.message_queue));
        }
        config.sensitive.retain(|word| !word.is_empty());
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }
}

/// Shared handle to the current configuration snapshot
#[derive(Debug, Clone)]
pub struct SharedConfig {
    current: Arc<RwLock<Arc<ChatConfig>>>,
}

impl SharedConfig {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Initial load; failure here is fatal for the process
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(ChatConfig::load(path)?))
    }

    /// The snapshot current at call time
    pub fn snapshot(&self) -> Arc<ChatConfig> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a new snapshot
    pub fn replace(&self, config: ChatConfig) {
        *self.current.write() = Arc::new(config);
    }

    /// Re-read `path` and swap it in
    ///
    /// On error the previous snapshot stays in effect.
    pub fn reload(&self, path: &Path) -> Result<Arc<ChatConfig>, ConfigError> {
        let config = ChatConfig::load(path)?;
        self.replace(config);
        Ok(self.snapshot())
    }
}
