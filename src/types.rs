//! Basic type definitions for the chat room
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: UUID-based unique connection identifier
//! - `Nickname`: validated display name, unique among live members

use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;

/// Minimum nickname length, in characters
pub const NICKNAME_MIN_CHARS: usize = 4;

/// Maximum nickname length, in characters
pub const NICKNAME_MAX_CHARS: usize = 20;

/// Unique session identifier (newtype pattern)
///
/// Every accepted connection gets a fresh one, so two sessions that
/// held the same nickname at different times are never confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name of a room member
///
/// Only constructible through [`Nickname::parse`], which enforces the
/// length bound. Comparison is exact (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Nickname(String);

impl Nickname {
    /// Validate a raw nickname from the handshake
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let len = raw.chars().count();
        if !(NICKNAME_MIN_CHARS..=NICKNAME_MAX_CHARS).contains(&len) {
            return Err(AppError::InvalidNickname(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
