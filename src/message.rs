//! Message protocol definitions
//!
//! JSON envelopes pushed from the room to each connection, using Serde's
//! tagged enum with a `kind` discriminator. Inbound frames are plain chat
//! text and have no envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::types::{Nickname, SessionId};

/// Public identity of a room member, as shown to other members
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub id: SessionId,
    pub nickname: Nickname,
    pub entered_at: DateTime<Utc>,
}

impl UserInfo {
    pub fn new(id: SessionId, nickname: Nickname) -> Self {
        Self {
            id,
            nickname,
            entered_at: Utc::now(),
        }
    }
}

/// Room → connection message
///
/// Immutable once built; cloned once per recipient during fan-out.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Admission failed; the connection is closed right after
    Error {
        code: ErrorCode,
        content: String,
        msg_time: DateTime<Utc>,
    },
    /// Private greeting, sent to the new member only
    Welcome {
        user: UserInfo,
        content: String,
        /// Nicknames online at admission time
        users: Vec<String>,
        msg_time: DateTime<Utc>,
    },
    /// A member joined the room
    UserEntered {
        user: UserInfo,
        content: String,
        msg_time: DateTime<Utc>,
    },
    /// A member left the room
    UserLeft {
        user: UserInfo,
        content: String,
        msg_time: DateTime<Utc>,
    },
    /// Filtered chat text from a member
    Chat {
        user: UserInfo,
        content: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        ats: Vec<String>,
        msg_time: DateTime<Utc>,
    },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Nickname length outside the allowed bound
    InvalidNickname,
    /// Nickname held by another live member
    NicknameTaken,
    /// Anything else that ends admission
    Internal,
}

impl ServerMessage {
    pub fn error(code: ErrorCode, content: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            content: content.into(),
            msg_time: Utc::now(),
        }
    }

    pub fn welcome(user: &UserInfo, users: Vec<String>) -> Self {
        ServerMessage::Welcome {
            content: format!("{}: hello, welcome to the chat room!", user.nickname),
            user: user.clone(),
            users,
            msg_time: Utc::now(),
        }
    }

    pub fn user_entered(user: &UserInfo) -> Self {
        ServerMessage::UserEntered {
            content: format!("{} joined the chat room", user.nickname),
            user: user.clone(),
            msg_time: Utc::now(),
        }
    }

    pub fn user_left(user: &UserInfo) -> Self {
        ServerMessage::UserLeft {
            content: format!("{} left the chat room", user.nickname),
            user: user.clone(),
            msg_time: Utc::now(),
        }
    }

    pub fn chat(user: &UserInfo, content: String, ats: Vec<String>) -> Self {
        ServerMessage::Chat {
            user: user.clone(),
            content,
            ats,
            msg_time: Utc::now(),
        }
    }

    /// Session whose action produced this message, if any
    ///
    /// Fan-out never delivers a message back to its origin.
    pub fn origin(&self) -> Option<SessionId> {
        match self {
            ServerMessage::UserEntered { user, .. }
            | ServerMessage::UserLeft { user, .. }
            | ServerMessage::Chat { user, .. } => Some(user.id),
            ServerMessage::Error { .. } | ServerMessage::Welcome { .. } => None,
        }
    }

    /// Rendered text payload
    pub fn content(&self) -> &str {
        match self {
            ServerMessage::Error { content, .. }
            | ServerMessage::Welcome { content, .. }
            | ServerMessage::UserEntered { content, .. }
            | ServerMessage::UserLeft { content, .. }
            | ServerMessage::Chat { content, .. } => content,
        }
    }
}

/// Convert an admission failure into the message shown to the peer
impl From<&AppError> for ServerMessage {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::InvalidNickname(_) => ServerMessage::error(
                ErrorCode::InvalidNickname,
                format!(
                    "illegal nickname, length must be {}-{} characters",
                    crate::types::NICKNAME_MIN_CHARS,
                    crate::types::NICKNAME_MAX_CHARS
                ),
            ),
            AppError::NicknameTaken(_) => {
                ServerMessage::error(ErrorCode::NicknameTaken, "nickname already exists")
            }
            // Fatal errors are not typically converted (connection closes)
            _ => ServerMessage::error(ErrorCode::Internal, "internal error"),
        }
    }
}
