//! Room member definition
//!
//! What the room keeps for each admitted connection: its identity and the
//! sending half of its bounded mailbox.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::message::ServerMessage;
use crate::types::{Nickname, SessionId};

/// Result of pushing one message onto a member's mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the send loop
    Queued,
    /// Mailbox full; the message was dropped for this member only
    Dropped,
    /// Send loop is gone; the member's leave is pending
    Closed,
}

/// Admitted connection, as seen by the room
#[derive(Debug)]
pub struct Member {
    /// Session that owns this membership
    pub session_id: SessionId,
    /// Display identity, unique among members
    pub nickname: Nickname,
    /// Room → connection mailbox
    mailbox: mpsc::Sender<ServerMessage>,
}

impl Member {
    /// Create a member around an existing mailbox sender
    pub fn new(
        session_id: SessionId,
        nickname: Nickname,
        mailbox: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            session_id,
            nickname,
            mailbox,
        }
    }

    /// Push a message without waiting
    ///
    /// Never blocks: a full mailbox drops the message.
    pub fn deliver(&self, msg: ServerMessage) -> Delivery {
        match self.mailbox.try_send(msg) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Free slots left in the mailbox
    #[cfg(test)]
    pub fn spare_capacity(&self) -> usize {
        self.mailbox.capacity()
    }
}
