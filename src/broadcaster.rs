//! Broadcaster actor implementation
//!
//! The single coordination point of the room. It owns the membership
//! registry and processes admission, leave and broadcast commands one at a
//! time from an mpsc queue, so their effects reach every member in the
//! order the commands were issued.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::AppError;
use crate::member::Member;
use crate::message::{ServerMessage, UserInfo};
use crate::room::{FanOut, Registry};
use crate::types::{Nickname, SessionId};

/// Commands sent from connection handlers to the broadcaster
#[derive(Debug)]
pub enum RoomCommand {
    /// Is the nickname free? (no side effect)
    CanAdmit {
        nickname: Nickname,
        reply: oneshot::Sender<bool>,
    },
    /// Check-and-reserve a nickname for an admission in progress
    Reserve {
        session_id: SessionId,
        nickname: Nickname,
        reply: oneshot::Sender<bool>,
    },
    /// Welcome and register an admitted connection
    Enter {
        member: Member,
        user: UserInfo,
        reply: oneshot::Sender<bool>,
    },
    /// Remove a member or release its reservation
    Leave {
        session_id: SessionId,
        nickname: Nickname,
    },
    /// Fan a message out to the current members
    Broadcast {
        message: ServerMessage,
        reply: Option<oneshot::Sender<FanOut>>,
    },
    /// Sorted list of online nicknames
    Members { reply: oneshot::Sender<Vec<String>> },
}

/// The room broadcaster actor
///
/// Runs until every `RoomHandle` is dropped.
pub struct Broadcaster {
    registry: Registry,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl Broadcaster {
    /// Create a broadcaster with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RoomCommand>) -> Self {
        Self {
            registry: Registry::new(),
            receiver,
        }
    }

    /// Run the broadcaster event loop
    pub async fn run(mut self) {
        info!("Broadcaster started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Broadcaster shutting down");
    }

    /// Process a single command
    ///
    /// Synchronous on purpose: nothing in here may await, so one slow
    /// member can never hold up the queue.
    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::CanAdmit { nickname, reply } => {
                let _ = reply.send(self.registry.can_admit(&nickname));
            }
            RoomCommand::Reserve {
                session_id,
                nickname,
                reply,
            } => {
                let granted = self.registry.reserve(session_id, &nickname);
                debug!("Reserve {} for {}: {}", nickname, session_id, granted);
                let _ = reply.send(granted);
            }
            RoomCommand::Enter {
                member,
                user,
                reply,
            } => {
                let nickname = member.nickname.clone();
                let entered = self.registry.admit(member, &user);
                if entered {
                    info!("{} entered, {} online", nickname, self.registry.len());
                }
                let _ = reply.send(entered);
            }
            RoomCommand::Leave {
                session_id,
                nickname,
            } => {
                if self.registry.leave(session_id, &nickname).is_some() {
                    info!("{} left, {} online", nickname, self.registry.len());
                }
            }
            RoomCommand::Broadcast { message, reply } => {
                let report = self.registry.fan_out(&message);
                debug!(
                    "Broadcast queued={} dropped={} closed={}",
                    report.queued, report.dropped, report.closed
                );
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
            RoomCommand::Members { reply } => {
                let _ = reply.send(self.registry.nicknames());
            }
        }
    }
}

/// Cloneable client side of the broadcaster
///
/// Every connection holds one; all room operations go through it.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn new(sender: mpsc::Sender<RoomCommand>) -> Self {
        Self { sender }
    }

    /// Spawn a broadcaster on the current runtime and return its handle
    pub fn spawn(buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        tokio::spawn(Broadcaster::new(receiver).run());
        Self::new(sender)
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::RoomClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| AppError::RoomClosed)
    }

    /// True iff no member holds or has reserved `nickname`
    pub async fn can_admit(&self, nickname: &Nickname) -> Result<bool, AppError> {
        let nickname = nickname.clone();
        self.request(|reply| RoomCommand::CanAdmit { nickname, reply })
            .await
    }

    /// Atomically check and reserve `nickname` for `session_id`
    ///
    /// Of several concurrent calls for one nickname at most one gets true.
    pub async fn reserve(
        &self,
        session_id: SessionId,
        nickname: &Nickname,
    ) -> Result<bool, AppError> {
        let nickname = nickname.clone();
        self.request(|reply| RoomCommand::Reserve {
            session_id,
            nickname,
            reply,
        })
        .await
    }

    /// Queue `user`'s welcome on `member`'s mailbox and register it
    ///
    /// False (and no welcome) if the nickname was not reserved for it.
    pub async fn enter(&self, member: Member, user: UserInfo) -> Result<bool, AppError> {
        self.request(|reply| RoomCommand::Enter {
            member,
            user,
            reply,
        })
        .await
    }

    /// Remove the member owned by `session_id` (idempotent)
    pub async fn leave(&self, session_id: SessionId, nickname: &Nickname) -> Result<(), AppError> {
        self.send(RoomCommand::Leave {
            session_id,
            nickname: nickname.clone(),
        })
        .await
    }

    /// Queue `message` for every current member except its origin
    pub async fn broadcast(&self, message: ServerMessage) -> Result<(), AppError> {
        self.send(RoomCommand::Broadcast {
            message,
            reply: None,
        })
        .await
    }

    /// Like `broadcast`, but waits for the fan-out report
    pub async fn broadcast_and_report(&self, message: ServerMessage) -> Result<FanOut, AppError> {
        self.request(|reply| RoomCommand::Broadcast {
            message,
            reply: Some(reply),
        })
        .await
    }

    /// Sorted list of online nicknames
    pub async fn members(&self) -> Result<Vec<String>, AppError> {
        self.request(|reply| RoomCommand::Members { reply }).await
    }
}
