//! Room membership registry
//!
//! The authoritative nickname → member mapping plus pending admission
//! reservations. Plain synchronous data: only the broadcaster task owns
//! it, which is what makes every operation here linearizable.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::member::{Delivery, Member};
use crate::message::{ServerMessage, UserInfo};
use crate::types::{Nickname, SessionId};

/// Outcome of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    /// Mailboxes the message was queued on
    pub queued: usize,
    /// Recipients whose mailbox was full
    pub dropped: usize,
    /// Recipients whose send loop already ended
    pub closed: usize,
}

/// Single chat room membership
///
/// A nickname is either free, reserved by exactly one session that has
/// passed `reserve` but not yet `enter`, or held by exactly one member.
#[derive(Debug, Default)]
pub struct Registry {
    /// Live members: Nickname -> Member
    members: HashMap<Nickname, Member>,
    /// Admissions in progress: Nickname -> reserving session
    reserved: HashMap<Nickname, SessionId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff nobody holds or has reserved `nickname`
    pub fn can_admit(&self, nickname: &Nickname) -> bool {
        !self.members.contains_key(nickname) && !self.reserved.contains_key(nickname)
    }

    /// Check-and-reserve `nickname` for `session_id`
    ///
    /// Returns false if the name is taken. Reserving again for the same
    /// session is allowed.
    pub fn reserve(&mut self, session_id: SessionId, nickname: &Nickname) -> bool {
        if self.members.contains_key(nickname) {
            return false;
        }
        match self.reserved.get(nickname) {
            Some(holder) => *holder == session_id,
            None => {
                self.reserved.insert(nickname.clone(), session_id);
                true
            }
        }
    }

    /// Register a member
    ///
    /// No effect (returns false) if the nickname is held by a member or
    /// reserved by a different session.
    pub fn enter(&mut self, member: Member) -> bool {
        if !self.admissible(&member) {
            return false;
        }
        self.reserved.remove(&member.nickname);
        self.members.insert(member.nickname.clone(), member);
        true
    }

    /// Queue `user`'s welcome on the member's mailbox, then `enter`
    ///
    /// The welcome lists the members present right now, so it agrees with
    /// the user_entered notices the new member receives afterwards.
    pub fn admit(&mut self, member: Member, user: &UserInfo) -> bool {
        if !self.admissible(&member) {
            return false;
        }
        match member.deliver(ServerMessage::welcome(user, self.nicknames())) {
            Delivery::Queued => {}
            Delivery::Dropped => warn!("Mailbox of {} is full, welcome dropped", member.nickname),
            Delivery::Closed => debug!("{} went away before its welcome", member.nickname),
        }
        self.enter(member)
    }

    fn admissible(&self, member: &Member) -> bool {
        if self.members.contains_key(&member.nickname) {
            return false;
        }
        match self.reserved.get(&member.nickname) {
            Some(holder) => *holder == member.session_id,
            None => true,
        }
    }

    /// Remove the member (or reservation) owned by `session_id`
    ///
    /// Idempotent. A stale call from an earlier holder of the same
    /// nickname leaves the current holder alone.
    pub fn leave(&mut self, session_id: SessionId, nickname: &Nickname) -> Option<Member> {
        if self.reserved.get(nickname) == Some(&session_id) {
            self.reserved.remove(nickname);
        }
        match self.members.get(nickname) {
            Some(member) if member.session_id == session_id => self.members.remove(nickname),
            _ => None,
        }
    }

    /// Push `msg` onto every member's mailbox except its origin's
    ///
    /// Never waits: full mailboxes lose this message.
    pub fn fan_out(&self, msg: &ServerMessage) -> FanOut {
        let origin = msg.origin();
        let mut report = FanOut::default();

        for member in self.members.values() {
            if Some(member.session_id) == origin {
                continue;
            }
            match member.deliver(msg.clone()) {
                Delivery::Queued => report.queued += 1,
                Delivery::Dropped => {
                    warn!("Mailbox of {} is full, message dropped", member.nickname);
                    report.dropped += 1;
                }
                Delivery::Closed => report.closed += 1,
            }
        }

        report
    }

    /// Current nicknames, sorted
    pub fn nicknames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .members
            .keys()
            .map(|nickname| nickname.as_str().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn contains(&self, nickname: &Nickname) -> bool {
        self.members.contains_key(nickname)
    }

    /// Number of live members (reservations excluded)
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
