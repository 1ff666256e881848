//! Presence reconciliation.
//!
//! Remote `presence` frames are merged into a per-user map. Join and leave
//! are edge-triggered: a user joins the first time they are seen with a
//! non-offline status and leaves on the transition to offline (or on a
//! `user_left` frame). Every other update is just an update.

use std::collections::HashMap;

use tandem_shared::protocol::{
    CursorPosition, PeerRef, PresenceStatus, PresenceUpdate, SelectionRange,
};

/// Last known state of one remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPresence {
    pub peer: PeerRef,
    pub status: PresenceStatus,
    pub display_name: Option<String>,
    pub cursor: Option<CursorPosition>,
    pub selection: Option<SelectionRange>,
    pub path: Option<String>,
}

impl PeerPresence {
    fn new(peer: &PeerRef) -> Self {
        Self {
            peer: peer.clone(),
            status: PresenceStatus::Offline,
            display_name: peer.display_name.clone(),
            cursor: None,
            selection: None,
            path: None,
        }
    }

    fn merge(&mut self, update: &PresenceUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(name) = &update.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(cursor) = update.cursor {
            self.cursor = Some(cursor);
        }
        if let Some(selection) = update.selection {
            self.selection = Some(selection);
        }
        if let Some(path) = &update.path {
            self.path = Some(path.clone());
        }
    }

    /// Name to show for this participant
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.peer.presence_key())
    }
}

/// What a presence frame changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresenceChange {
    pub joined: bool,
    pub left: bool,
}

#[derive(Debug, Default)]
pub struct PresenceTracker {
    users: HashMap<String, PeerPresence>,
    /// Keys of non-offline users in join order
    active: Vec<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `update` from `from`. A first frame without a status counts as
    /// online.
    pub fn apply(&mut self, from: &PeerRef, update: &PresenceUpdate) -> PresenceChange {
        let key = from.presence_key().to_string();
        let first_seen = !self.users.contains_key(&key);
        let user = self
            .users
            .entry(key.clone())
            .or_insert_with(|| PeerPresence::new(from));

        let was_active = self.active.contains(&key);
        user.merge(update);
        if first_seen && update.status.is_none() {
            user.status = PresenceStatus::Online;
        }
        let is_active = user.status != PresenceStatus::Offline;

        let mut change = PresenceChange::default();
        if is_active && !was_active {
            self.active.push(key);
            change.joined = true;
        } else if !is_active && was_active {
            self.active.retain(|k| k != &key);
            change.left = true;
        }
        change
    }

    /// Forget a participant after `user_left`. Returns `true` if they were
    /// still active, i.e. no leave has been reported for them yet.
    pub fn remove(&mut self, from: &PeerRef) -> bool {
        let key = from.presence_key();
        let was_active = self.active.iter().any(|k| k == key);
        self.active.retain(|k| k != key);
        self.users.remove(key);
        was_active
    }

    pub fn get(&self, key: &str) -> Option<&PeerPresence> {
        self.users.get(key)
    }

    pub fn active_users(&self) -> Vec<String> {
        self.active.clone()
    }
}
