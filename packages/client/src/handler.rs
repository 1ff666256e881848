//! Callbacks the UI layer registers on a [`CollabClient`](crate::CollabClient).

use tandem_shared::{
    operation::Operation,
    protocol::{
        ChatContent, CursorPosition, ErrorCode, PeerRef, SelectionRange, ServerMessage,
    },
};

use crate::{error::ClientError, presence::PeerPresence};

/// Every method has a no-op default; implement only what the UI needs.
///
/// Callbacks run on the client's session task, so they should return
/// quickly. `on_edit` in particular runs while local edits are held back.
pub trait CollabEventHandler: Send + Sync {
    /// The gateway accepted the session; queued messages are being flushed
    fn on_connect(&self) {}

    /// The transport closed. `error` is `None` after [`disconnect`](crate::CollabClient::disconnect).
    fn on_disconnect(&self, _error: Option<&ClientError>, _will_reconnect: bool) {}

    /// Every decoded frame, before the specific callback
    fn on_message(&self, _message: &ServerMessage) {}

    fn on_presence_update(&self, _user: &PeerPresence) {}
    fn on_user_joined(&self, _user: &PeerPresence) {}
    fn on_user_left(&self, _user: &PeerRef) {}

    fn on_cursor(&self, _from: &PeerRef, _position: &CursorPosition, _path: &str) {}
    fn on_selection(&self, _from: &PeerRef, _range: &SelectionRange, _path: &str) {}
    fn on_chat(&self, _from: &PeerRef, _message: &ChatContent) {}

    /// An accepted edit, including echoes of this client's own edits
    fn on_edit(&self, _from: &PeerRef, _path: &str, _changes: &[Operation]) {}

    fn on_error(&self, _code: ErrorCode, _message: &str, _current_version: Option<u64>) {}
}

/// Handler that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl CollabEventHandler for NoopHandler {}
