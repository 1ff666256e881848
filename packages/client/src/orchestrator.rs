//! Collaboration client orchestrator.
//!
//! [`CollabClient`] owns one logical connection to a room. It survives
//! transport drops: while disconnected, outgoing messages wait in an outbox
//! and are flushed in order right after the next handshake, ahead of any new
//! traffic.

use std::sync::Arc;

use tandem_shared::{
    operation::Operation,
    protocol::{
        ChatContent, ClientMessage, CursorPosition, PresenceUpdate, SelectionRange, ServerMessage,
    },
    time::{Clock, SystemClock},
};
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};

use crate::{
    config::ClientConfig,
    edit_buffer::{EditBuffer, PendingEdit},
    error::ClientError,
    handler::CollabEventHandler,
    outbox::Outbox,
    presence::{PeerPresence, PresenceTracker},
    runner::run_with_reconnect,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for or running reconnect attempt `attempt` (1-indexed)
    Reconnecting { attempt: u32 },
}

/// State shared between the public handle and the session task
pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) handler: Arc<dyn CollabEventHandler>,
    /// Channel into the live session, `None` while disconnected
    writer: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
    outbox: Mutex<Outbox>,
    presence: Mutex<PresenceTracker>,
    edits: Mutex<EditBuffer>,
    status: watch::Sender<ConnectionStatus>,
    /// `true` once the user asked to disconnect
    pub(crate) shutdown: watch::Sender<bool>,
    /// Outcome of the last supervisor run, `None` while it is running
    finished: watch::Sender<Option<Result<(), ClientError>>>,
}

impl ClientInner {
    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    /// Route `message` to the live session, or queue it
    async fn send_message(&self, message: ClientMessage) {
        let writer = self.writer.lock().await;
        match writer.as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(message) {
                    self.outbox.lock().await.push(e.0);
                }
            }
            None => {
                tracing::debug!("Disconnected; queueing {}", message.kind());
                self.outbox.lock().await.push(message);
            }
        }
    }

    /// Hand the outbox to a freshly opened session, then make it the writer
    pub(crate) async fn attach(&self, tx: mpsc::UnboundedSender<ClientMessage>) {
        let mut writer = self.writer.lock().await;
        let queued = self.outbox.lock().await.drain();
        if !queued.is_empty() {
            tracing::info!("Flushing {} queued message(s)", queued.len());
        }
        for message in queued {
            // The receiver is alive for as long as the session holds it
            if let Err(e) = tx.send(message) {
                self.outbox.lock().await.push(e.0);
            }
        }
        *writer = Some(tx);
    }

    /// Stop routing to the ending session and requeue what it never wrote
    pub(crate) async fn detach(
        &self,
        rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
        mut unsent: Vec<ClientMessage>,
    ) {
        let mut writer = self.writer.lock().await;
        writer.take();
        while let Ok(message) = rx.try_recv() {
            unsent.push(message);
        }
        if !unsent.is_empty() {
            self.outbox.lock().await.requeue_front(unsent);
        }
    }

    pub(crate) async fn dispatch(&self, message: ServerMessage) {
        self.handler.on_message(&message);

        match message {
            ServerMessage::AuthSuccess { user, session_id } => {
                tracing::info!(
                    "Authenticated as {} (session {})",
                    user.display_name,
                    session_id
                );
            }
            ServerMessage::Presence { from, update, .. } => {
                let (change, snapshot) = {
                    let mut presence = self.presence.lock().await;
                    let change = presence.apply(&from, &update);
                    (change, presence.get(from.presence_key()).cloned())
                };
                let Some(user) = snapshot else { return };
                if change.joined {
                    self.handler.on_user_joined(&user);
                }
                self.handler.on_presence_update(&user);
                if change.left {
                    self.handler.on_user_left(&from);
                }
            }
            ServerMessage::UserLeft { from, .. } => {
                if self.presence.lock().await.remove(&from) {
                    self.handler.on_user_left(&from);
                }
            }
            ServerMessage::Cursor {
                from,
                position,
                path,
                ..
            } => self.handler.on_cursor(&from, &position, &path),
            ServerMessage::Selection {
                from, range, path, ..
            } => self.handler.on_selection(&from, &range, &path),
            ServerMessage::Chat { from, message, .. } => self.handler.on_chat(&from, &message),
            ServerMessage::Edit {
                from,
                path,
                changes,
                ..
            } => {
                self.edits.lock().await.begin_remote();
                self.handler.on_edit(&from, &path, &changes);

                // Hold the gate until the parked edits are out, so a local
                // edit submitted meanwhile cannot overtake them
                let mut edits = self.edits.lock().await;
                for edit in edits.finish_remote() {
                    self.send_message(self.edit_message(edit)).await;
                }
            }
            ServerMessage::Error {
                code,
                message,
                current_version,
                ..
            } => {
                tracing::warn!("Gateway error {:?}: {}", code, message);
                self.handler.on_error(code, &message, current_version);
            }
            ServerMessage::AuthRequired { .. }
            | ServerMessage::Pong { .. }
            | ServerMessage::RoomJoined { .. }
            | ServerMessage::LeftRoom { .. }
            | ServerMessage::LeftAllRooms { .. }
            | ServerMessage::Broadcast { .. } => {}
        }
    }

    fn edit_message(&self, edit: PendingEdit) -> ClientMessage {
        ClientMessage::Edit {
            room_id: self.config.room_id.clone(),
            path: edit.path,
            changes: edit.changes,
        }
    }
}

/// Reconnecting collaboration client for one room
///
/// # Example
///
/// ```ignore
/// let config = ClientConfig::new("ws://127.0.0.1:8080/ws", "doc-1").with_token(token);
/// let client = CollabClient::new(config, Arc::new(NoopHandler));
/// client.connect().await;
/// client.send_chat_message("hello", None, Vec::new()).await;
/// client.disconnect().await?;
/// ```
pub struct CollabClient {
    inner: Arc<ClientInner>,
    clock: Arc<dyn Clock>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl CollabClient {
    pub fn new(config: ClientConfig, handler: Arc<dyn CollabEventHandler>) -> Self {
        Self::with_clock(config, handler, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ClientConfig,
        handler: Arc<dyn CollabEventHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (shutdown, _) = watch::channel(false);
        let (finished, _) = watch::channel(Some(Ok(())));
        Self {
            inner: Arc::new(ClientInner {
                config,
                handler,
                writer: Mutex::new(None),
                outbox: Mutex::new(Outbox::new()),
                presence: Mutex::new(PresenceTracker::new()),
                edits: Mutex::new(EditBuffer::new()),
                status,
                shutdown,
                finished,
            }),
            clock,
            supervisor: Mutex::new(None),
        }
    }

    /// Start connecting in the background. Failed attempts are retried with
    /// exponential backoff; see [`wait`](Self::wait) for the final outcome.
    /// Does nothing while a previous `connect` is still running.
    pub async fn connect(&self) {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        self.inner.shutdown.send_replace(false);
        self.inner.finished.send_replace(None);
        let inner = self.inner.clone();
        *supervisor = Some(tokio::spawn(async move {
            let result = run_with_reconnect(inner.clone()).await;
            inner.set_status(ConnectionStatus::Disconnected);
            inner.finished.send_replace(Some(result));
        }));
    }

    /// Close the connection and stop reconnecting
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.inner.shutdown.send_replace(true);
        self.wait().await
    }

    /// Wait until the client stops for good: `Ok` after
    /// [`disconnect`](Self::disconnect), `Err` on a terminal rejection or
    /// [`ClientError::ReconnectExhausted`].
    pub async fn wait(&self) -> Result<(), ClientError> {
        let mut finished = self.inner.finished.subscribe();
        match finished.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Ok(())),
            Err(_) => Ok(()),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn room_id(&self) -> &str {
        &self.inner.config.room_id
    }

    /// Send now, or queue until the next connection
    pub async fn send_message(&self, message: ClientMessage) {
        self.inner.send_message(message).await;
    }

    pub async fn update_cursor(&self, position: CursorPosition, path: impl Into<String>) {
        self.send_message(ClientMessage::Cursor {
            room_id: self.inner.config.room_id.clone(),
            position,
            path: path.into(),
        })
        .await;
    }

    pub async fn update_selection(&self, range: SelectionRange, path: impl Into<String>) {
        self.send_message(ClientMessage::Selection {
            room_id: self.inner.config.room_id.clone(),
            range,
            path: path.into(),
        })
        .await;
    }

    /// Returns the message as sent, with its generated id and timestamp
    pub async fn send_chat_message(
        &self,
        content: impl Into<String>,
        reply_to: Option<String>,
        mentions: Vec<String>,
    ) -> ChatContent {
        let message = ChatContent {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            reply_to,
            mentions,
            timestamp: self.clock.now_millis(),
        };
        self.send_message(ClientMessage::Chat {
            room_id: self.inner.config.room_id.clone(),
            message: message.clone(),
        })
        .await;
        message
    }

    /// Submit local document changes. While a remote edit is being applied
    /// they are held and sent right after it.
    pub async fn apply_local_changes(&self, changes: Vec<Operation>, path: impl Into<String>) {
        let mut edits = self.inner.edits.lock().await;
        let ready = edits.submit_local(PendingEdit {
            path: path.into(),
            changes,
        });
        match ready {
            Some(edit) => self.send_message(self.inner.edit_message(edit)).await,
            None => tracing::debug!("Remote edit in progress; holding local changes"),
        }
    }

    pub async fn update_presence(&self, update: PresenceUpdate) {
        self.send_message(ClientMessage::Presence {
            room_id: self.inner.config.room_id.clone(),
            update,
        })
        .await;
    }

    /// Presence keys of participants currently online or away
    pub async fn active_users(&self) -> Vec<String> {
        self.inner.presence.lock().await.active_users()
    }

    pub async fn presence_of(&self, key: &str) -> Option<PeerPresence> {
        self.inner.presence.lock().await.get(key).cloned()
    }

    /// Messages waiting for a connection
    pub async fn queued_len(&self) -> usize {
        self.inner.outbox.lock().await.len()
    }
}
