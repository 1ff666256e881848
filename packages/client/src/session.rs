//! One transport session: open, handshake, pump frames until close.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tandem_shared::protocol::{ClientMessage, PresenceStatus, PresenceUpdate, ServerMessage};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    time::Instant,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

use crate::{
    domain::confirms_session,
    error::ClientError,
    orchestrator::{ClientInner, ConnectionStatus},
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// How a session ended
#[derive(Debug)]
pub(crate) struct SessionEnd {
    /// The gateway accepted the session (`auth_success`, or `room_joined`
    /// without a token)
    pub established: bool,
    /// `None` when the user asked to disconnect
    pub error: Option<ClientError>,
}

async fn write_message(write: &mut WsSink, message: &ClientMessage) -> Result<(), ClientError> {
    let json = message
        .to_json()
        .map_err(|e| ClientError::ConnectionError(format!("serialize: {}", e)))?;
    write
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| ClientError::ConnectionError(e.to_string()))
}

/// Resolves once the user asked to disconnect.
///
/// The watch guard is released inside, so callers holding this across
/// `select!` stay `Send`.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // The sender lives in ClientInner, so an error cannot outlive the client
    let _ = shutdown.wait_for(|closing| *closing).await;
}

/// Frames sent on every open, before anything queued
fn handshake(inner: &ClientInner) -> Vec<ClientMessage> {
    let mut frames = Vec::with_capacity(3);
    if let Some(token) = &inner.config.token {
        frames.push(ClientMessage::Auth {
            token: token.clone(),
        });
    }
    frames.push(ClientMessage::Join {
        room_id: inner.config.room_id.clone(),
    });
    frames.push(ClientMessage::Presence {
        room_id: inner.config.room_id.clone(),
        update: PresenceUpdate {
            status: Some(PresenceStatus::Online),
            ..Default::default()
        },
    });
    frames
}

/// Run one session against the gateway
pub(crate) async fn run_session(inner: &Arc<ClientInner>) -> SessionEnd {
    let (ws_stream, _) = match connect_async(inner.config.url.as_str()).await {
        Ok(result) => result,
        Err(e) => {
            return SessionEnd {
                established: false,
                error: Some(ClientError::ConnectionError(e.to_string())),
            };
        }
    };
    tracing::info!("Connected to {}", inner.config.url);

    let (mut write, mut read) = ws_stream.split();

    for frame in handshake(inner) {
        if let Err(e) = write_message(&mut write, &frame).await {
            return SessionEnd {
                established: false,
                error: Some(e),
            };
        }
    }

    // The outbox is flushed and new traffic routed here only once the
    // gateway confirms the session
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut pending_tx = Some(tx);
    let authenticating = inner.config.token.is_some();

    let ping_interval = inner.config.ping_interval;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    let mut shutdown = inner.shutdown.subscribe();
    let mut unsent = Vec::new();

    let error = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match ServerMessage::parse(text.as_str()) {
                    Ok(message) => {
                        let confirmed = pending_tx.is_some()
                            && confirms_session(&message, authenticating, &inner.config.room_id);
                        inner.dispatch(message).await;
                        if let Some(tx) = pending_tx.take_if(|_| confirmed) {
                            inner.attach(tx).await;
                            inner.set_status(ConnectionStatus::Connected);
                            inner.handler.on_connect();
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring undecodable frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                        .unwrap_or((None, String::new()));
                    tracing::info!("Server closed the connection ({:?}: {})", code, reason);
                    break Some(ClientError::Closed { code, reason });
                }
                // Protocol-level ping/pong is answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("WebSocket read error: {}", e);
                    break Some(ClientError::ConnectionError(e.to_string()));
                }
                None => {
                    break Some(ClientError::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                }
            },
            outgoing = rx.recv() => {
                let Some(message) = outgoing else {
                    break Some(ClientError::ConnectionError("outbound channel closed".to_string()));
                };
                if let Err(e) = write_message(&mut write, &message).await {
                    tracing::warn!("Failed to send {}: {}", message.kind(), e);
                    unsent.push(message);
                    break Some(e);
                }
            },
            _ = heartbeat.tick() => {
                if let Err(e) = write_message(&mut write, &ClientMessage::Ping).await {
                    break Some(e);
                }
            },
            _ = shutdown_requested(&mut shutdown) => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!("Failed to send close frame: {}", e);
                }
                break None;
            },
        }
    };

    // Anything handed to this session but not written goes back to the outbox
    inner.detach(&mut rx, unsent).await;
    inner.set_status(ConnectionStatus::Disconnected);

    SessionEnd {
        established: pending_tx.is_none(),
        error,
    }
}
