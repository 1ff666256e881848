//! WebSocket connection handlers.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{
        ConnectInfo, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, header},
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, OutboundFrame},
    ui::state::AppState,
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    // Frames past the transport limit fail the read and end the connection
    // before they are buffered whole
    let limit = state.gateway_config.transport_message_limit();

    // Rejections are reported with a close code, so the upgrade always
    // completes first
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, state, addr, origin))
}

/// Spawns a task that drains the connection's outbound channel into the
/// WebSocket. Stops after a close frame or when the channel is dropped.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let (message, is_close) = match frame {
                OutboundFrame::Text(text) => (Message::Text(text.into()), false),
                OutboundFrame::Ping => (Message::Ping(Bytes::new()), false),
                OutboundFrame::Close { code, reason } => (
                    Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })),
                    true,
                ),
            };
            if sender.send(message).await.is_err() || is_close {
                break;
            }
        }
    })
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    addr: SocketAddr,
    origin: Option<String>,
) {
    let (tx, rx) = mpsc::unbounded_channel();

    let connection_id = match state
        .accept_connection_usecase
        .execute(addr.ip(), origin.as_deref(), tx)
        .await
    {
        Ok(id) => id,
        Err(rejection) => {
            let frame = CloseFrame {
                code: rejection.close_code().code(),
                reason: rejection.to_string().into(),
            };
            if let Err(e) = socket.send(Message::Close(Some(frame))).await {
                tracing::debug!("Failed to send close frame to {}: {}", addr, e);
            }
            return;
        }
    };

    let (sender, mut receiver) = socket.split();

    let id = connection_id.clone();
    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error on '{}': {}", id, e);
                    break;
                }
            };
            if !handle_inbound(&recv_state, &id, msg).await {
                break;
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    state
        .disconnect_connection_usecase
        .execute(&connection_id)
        .await;
}

/// Returns `false` when the peer asked to close
async fn handle_inbound(state: &AppState, connection_id: &ConnectionId, msg: Message) -> bool {
    match msg {
        Message::Text(text) => {
            // Errors were already answered with an error frame or a close
            if let Err(e) = state
                .handle_message_usecase
                .execute(connection_id, text.as_str())
                .await
            {
                tracing::debug!("Message from '{}' rejected: {}", connection_id, e);
            }
        }
        Message::Binary(bytes) => {
            if let Err(e) = state
                .handle_message_usecase
                .execute_bytes(connection_id, &bytes)
                .await
            {
                tracing::debug!("Binary frame from '{}' rejected: {}", connection_id, e);
            }
        }
        Message::Pong(_) => {
            state.liveness_usecase.record_pong(connection_id).await;
        }
        Message::Ping(_) => {
            tracing::debug!("Received ping from '{}'", connection_id);
            // Ping/pong is handled automatically by the WebSocket protocol
        }
        Message::Close(_) => {
            tracing::info!("Connection '{}' requested close", connection_id);
            return false;
        }
    }
    true
}
