//! UseCase: accept a transport connection
//!
//! ```text
//! origin allowed? ──no──▶ DisallowedOrigin (4001)
//!      │
//! IP under cap?   ──no──▶ IpLimitReached (4002)
//!      │
//! register + auth_required + auth deadline (4003 on expiry)
//! ```

use std::{net::IpAddr, sync::Arc};

use tandem_shared::{
    protocol::{CloseCode, ServerMessage},
    time::Clock,
};

use crate::{
    config::{GatewayConfig, millis},
    domain::{
        Connection, ConnectionId, ConnectionRepository, MessagePusher, PusherChannel,
        RepositoryError, TokenBucket,
    },
};

use super::{
    auth_timeout::AuthTimeouts, disconnect_connection::DisconnectConnectionUseCase,
    error::ConnectionRejected,
};

/// Message budget window
const RATE_LIMIT_WINDOW_MILLIS: i64 = 1_000;

pub struct AcceptConnectionUseCase {
    config: Arc<GatewayConfig>,
    repository: Arc<dyn ConnectionRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
    auth_timeouts: Arc<AuthTimeouts>,
    disconnect: Arc<DisconnectConnectionUseCase>,
}

impl AcceptConnectionUseCase {
    pub fn new(
        config: Arc<GatewayConfig>,
        repository: Arc<dyn ConnectionRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
        auth_timeouts: Arc<AuthTimeouts>,
        disconnect: Arc<DisconnectConnectionUseCase>,
    ) -> Self {
        Self {
            config,
            repository,
            message_pusher,
            clock,
            auth_timeouts,
            disconnect,
        }
    }

    /// Register a new connection whose outbound frames go to `sender`.
    ///
    /// On rejection nothing is registered; the caller closes the transport
    /// with [`ConnectionRejected::close_code`].
    pub async fn execute(
        &self,
        ip: IpAddr,
        origin: Option<&str>,
        sender: PusherChannel,
    ) -> Result<ConnectionId, ConnectionRejected> {
        if !self.config.is_origin_allowed(origin) {
            let origin = origin.unwrap_or_default().to_string();
            tracing::warn!("Rejected connection from {}: origin '{}' not allowed", ip, origin);
            return Err(ConnectionRejected::DisallowedOrigin(origin));
        }

        let now = self.clock.now_millis();
        let bucket = TokenBucket::new(
            self.config.max_messages_per_second,
            RATE_LIMIT_WINDOW_MILLIS,
            now,
        );
        let connection = Connection::new(ConnectionId::generate(), ip, bucket, now);
        let connection_id = connection.id.clone();

        match self
            .repository
            .register(connection, self.config.max_connections_per_ip)
            .await
        {
            Ok(()) => {}
            Err(RepositoryError::CapacityExceeded(_)) => {
                tracing::warn!(
                    "Rejected connection from {}: per-IP limit of {} reached",
                    ip,
                    self.config.max_connections_per_ip
                );
                return Err(ConnectionRejected::IpLimitReached(ip));
            }
            Err(e) => return Err(ConnectionRejected::Internal(e.to_string())),
        }
        self.message_pusher
            .register_client(connection_id.clone(), sender)
            .await;

        if self.config.require_auth {
            self.start_auth_deadline(&connection_id).await;
        }

        tracing::info!("Connection '{}' accepted from {}", connection_id, ip);
        Ok(connection_id)
    }

    async fn start_auth_deadline(&self, connection_id: &ConnectionId) {
        let timeout = self.config.auth_timeout;
        let notice = ServerMessage::AuthRequired {
            timeout_ms: u64::try_from(millis(timeout)).unwrap_or(u64::MAX),
        };
        match notice.to_json() {
            Ok(json) => {
                if let Err(e) = self.message_pusher.push_to(connection_id, &json).await {
                    tracing::warn!("Failed to send auth_required to '{}': {}", connection_id, e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize auth_required: {}", e),
        }

        let repository = self.repository.clone();
        let disconnect = self.disconnect.clone();
        let id = connection_id.clone();
        self.auth_timeouts
            .arm(connection_id.clone(), timeout, async move {
                // The connection may have authenticated or gone away meanwhile
                match repository.get(&id).await {
                    Some(conn) if !conn.is_authenticated() => {
                        tracing::warn!("Connection '{}' did not authenticate in time", id);
                        disconnect
                            .terminate(&id, CloseCode::AuthenticationFailed, "authentication timeout")
                            .await;
                    }
                    _ => {}
                }
            })
            .await;
    }
}
