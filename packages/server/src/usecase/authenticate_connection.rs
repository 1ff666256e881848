//! UseCase: the `auth` handshake
//!
//! Token validation suspends, so everything it decides is re-checked against
//! the registry afterwards: the connection may have closed meanwhile.

use std::sync::Arc;

use tandem_shared::protocol::{CloseCode, ServerMessage};

use crate::domain::{AuthContext, Authenticator, ConnectionId, ConnectionRepository, MessagePusher};

use super::{
    auth_timeout::AuthTimeouts, disconnect_connection::DisconnectConnectionUseCase,
    error::GatewayError,
};

pub struct AuthenticateConnectionUseCase {
    repository: Arc<dyn ConnectionRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    authenticator: Arc<dyn Authenticator>,
    auth_timeouts: Arc<AuthTimeouts>,
    disconnect: Arc<DisconnectConnectionUseCase>,
}

impl AuthenticateConnectionUseCase {
    pub fn new(
        repository: Arc<dyn ConnectionRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        authenticator: Arc<dyn Authenticator>,
        auth_timeouts: Arc<AuthTimeouts>,
        disconnect: Arc<DisconnectConnectionUseCase>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
            authenticator,
            auth_timeouts,
            disconnect,
        }
    }

    /// On success the connection carries the user and session ids and has
    /// been sent `auth_success`; on failure it has been closed with 4003.
    pub async fn execute(
        &self,
        connection_id: &ConnectionId,
        token: &str,
    ) -> Result<AuthContext, GatewayError> {
        let Some(context) = self.authenticator.validate_token(token).await else {
            tracing::warn!("Authentication failed for connection '{}'", connection_id);
            self.disconnect
                .terminate(
                    connection_id,
                    CloseCode::AuthenticationFailed,
                    "authentication failed",
                )
                .await;
            return Err(GatewayError::AuthenticationFailed);
        };

        self.repository
            .bind_identity(
                connection_id,
                context.user.id.clone(),
                context.session.id.clone(),
                context.user.display_name.clone(),
            )
            .await
            .map_err(|_| GatewayError::ConnectionGone)?;
        self.auth_timeouts.cancel(connection_id).await;

        let success = ServerMessage::AuthSuccess {
            user: context.user.profile(),
            session_id: context.session.id.to_string(),
        };
        match success.to_json() {
            Ok(json) => {
                if let Err(e) = self.message_pusher.push_to(connection_id, &json).await {
                    tracing::warn!("Failed to send auth_success to '{}': {}", connection_id, e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize auth_success: {}", e),
        }

        tracing::info!(
            "Connection '{}' authenticated as user '{}'",
            connection_id,
            context.user.id
        );
        Ok(context)
    }
}
