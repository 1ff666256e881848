//! Shared application state and its wiring.

use std::sync::Arc;

use tandem_shared::time::Clock;

use crate::{
    config::{GatewayConfig, IdentityConfig},
    domain::{ConnectionRepository, MessagePusher},
    infrastructure::{
        auth::{Argon2PasswordHasher, JwtTokenCodec},
        message_pusher::WebSocketMessagePusher,
        repository::{
            InMemoryConnectionRepository, InMemorySessionRepository, InMemoryUserRepository,
        },
    },
    usecase::{
        AcceptConnectionUseCase, AuthTimeouts, AuthenticateConnectionUseCase,
        BroadcastToRoomUseCase, DisconnectConnectionUseCase, DocumentVersions,
        HandleMessageUseCase, IdentityService, LivenessUseCase, QueryRoomsUseCase,
    },
};

/// Everything the handlers and background tasks reach through `State`
pub struct AppState {
    pub gateway_config: Arc<GatewayConfig>,
    pub identity: Arc<IdentityService>,
    pub accept_connection_usecase: Arc<AcceptConnectionUseCase>,
    pub handle_message_usecase: Arc<HandleMessageUseCase>,
    pub disconnect_connection_usecase: Arc<DisconnectConnectionUseCase>,
    pub liveness_usecase: Arc<LivenessUseCase>,
    pub query_rooms_usecase: Arc<QueryRoomsUseCase>,
}

impl AppState {
    /// Wire the gateway and identity service over in-memory stores
    pub fn in_memory(
        gateway_config: GatewayConfig,
        identity_config: IdentityConfig,
        password_hasher: Argon2PasswordHasher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // 1. Repositories and MessagePusher
        let users = Arc::new(InMemoryUserRepository::new());
        let sessions = Arc::new(InMemorySessionRepository::new());
        let connections: Arc<dyn ConnectionRepository> =
            Arc::new(InMemoryConnectionRepository::new());
        let message_pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new());

        // 2. Identity service
        let identity = Arc::new(IdentityService::new(
            users,
            sessions,
            Arc::new(JwtTokenCodec::new(&identity_config.jwt_secret)),
            Arc::new(password_hasher),
            clock.clone(),
            identity_config,
        ));

        // 3. Gateway use cases
        let gateway_config = Arc::new(gateway_config);
        let auth_timeouts = Arc::new(AuthTimeouts::new());
        let documents = Arc::new(DocumentVersions::new(
            gateway_config.conflict_strategy.clone(),
        ));
        let broadcast = Arc::new(BroadcastToRoomUseCase::new(
            connections.clone(),
            message_pusher.clone(),
        ));
        let disconnect = Arc::new(DisconnectConnectionUseCase::new(
            connections.clone(),
            message_pusher.clone(),
            auth_timeouts.clone(),
            broadcast.clone(),
        ));
        let authenticate = Arc::new(AuthenticateConnectionUseCase::new(
            connections.clone(),
            message_pusher.clone(),
            identity.clone(),
            auth_timeouts.clone(),
            disconnect.clone(),
        ));
        let accept = Arc::new(AcceptConnectionUseCase::new(
            gateway_config.clone(),
            connections.clone(),
            message_pusher.clone(),
            clock.clone(),
            auth_timeouts,
            disconnect.clone(),
        ));
        let handle_message = Arc::new(HandleMessageUseCase::new(
            gateway_config.clone(),
            connections.clone(),
            message_pusher.clone(),
            clock.clone(),
            authenticate,
            broadcast,
            documents.clone(),
        ));
        let liveness = Arc::new(LivenessUseCase::new(
            gateway_config.clone(),
            connections.clone(),
            message_pusher,
            clock,
            disconnect.clone(),
        ));
        let query_rooms = Arc::new(QueryRoomsUseCase::new(connections, documents));

        Self {
            gateway_config,
            identity,
            accept_connection_usecase: accept,
            handle_message_usecase: handle_message,
            disconnect_connection_usecase: disconnect,
            liveness_usecase: liveness,
            query_rooms_usecase: query_rooms,
        }
    }
}
