//! UseCase: one inbound text frame
//!
//! Checks run in this order, each answered with an `error` frame:
//!
//! 1. the connection's rate-limit bucket (`rate_limited`)
//! 2. size ceiling (`message_too_large`)
//! 3. JSON shape (`malformed_message`)
//! 4. authentication, except for `auth` itself (`auth_required`)
//!
//! Every frame spends a point, rejected ones included. Only a failed `auth`
//! closes the connection.

use std::sync::Arc;

use tandem_shared::{
    operation::Operation,
    protocol::{ClientMessage, PeerRef, ServerMessage},
    time::Clock,
};

use crate::{
    config::GatewayConfig,
    domain::{Connection, ConnectionId, ConnectionRepository, MessagePusher, RoomId},
};

use super::{
    authenticate_connection::AuthenticateConnectionUseCase,
    broadcast_to_room::BroadcastToRoomUseCase, document_versions::DocumentVersions,
    error::GatewayError,
};

pub struct HandleMessageUseCase {
    config: Arc<GatewayConfig>,
    repository: Arc<dyn ConnectionRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
    authenticate: Arc<AuthenticateConnectionUseCase>,
    broadcast: Arc<BroadcastToRoomUseCase>,
    documents: Arc<DocumentVersions>,
}

impl HandleMessageUseCase {
    pub fn new(
        config: Arc<GatewayConfig>,
        repository: Arc<dyn ConnectionRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
        authenticate: Arc<AuthenticateConnectionUseCase>,
        broadcast: Arc<BroadcastToRoomUseCase>,
        documents: Arc<DocumentVersions>,
    ) -> Self {
        Self {
            config,
            repository,
            message_pusher,
            clock,
            authenticate,
            broadcast,
            documents,
        }
    }

    /// Process one text frame. Errors have already been reported to the
    /// client (or the connection closed) when this returns `Err`.
    pub async fn execute(&self, connection_id: &ConnectionId, raw: &str) -> Result<(), GatewayError> {
        self.execute_bytes(connection_id, raw.as_bytes()).await
    }

    /// Same as [`execute`](Self::execute) for a binary frame, which must hold
    /// UTF-8 JSON
    pub async fn execute_bytes(
        &self,
        connection_id: &ConnectionId,
        raw: &[u8],
    ) -> Result<(), GatewayError> {
        let result = self.dispatch(connection_id, raw).await;
        if let Err(e) = &result {
            if e.close_code().is_none() && *e != GatewayError::ConnectionGone {
                self.report_error(connection_id, e).await;
            }
        }
        result
    }

    async fn dispatch(&self, connection_id: &ConnectionId, raw: &[u8]) -> Result<(), GatewayError> {
        let now = self.clock.now_millis();
        if !self.repository.touch(connection_id, now).await {
            return Err(GatewayError::ConnectionGone);
        }

        match self.repository.try_consume_rate_limit(connection_id, now).await {
            Some(Ok(())) => {}
            Some(Err(retry_after_ms)) => {
                tracing::debug!("Connection '{}' is rate limited", connection_id);
                return Err(GatewayError::RateLimitExceeded { retry_after_ms });
            }
            None => return Err(GatewayError::ConnectionGone),
        }

        if raw.len() > self.config.max_message_size {
            return Err(GatewayError::MessageTooLarge {
                size: raw.len(),
                max: self.config.max_message_size,
            });
        }

        let raw = std::str::from_utf8(raw)
            .map_err(|e| GatewayError::MalformedMessage(format!("frame is not UTF-8: {}", e)))?;
        let message =
            ClientMessage::parse(raw).map_err(|e| GatewayError::MalformedMessage(e.to_string()))?;
        if self.config.debug {
            tracing::debug!("Connection '{}' sent '{}'", connection_id, message.kind());
        }

        let connection = self
            .repository
            .get(connection_id)
            .await
            .ok_or(GatewayError::ConnectionGone)?;
        let is_auth = matches!(message, ClientMessage::Auth { .. });
        if self.config.require_auth && !is_auth && !connection.is_authenticated() {
            return Err(GatewayError::AuthenticationRequired);
        }
        // A bound identity is never swapped for another
        if is_auth && connection.is_authenticated() {
            return Err(GatewayError::AlreadyAuthenticated);
        }

        match message {
            ClientMessage::Auth { token } => {
                self.authenticate.execute(connection_id, &token).await?;
            }
            ClientMessage::Ping => {
                self.reply(connection_id, &ServerMessage::Pong { timestamp: now })
                    .await;
            }
            ClientMessage::Join { room_id } => {
                let room_id = parse_room_id(room_id)?;
                let member_count = self
                    .repository
                    .join_room(connection_id, room_id.clone())
                    .await
                    .map_err(|_| GatewayError::ConnectionGone)?;
                tracing::info!("Connection '{}' joined room '{}'", connection_id, room_id);
                self.reply(
                    connection_id,
                    &ServerMessage::RoomJoined {
                        room_id: room_id.to_string(),
                        member_count,
                    },
                )
                .await;
            }
            ClientMessage::Leave { room_id: Some(room_id) } => {
                let room_id = parse_room_id(room_id)?;
                let was_member = self
                    .repository
                    .leave_room(connection_id, &room_id)
                    .await
                    .map_err(|_| GatewayError::ConnectionGone)?;
                if was_member {
                    self.announce_departure(&connection.peer_ref(), &room_id).await;
                }
                self.reply(
                    connection_id,
                    &ServerMessage::LeftRoom {
                        room_id: room_id.to_string(),
                    },
                )
                .await;
            }
            ClientMessage::Leave { room_id: None } => {
                let rooms = self
                    .repository
                    .leave_all_rooms(connection_id)
                    .await
                    .map_err(|_| GatewayError::ConnectionGone)?;
                let from = connection.peer_ref();
                for room_id in &rooms {
                    self.announce_departure(&from, room_id).await;
                }
                self.reply(
                    connection_id,
                    &ServerMessage::LeftAllRooms {
                        room_ids: rooms.iter().map(ToString::to_string).collect(),
                    },
                )
                .await;
            }
            ClientMessage::Broadcast {
                room_id,
                payload,
                include_self,
            } => {
                let room_id = self.member_room(connection_id, room_id).await?;
                let message = ServerMessage::Broadcast {
                    room_id: room_id.to_string(),
                    from: connection.peer_ref(),
                    payload,
                };
                let exclude = (!include_self).then_some(connection_id);
                self.broadcast.send(&room_id, &message, exclude).await;
            }
            ClientMessage::Cursor {
                room_id,
                position,
                path,
            } => {
                let room_id = self.member_room(connection_id, room_id).await?;
                let message = ServerMessage::Cursor {
                    room_id: room_id.to_string(),
                    from: connection.peer_ref(),
                    position,
                    path,
                };
                self.broadcast
                    .send(&room_id, &message, Some(connection_id))
                    .await;
            }
            ClientMessage::Selection {
                room_id,
                range,
                path,
            } => {
                let room_id = self.member_room(connection_id, room_id).await?;
                let message = ServerMessage::Selection {
                    room_id: room_id.to_string(),
                    from: connection.peer_ref(),
                    range,
                    path,
                };
                self.broadcast
                    .send(&room_id, &message, Some(connection_id))
                    .await;
            }
            ClientMessage::Chat { room_id, message } => {
                let room_id = self.member_room(connection_id, room_id).await?;
                let message = ServerMessage::Chat {
                    room_id: room_id.to_string(),
                    from: connection.peer_ref(),
                    message,
                };
                self.broadcast
                    .send(&room_id, &message, Some(connection_id))
                    .await;
            }
            ClientMessage::Presence { room_id, update } => {
                let room_id = self.member_room(connection_id, room_id).await?;
                let message = ServerMessage::Presence {
                    room_id: room_id.to_string(),
                    from: connection.peer_ref(),
                    update,
                };
                self.broadcast
                    .send(&room_id, &message, Some(connection_id))
                    .await;
            }
            ClientMessage::Edit {
                room_id,
                path,
                changes,
            } => {
                let room_id = self.member_room(connection_id, room_id).await?;
                self.handle_edit(&connection, room_id, path, changes).await?;
            }
        }
        Ok(())
    }

    /// Accepted operations go to every member, sender included, so all of
    /// them apply the same (possibly merged or rebased) operation.
    async fn handle_edit(
        &self,
        connection: &Connection,
        room_id: RoomId,
        path: String,
        changes: Vec<Operation>,
    ) -> Result<(), GatewayError> {
        if changes.iter().any(|c| !c.has_consistent_versions()) {
            return Err(GatewayError::MalformedMessage(
                "targetVersion must equal baseVersion + 1".to_string(),
            ));
        }

        let (applied, rejection) = self.documents.apply(&room_id, changes).await;
        if !applied.is_empty() {
            let message = ServerMessage::Edit {
                room_id: room_id.to_string(),
                from: connection.peer_ref(),
                path,
                changes: applied,
            };
            self.broadcast.send(&room_id, &message, None).await;
        }
        match rejection {
            Some(e) => Err(GatewayError::Conflict(e)),
            None => Ok(()),
        }
    }

    async fn member_room(
        &self,
        connection_id: &ConnectionId,
        room_id: String,
    ) -> Result<RoomId, GatewayError> {
        let room_id = parse_room_id(room_id)?;
        if !self.repository.is_member(connection_id, &room_id).await {
            return Err(GatewayError::NotInRoom(room_id.to_string()));
        }
        Ok(room_id)
    }

    async fn announce_departure(&self, from: &PeerRef, room_id: &RoomId) {
        let message = ServerMessage::UserLeft {
            room_id: room_id.to_string(),
            from: from.clone(),
        };
        self.broadcast.send(room_id, &message, None).await;
    }

    async fn reply(&self, connection_id: &ConnectionId, message: &ServerMessage) {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize reply: {}", e);
                return;
            }
        };
        if let Err(e) = self.message_pusher.push_to(connection_id, &json).await {
            tracing::warn!("Failed to reply to connection '{}': {}", connection_id, e);
        }
    }

    async fn report_error(&self, connection_id: &ConnectionId, error: &GatewayError) {
        tracing::debug!("Error for connection '{}': {}", connection_id, error);
        let (retry_after_ms, current_version) = match error {
            GatewayError::RateLimitExceeded { retry_after_ms } => (Some(*retry_after_ms), None),
            GatewayError::Conflict(e) => (None, Some(e.current_version())),
            _ => (None, None),
        };
        let message = ServerMessage::Error {
            code: error.error_code(),
            message: error.to_string(),
            retry_after_ms,
            current_version,
        };
        self.reply(connection_id, &message).await;
    }
}

fn parse_room_id(room_id: String) -> Result<RoomId, GatewayError> {
    RoomId::new(room_id).map_err(|e| GatewayError::MalformedMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            AuthContext, ConflictStrategy, Email, OutboundFrame, Session, SessionMetadata,
            TokenBucket, User, auth::MockAuthenticator,
        },
        infrastructure::{
            message_pusher::WebSocketMessagePusher, repository::InMemoryConnectionRepository,
        },
        usecase::{auth_timeout::AuthTimeouts, disconnect_connection::DisconnectConnectionUseCase},
    };
    use std::net::{IpAddr, Ipv4Addr};
    use tandem_shared::{
        protocol::{CloseCode, ErrorCode, UserRole},
        time::ManualClock,
    };
    use tokio::sync::mpsc;

    // ========================================
    // 【何をテストするか】
    // - 受信フレームのチェック順（レート制限 → サイズ → 形式 → 認証）
    // - ルーム参加・退出と ack
    // - ブロードキャストの配信先（送信者除外、ルーム分離）
    // - edit のバージョン管理とエラーフレーム
    // ========================================

    struct Fixture {
        repository: Arc<InMemoryConnectionRepository>,
        pusher: Arc<WebSocketMessagePusher>,
        clock: Arc<ManualClock>,
        usecase: HandleMessageUseCase,
    }

    fn create_fixture(config: GatewayConfig, authenticator: MockAuthenticator) -> Fixture {
        let config = Arc::new(config);
        let repository = Arc::new(InMemoryConnectionRepository::new());
        let pusher = Arc::new(WebSocketMessagePusher::new());
        let clock = Arc::new(ManualClock::new(0));
        let auth_timeouts = Arc::new(AuthTimeouts::new());
        let broadcast = Arc::new(BroadcastToRoomUseCase::new(
            repository.clone(),
            pusher.clone(),
        ));
        let disconnect = Arc::new(DisconnectConnectionUseCase::new(
            repository.clone(),
            pusher.clone(),
            auth_timeouts.clone(),
            broadcast.clone(),
        ));
        let authenticate = Arc::new(AuthenticateConnectionUseCase::new(
            repository.clone(),
            pusher.clone(),
            Arc::new(authenticator),
            auth_timeouts,
            disconnect,
        ));
        let documents = Arc::new(DocumentVersions::new(config.conflict_strategy.clone()));
        let usecase = HandleMessageUseCase::new(
            config,
            repository.clone(),
            pusher.clone(),
            clock.clone(),
            authenticate,
            broadcast,
            documents,
        );
        Fixture {
            repository,
            pusher,
            clock,
            usecase,
        }
    }

    fn default_fixture() -> Fixture {
        create_fixture(GatewayConfig::default(), MockAuthenticator::new())
    }

    /// Registered connection, already authenticated as `user` when given
    async fn connect(
        fixture: &Fixture,
        id: &str,
        user: Option<&str>,
    ) -> mpsc::UnboundedReceiver<OutboundFrame> {
        let id = ConnectionId::from(id);
        let conn = Connection::new(
            id.clone(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            TokenBucket::new(5, 1_000, 0),
            0,
        );
        fixture.repository.register(conn, 100).await.unwrap();
        if let Some(user) = user {
            fixture
                .repository
                .bind_identity(
                    &id,
                    user.into(),
                    format!("session-{}", user).into(),
                    user.to_string(),
                )
                .await
                .unwrap();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        fixture.pusher.register_client(id, tx).await;
        rx
    }

    async fn send(fixture: &Fixture, id: &str, message: &ClientMessage) -> Result<(), GatewayError> {
        fixture
            .usecase
            .execute(&ConnectionId::from(id), &message.to_json().unwrap())
            .await
    }

    async fn join(fixture: &Fixture, id: &str, room: &str) {
        send(
            fixture,
            id,
            &ClientMessage::Join {
                room_id: room.to_string(),
            },
        )
        .await
        .unwrap();
    }

    fn next_message(rx: &mut mpsc::UnboundedReceiver<OutboundFrame>) -> ServerMessage {
        match rx.try_recv() {
            Ok(OutboundFrame::Text(json)) => ServerMessage::parse(&json).unwrap(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    fn expect_error(rx: &mut mpsc::UnboundedReceiver<OutboundFrame>, expected: ErrorCode) {
        match next_message(rx) {
            ServerMessage::Error { code, .. } => assert_eq!(code, expected),
            other => panic!("expected an error frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping_replies_pong() {
        // テスト項目: ping に対して現在時刻付きの pong が返る
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx = connect(&fixture, "c1", Some("alice")).await;
        fixture.clock.set(42_000);

        // when (操作):
        send(&fixture, "c1", &ClientMessage::Ping).await.unwrap();

        // then (期待する結果):
        assert_eq!(next_message(&mut rx), ServerMessage::Pong { timestamp: 42_000 });
    }

    #[tokio::test]
    async fn test_unauthenticated_message_gets_error_frame() {
        // テスト項目: 未認証の接続からの auth 以外のメッセージは auth_required エラーになり、接続は維持される
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx = connect(&fixture, "c1", None).await;

        // when (操作):
        let result = send(&fixture, "c1", &ClientMessage::Ping).await;

        // then (期待する結果):
        assert_eq!(result, Err(GatewayError::AuthenticationRequired));
        expect_error(&mut rx, ErrorCode::AuthRequired);
        assert!(fixture.repository.get(&ConnectionId::from("c1")).await.is_some());
    }

    #[tokio::test]
    async fn test_auth_not_required_when_disabled() {
        // テスト項目: requireAuth = false なら未認証でもメッセージを処理する
        // given (前提条件):
        let fixture = create_fixture(
            GatewayConfig {
                require_auth: false,
                ..Default::default()
            },
            MockAuthenticator::new(),
        );
        let mut rx = connect(&fixture, "c1", None).await;

        // when (操作):
        let result = send(&fixture, "c1", &ClientMessage::Ping).await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert!(matches!(next_message(&mut rx), ServerMessage::Pong { .. }));
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected() {
        // テスト項目: 最大サイズを超えるフレームは message_too_large エラーになる
        // given (前提条件):
        let fixture = create_fixture(
            GatewayConfig {
                max_message_size: 16,
                ..Default::default()
            },
            MockAuthenticator::new(),
        );
        let mut rx = connect(&fixture, "c1", Some("alice")).await;

        // when (操作):
        let raw = format!(r#"{{"type":"join","roomId":"{}"}}"#, "x".repeat(32));
        let result = fixture
            .usecase
            .execute(&ConnectionId::from("c1"), &raw)
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(GatewayError::MessageTooLarge { max: 16, .. })));
        expect_error(&mut rx, ErrorCode::MessageTooLarge);
    }

    #[tokio::test]
    async fn test_malformed_message_is_rejected() {
        // テスト項目: 解釈できないフレームは malformed_message エラーになる
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx = connect(&fixture, "c1", Some("alice")).await;

        // when (操作):
        let result = fixture
            .usecase
            .execute(&ConnectionId::from("c1"), r#"{"type":"teleport"}"#)
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(GatewayError::MalformedMessage(_))));
        expect_error(&mut rx, ErrorCode::MalformedMessage);
    }

    #[tokio::test]
    async fn test_invalid_utf8_binary_frame_is_rejected() {
        // テスト項目: UTF-8 として不正なバイナリフレームは置換文字で読み替えずに malformed_message になる
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx = connect(&fixture, "c1", Some("alice")).await;

        // when (操作):
        let mut raw = br#"{"type":"ping"}"#.to_vec();
        raw.push(0xff);
        let result = fixture
            .usecase
            .execute_bytes(&ConnectionId::from("c1"), &raw)
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(GatewayError::MalformedMessage(_))));
        expect_error(&mut rx, ErrorCode::MalformedMessage);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_and_window_reset() {
        // テスト項目: バケットを使い切ると rate_limited エラー（retryAfterMs 付き）になり、ウィンドウ経過後に回復する
        // given (前提条件): 1 秒あたり 5 メッセージ
        let fixture = default_fixture();
        let mut rx = connect(&fixture, "c1", Some("alice")).await;
        for _ in 0..5 {
            send(&fixture, "c1", &ClientMessage::Ping).await.unwrap();
            next_message(&mut rx);
        }

        // when (操作):
        fixture.clock.advance(400);
        let limited = send(&fixture, "c1", &ClientMessage::Ping).await;

        // then (期待する結果):
        assert_eq!(
            limited,
            Err(GatewayError::RateLimitExceeded {
                retry_after_ms: 600
            })
        );
        match next_message(&mut rx) {
            ServerMessage::Error {
                code,
                retry_after_ms,
                ..
            } => {
                assert_eq!(code, ErrorCode::RateLimited);
                assert_eq!(retry_after_ms, Some(600));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        fixture.clock.advance(600);
        assert!(send(&fixture, "c1", &ClientMessage::Ping).await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_flood_is_rate_limited() {
        // テスト項目: 解釈できないフレームもバケットを消費し、使い切ると rate_limited になる
        // given (前提条件): 1 秒あたり 5 メッセージ
        let fixture = default_fixture();
        let mut rx = connect(&fixture, "c1", Some("alice")).await;
        let id = ConnectionId::from("c1");

        // when (操作):
        let mut results = Vec::new();
        for _ in 0..8 {
            results.push(fixture.usecase.execute(&id, "{not json").await);
        }

        // then (期待する結果):
        for result in &results[..5] {
            assert!(matches!(result, Err(GatewayError::MalformedMessage(_))));
        }
        for result in &results[5..] {
            assert!(matches!(result, Err(GatewayError::RateLimitExceeded { .. })));
        }
        for _ in 0..5 {
            expect_error(&mut rx, ErrorCode::MalformedMessage);
        }
        expect_error(&mut rx, ErrorCode::RateLimited);
        assert_eq!(
            send(&fixture, "c1", &ClientMessage::Ping).await,
            Err(GatewayError::RateLimitExceeded {
                retry_after_ms: 1_000
            })
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_and_oversized_frames_spend_the_bucket() {
        // テスト項目: 未認証・サイズ超過のフレームもレート制限の対象になる
        // given (前提条件):
        let fixture = create_fixture(
            GatewayConfig {
                max_message_size: 16,
                ..Default::default()
            },
            MockAuthenticator::new(),
        );
        let mut rx = connect(&fixture, "c1", None).await;
        let id = ConnectionId::from("c1");
        let oversized = format!(r#"{{"type":"join","roomId":"{}"}}"#, "x".repeat(32));

        // when (操作):
        for _ in 0..3 {
            let _ = send(&fixture, "c1", &ClientMessage::Ping).await;
            let _ = fixture.usecase.execute(&id, &oversized).await;
        }

        // then (期待する結果): 6 回目は上限（5）を超えている
        for expected in [
            ErrorCode::AuthRequired,
            ErrorCode::MessageTooLarge,
            ErrorCode::AuthRequired,
            ErrorCode::MessageTooLarge,
            ErrorCode::AuthRequired,
            ErrorCode::RateLimited,
        ] {
            expect_error(&mut rx, expected);
        }
    }

    #[tokio::test]
    async fn test_second_auth_does_not_rebind_identity() {
        // テスト項目: 認証済みの接続からの 2 回目の auth は拒否され、別ユーザーに切り替わらない
        // given (前提条件):
        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_validate_token().never();
        let fixture = create_fixture(GatewayConfig::default(), authenticator);
        let mut rx = connect(&fixture, "c1", Some("alice")).await;

        // when (操作):
        let result = send(
            &fixture,
            "c1",
            &ClientMessage::Auth {
                token: "mallory-token".to_string(),
            },
        )
        .await;

        // then (期待する結果):
        assert_eq!(result, Err(GatewayError::AlreadyAuthenticated));
        expect_error(&mut rx, ErrorCode::AlreadyAuthenticated);
        let connection = fixture
            .repository
            .get(&ConnectionId::from("c1"))
            .await
            .unwrap();
        assert_eq!(connection.peer_ref().user_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_join_acks_with_member_count() {
        // テスト項目: join に対して room_joined（メンバー数付き）が返る
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx1 = connect(&fixture, "c1", Some("alice")).await;
        let mut rx2 = connect(&fixture, "c2", Some("bob")).await;

        // when (操作):
        join(&fixture, "c1", "doc-A").await;
        join(&fixture, "c2", "doc-A").await;

        // then (期待する結果):
        assert_eq!(
            next_message(&mut rx1),
            ServerMessage::RoomJoined {
                room_id: "doc-A".to_string(),
                member_count: 1
            }
        );
        assert_eq!(
            next_message(&mut rx2),
            ServerMessage::RoomJoined {
                room_id: "doc-A".to_string(),
                member_count: 2
            }
        );
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender_by_default() {
        // テスト項目: ルームメンバーの broadcast は他のメンバー全員に届き、送信者には届かない
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx1 = connect(&fixture, "c1", Some("alice")).await;
        let mut rx2 = connect(&fixture, "c2", Some("bob")).await;
        let mut rx3 = connect(&fixture, "c3", Some("carol")).await;
        for (id, rx) in [("c1", &mut rx1), ("c2", &mut rx2), ("c3", &mut rx3)] {
            join(&fixture, id, "doc-A").await;
            next_message(rx);
        }

        // when (操作):
        send(
            &fixture,
            "c1",
            &ClientMessage::Broadcast {
                room_id: "doc-A".to_string(),
                payload: serde_json::json!({"hello": "world"}),
                include_self: false,
            },
        )
        .await
        .unwrap();

        // then (期待する結果):
        assert!(rx1.try_recv().is_err());
        for rx in [&mut rx2, &mut rx3] {
            match next_message(rx) {
                ServerMessage::Broadcast { from, payload, .. } => {
                    assert_eq!(from.user_id.as_deref(), Some("alice"));
                    assert_eq!(payload, serde_json::json!({"hello": "world"}));
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_include_self() {
        // テスト項目: includeSelf = true の broadcast は送信者にも届く
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx1 = connect(&fixture, "c1", Some("alice")).await;
        join(&fixture, "c1", "doc-A").await;
        next_message(&mut rx1);

        // when (操作):
        send(
            &fixture,
            "c1",
            &ClientMessage::Broadcast {
                room_id: "doc-A".to_string(),
                payload: serde_json::json!(1),
                include_self: true,
            },
        )
        .await
        .unwrap();

        // then (期待する結果):
        assert!(matches!(next_message(&mut rx1), ServerMessage::Broadcast { .. }));
    }

    #[tokio::test]
    async fn test_room_isolation() {
        // テスト項目: doc-A のみに参加している接続は doc-B へのメッセージを受け取らない
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx_a = connect(&fixture, "a", Some("alice")).await;
        let mut rx_b1 = connect(&fixture, "b1", Some("bob")).await;
        let mut rx_b2 = connect(&fixture, "b2", Some("carol")).await;
        join(&fixture, "a", "doc-A").await;
        join(&fixture, "b1", "doc-B").await;
        join(&fixture, "b2", "doc-B").await;
        next_message(&mut rx_a);
        next_message(&mut rx_b1);
        next_message(&mut rx_b2);

        // when (操作):
        send(
            &fixture,
            "b1",
            &ClientMessage::Cursor {
                room_id: "doc-B".to_string(),
                position: tandem_shared::protocol::CursorPosition { line: 3, column: 7 },
                path: "src/main.rs".to_string(),
            },
        )
        .await
        .unwrap();

        // then (期待する結果):
        assert!(rx_a.try_recv().is_err());
        assert!(matches!(next_message(&mut rx_b2), ServerMessage::Cursor { .. }));
    }

    #[tokio::test]
    async fn test_message_to_room_not_joined_is_rejected() {
        // テスト項目: 参加していないルームへの送信は not_in_room エラーになる
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx = connect(&fixture, "c1", Some("alice")).await;

        // when (操作):
        let result = send(
            &fixture,
            "c1",
            &ClientMessage::Broadcast {
                room_id: "doc-A".to_string(),
                payload: serde_json::Value::Null,
                include_self: false,
            },
        )
        .await;

        // then (期待する結果):
        assert_eq!(result, Err(GatewayError::NotInRoom("doc-A".to_string())));
        expect_error(&mut rx, ErrorCode::NotInRoom);
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining_members() {
        // テスト項目: leave で left_room の ack が返り、残りのメンバーに user_left が通知される
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx1 = connect(&fixture, "c1", Some("alice")).await;
        let mut rx2 = connect(&fixture, "c2", Some("bob")).await;
        join(&fixture, "c1", "doc-A").await;
        join(&fixture, "c2", "doc-A").await;
        next_message(&mut rx1);
        next_message(&mut rx2);

        // when (操作):
        send(
            &fixture,
            "c1",
            &ClientMessage::Leave {
                room_id: Some("doc-A".to_string()),
            },
        )
        .await
        .unwrap();

        // then (期待する結果):
        assert_eq!(
            next_message(&mut rx1),
            ServerMessage::LeftRoom {
                room_id: "doc-A".to_string()
            }
        );
        match next_message(&mut rx2) {
            ServerMessage::UserLeft { room_id, from } => {
                assert_eq!(room_id, "doc-A");
                assert_eq!(from.user_id.as_deref(), Some("alice"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_leave_all_rooms() {
        // テスト項目: roomId なしの leave で全ルームから退出し、left_all_rooms が返る
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx = connect(&fixture, "c1", Some("alice")).await;
        join(&fixture, "c1", "doc-B").await;
        join(&fixture, "c1", "doc-A").await;
        next_message(&mut rx);
        next_message(&mut rx);

        // when (操作):
        send(&fixture, "c1", &ClientMessage::Leave { room_id: None })
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(
            next_message(&mut rx),
            ServerMessage::LeftAllRooms {
                room_ids: vec!["doc-A".to_string(), "doc-B".to_string()]
            }
        );
        assert!(fixture.repository.list_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn test_edit_is_broadcast_to_all_members_including_sender() {
        // テスト項目: 受理された edit は送信者を含むルーム全員に適用済みの操作として配信される
        // given (前提条件):
        let fixture = default_fixture();
        let mut rx1 = connect(&fixture, "c1", Some("alice")).await;
        let mut rx2 = connect(&fixture, "c2", Some("bob")).await;
        join(&fixture, "c1", "doc-A").await;
        join(&fixture, "c2", "doc-A").await;
        next_message(&mut rx1);
        next_message(&mut rx2);

        // when (操作):
        let op = Operation::insert(0, "hello", "alice", 0, 1_000);
        send(
            &fixture,
            "c1",
            &ClientMessage::Edit {
                room_id: "doc-A".to_string(),
                path: "README.md".to_string(),
                changes: vec![op.clone()],
            },
        )
        .await
        .unwrap();

        // then (期待する結果):
        for rx in [&mut rx1, &mut rx2] {
            match next_message(rx) {
                ServerMessage::Edit { changes, path, .. } => {
                    assert_eq!(path, "README.md");
                    assert_eq!(changes, vec![op.clone()]);
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_stale_edit_gets_error_with_current_version() {
        // テスト項目: 古いバージョンに基づく edit は stale_version エラー（現在のバージョン付き）になる
        // given (前提条件): バージョン 2 まで進んだドキュメント
        let fixture = default_fixture();
        let mut rx = connect(&fixture, "c1", Some("alice")).await;
        join(&fixture, "c1", "doc-A").await;
        next_message(&mut rx);
        for base in 0..2 {
            send(
                &fixture,
                "c1",
                &ClientMessage::Edit {
                    room_id: "doc-A".to_string(),
                    path: "a.txt".to_string(),
                    changes: vec![Operation::insert(0, "x", "alice", base, 1_000 + base as i64)],
                },
            )
            .await
            .unwrap();
            next_message(&mut rx);
        }

        // when (操作):
        let result = send(
            &fixture,
            "c1",
            &ClientMessage::Edit {
                room_id: "doc-A".to_string(),
                path: "a.txt".to_string(),
                changes: vec![Operation::insert(0, "late", "bob", 0, 5_000)],
            },
        )
        .await;

        // then (期待する結果):
        assert!(matches!(result, Err(GatewayError::Conflict(_))));
        match next_message(&mut rx) {
            ServerMessage::Error {
                code,
                current_version,
                ..
            } => {
                assert_eq!(code, ErrorCode::StaleVersion);
                assert_eq!(current_version, Some(2));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_edits_resolved_by_last_write_wins() {
        // テスト項目: 同じベースバージョンへの 2 つの edit は LWW で解決され、後の書き込みが適用される
        // given (前提条件):
        let fixture = create_fixture(
            GatewayConfig {
                conflict_strategy: ConflictStrategy::LastWriteWins,
                ..Default::default()
            },
            MockAuthenticator::new(),
        );
        let mut rx1 = connect(&fixture, "c1", Some("alice")).await;
        let mut rx2 = connect(&fixture, "c2", Some("bob")).await;
        join(&fixture, "c1", "doc-A").await;
        join(&fixture, "c2", "doc-A").await;
        next_message(&mut rx1);
        next_message(&mut rx2);
        let first = Operation::insert(0, "A", "alice", 0, 1_000);
        let second = Operation::insert(0, "B", "bob", 0, 2_000);

        // when (操作):
        for (id, op) in [("c1", &first), ("c2", &second)] {
            send(
                &fixture,
                id,
                &ClientMessage::Edit {
                    room_id: "doc-A".to_string(),
                    path: "a.txt".to_string(),
                    changes: vec![op.clone()],
                },
            )
            .await
            .unwrap();
        }

        // then (期待する結果):
        next_message(&mut rx1);
        match next_message(&mut rx1) {
            ServerMessage::Edit { changes, .. } => {
                assert_eq!(changes[0].text.as_deref(), Some("B"));
                assert_eq!(changes[0].base_version, 1);
                assert_eq!(changes[0].target_version, 2);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_message_binds_identity() {
        // テスト項目: auth メッセージで認証が行われ、以降のメッセージが受け付けられる
        // given (前提条件):
        let user = User::new(
            "Alice".to_string(),
            Email::new("alice@example.com").unwrap(),
            UserRole::User,
            "hash".to_string(),
            0,
        );
        let session = Session::new(user.id.clone(), SessionMetadata::default(), 0, 60_000);
        let context = AuthContext { user, session };
        let mut authenticator = MockAuthenticator::new();
        authenticator
            .expect_validate_token()
            .returning(move |_| Some(context.clone()));
        let fixture = create_fixture(GatewayConfig::default(), authenticator);
        let mut rx = connect(&fixture, "c1", None).await;

        // when (操作):
        send(
            &fixture,
            "c1",
            &ClientMessage::Auth {
                token: "token".to_string(),
            },
        )
        .await
        .unwrap();
        let ping = send(&fixture, "c1", &ClientMessage::Ping).await;

        // then (期待する結果):
        assert!(matches!(next_message(&mut rx), ServerMessage::AuthSuccess { .. }));
        assert!(ping.is_ok());
    }

    #[tokio::test]
    async fn test_failed_auth_message_closes_without_error_frame() {
        // テスト項目: 認証失敗時はエラーフレームではなく 4003 のクローズフレームが送られる
        // given (前提条件):
        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_validate_token().returning(|_| None);
        let fixture = create_fixture(GatewayConfig::default(), authenticator);
        let mut rx = connect(&fixture, "c1", None).await;

        // when (操作):
        let result = send(
            &fixture,
            "c1",
            &ClientMessage::Auth {
                token: "forged".to_string(),
            },
        )
        .await;

        // then (期待する結果):
        assert_eq!(result, Err(GatewayError::AuthenticationFailed));
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundFrame::close(CloseCode::AuthenticationFailed, "authentication failed")
        );
        assert!(rx.try_recv().is_err());
    }
}
