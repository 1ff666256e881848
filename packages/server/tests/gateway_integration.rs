//! Integration tests for the collaboration server.
//!
//! Each test starts a real server on `127.0.0.1:0` in-process and talks to it
//! over HTTP (`reqwest`) and WebSocket (`tokio-tungstenite`).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tandem_server::{
    config::{GatewayConfig, IdentityConfig},
    infrastructure::{
        auth::Argon2PasswordHasher,
        dto::http::{ErrorResponse, LoginRequest, LoginResponse, RegisterRequest, RoomSummaryDto},
    },
    ui::{AppState, Server},
};
use tandem_shared::{
    protocol::{ClientMessage, ErrorCode, ServerMessage},
    time::SystemClock,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper struct to manage an in-process server
struct TestServer {
    addr: SocketAddr,
    http: reqwest::Client,
}

impl TestServer {
    async fn start(gateway_config: GatewayConfig) -> Self {
        let state = AppState::in_memory(
            gateway_config,
            IdentityConfig {
                max_login_attempts: 3,
                ..Default::default()
            },
            Argon2PasswordHasher::fast(),
            Arc::new(SystemClock),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            Server::new(Arc::new(state))
                .serve(listener, std::future::pending())
                .await
                .unwrap();
        });

        TestServer {
            addr,
            http: reqwest::Client::new(),
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    fn api_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn register_and_login(&self, email: &str, display_name: &str) -> LoginResponse {
        let response = self
            .http
            .post(self.api_url("/api/auth/register"))
            .json(&RegisterRequest {
                email: email.to_string(),
                password: "password123".to_string(),
                display_name: display_name.to_string(),
                role: None,
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);

        self.http
            .post(self.api_url("/api/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: "password123".to_string(),
                device: Some("integration-test".to_string()),
            })
            .send()
            .await
            .unwrap()
            .json::<LoginResponse>()
            .await
            .unwrap()
    }

    /// Connect, consume `auth_required`, authenticate, consume `auth_success`
    async fn connect_as(&self, email: &str, display_name: &str) -> Ws {
        let login = self.register_and_login(email, display_name).await;
        let mut ws = self.connect().await;
        assert!(matches!(
            next_message(&mut ws).await,
            ServerMessage::AuthRequired { .. }
        ));
        send(&mut ws, &ClientMessage::Auth { token: login.token }).await;
        match next_message(&mut ws).await {
            ServerMessage::AuthSuccess { user, .. } => assert_eq!(user.display_name, display_name),
            other => panic!("expected auth_success, got {:?}", other),
        }
        ws
    }

    async fn connect(&self) -> Ws {
        let (ws, _) = connect_async(self.ws_url()).await.unwrap();
        ws
    }
}

async fn send(ws: &mut Ws, message: &ClientMessage) {
    ws.send(Message::Text(message.to_json().unwrap().into()))
        .await
        .unwrap();
}

async fn next_frame(ws: &mut Ws) -> Message {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
            return msg;
        }
    }
}

async fn next_message(ws: &mut Ws) -> ServerMessage {
    match next_frame(ws).await {
        Message::Text(text) => ServerMessage::parse(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

async fn expect_close_code(ws: &mut Ws, expected: u16) {
    match next_frame(ws).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), expected),
        other => panic!("expected a close frame, got {:?}", other),
    }
}

async fn assert_silent(ws: &mut Ws) {
    let result = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}

async fn join(ws: &mut Ws, room: &str) {
    send(
        ws,
        &ClientMessage::Join {
            room_id: room.to_string(),
        },
    )
    .await;
    assert!(matches!(
        next_message(ws).await,
        ServerMessage::RoomJoined { .. }
    ));
}

#[tokio::test]
async fn test_third_connection_from_same_ip_closed_with_4002() {
    // テスト項目: maxConnectionsPerIp = 2 のとき、同一 IP からの 3 本目の接続は 4002 でクローズされる
    // given (前提条件):
    let server = TestServer::start(GatewayConfig {
        max_connections_per_ip: 2,
        ..Default::default()
    })
    .await;
    let mut first = server.connect().await;
    let mut second = server.connect().await;
    next_message(&mut first).await;
    next_message(&mut second).await;

    // when (操作):
    let mut third = server.connect().await;

    // then (期待する結果):
    expect_close_code(&mut third, 4002).await;
}

#[tokio::test]
async fn test_broadcast_reaches_others_but_not_sender() {
    // テスト項目: ルームメンバーの broadcast は他のメンバー全員に届き、送信者には届かない
    // given (前提条件):
    let server = TestServer::start(GatewayConfig::default()).await;
    let mut alice = server.connect_as("alice@example.com", "Alice").await;
    let mut bob = server.connect_as("bob@example.com", "Bob").await;
    let mut carol = server.connect_as("carol@example.com", "Carol").await;
    for ws in [&mut alice, &mut bob, &mut carol] {
        join(ws, "doc-A").await;
    }

    // when (操作):
    send(
        &mut alice,
        &ClientMessage::Broadcast {
            room_id: "doc-A".to_string(),
            payload: serde_json::json!({"kind": "wave"}),
            include_self: false,
        },
    )
    .await;

    // then (期待する結果):
    for ws in [&mut bob, &mut carol] {
        match next_message(ws).await {
            ServerMessage::Broadcast { from, payload, .. } => {
                assert_eq!(from.display_name.as_deref(), Some("Alice"));
                assert_eq!(payload, serde_json::json!({"kind": "wave"}));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    // テスト項目: doc-A のみに参加している接続は doc-B 宛てのメッセージを受け取らない
    // given (前提条件):
    let server = TestServer::start(GatewayConfig::default()).await;
    let mut in_a = server.connect_as("a@example.com", "A").await;
    let mut in_b1 = server.connect_as("b1@example.com", "B1").await;
    let mut in_b2 = server.connect_as("b2@example.com", "B2").await;
    join(&mut in_a, "doc-A").await;
    join(&mut in_b1, "doc-B").await;
    join(&mut in_b2, "doc-B").await;

    // when (操作):
    send(
        &mut in_b1,
        &ClientMessage::Broadcast {
            room_id: "doc-B".to_string(),
            payload: serde_json::json!("only for doc-B"),
            include_self: false,
        },
    )
    .await;

    // then (期待する結果):
    assert!(matches!(
        next_message(&mut in_b2).await,
        ServerMessage::Broadcast { .. }
    ));
    assert_silent(&mut in_a).await;

    let rooms: Vec<RoomSummaryDto> = server
        .http
        .get(server.api_url("/api/rooms"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        rooms,
        vec![
            RoomSummaryDto {
                id: "doc-A".to_string(),
                member_count: 1
            },
            RoomSummaryDto {
                id: "doc-B".to_string(),
                member_count: 2
            },
        ]
    );
}

#[tokio::test]
async fn test_invalid_token_closed_with_4003() {
    // テスト項目: 無効なトークンで認証すると 4003 でクローズされる
    // given (前提条件):
    let server = TestServer::start(GatewayConfig::default()).await;
    let mut ws = server.connect().await;
    next_message(&mut ws).await;

    // when (操作):
    send(
        &mut ws,
        &ClientMessage::Auth {
            token: "not-a-token".to_string(),
        },
    )
    .await;

    // then (期待する結果):
    expect_close_code(&mut ws, 4003).await;
}

#[tokio::test]
async fn test_auth_timeout_closed_with_4003() {
    // テスト項目: 認証期限内に認証しない接続は 4003 でクローズされる
    // given (前提条件):
    let server = TestServer::start(GatewayConfig {
        auth_timeout: Duration::from_millis(200),
        ..Default::default()
    })
    .await;
    let mut ws = server.connect().await;

    // when (操作):
    let notice = next_message(&mut ws).await;

    // then (期待する結果):
    assert_eq!(notice, ServerMessage::AuthRequired { timeout_ms: 200 });
    expect_close_code(&mut ws, 4003).await;
}

#[tokio::test]
async fn test_logout_invalidates_token_for_new_connections() {
    // テスト項目: ログアウト後のトークンでは WebSocket 認証できない
    // given (前提条件):
    let server = TestServer::start(GatewayConfig::default()).await;
    let login = server
        .register_and_login("dave@example.com", "Dave")
        .await;
    let response = server
        .http
        .post(server.api_url("/api/auth/logout"))
        .bearer_auth(&login.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    // when (操作):
    let mut ws = server.connect().await;
    next_message(&mut ws).await;
    send(&mut ws, &ClientMessage::Auth { token: login.token }).await;

    // then (期待する結果):
    expect_close_code(&mut ws, 4003).await;
}

#[tokio::test]
async fn test_repeated_bad_logins_lock_the_account() {
    // テスト項目: 上限回数ログインに失敗すると、正しいパスワードでも 423 と retryAfterMs が返る
    // given (前提条件):
    let server = TestServer::start(GatewayConfig::default()).await;
    server.register_and_login("erin@example.com", "Erin").await;
    let login = |password: &str| {
        server
            .http
            .post(server.api_url("/api/auth/login"))
            .json(&LoginRequest {
                email: "erin@example.com".to_string(),
                password: password.to_string(),
                device: None,
            })
            .send()
    };
    for _ in 0..3 {
        let response = login("wrong-password").await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    // when (操作):
    let response = login("password123").await.unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), reqwest::StatusCode::LOCKED);
    let body: ErrorResponse = response.json().await.unwrap();
    assert!(body.retry_after_ms.is_some_and(|ms| ms > 0));
}

#[tokio::test]
async fn test_frames_past_transport_limit_end_the_connection() {
    // テスト項目: 上限を少し超えるフレームはエラーフレームで応答され、トランスポート上限を超えるフレームは接続ごと切断される
    // given (前提条件): maxMessageSize = 1024 (トランスポート上限 2048)
    let server = TestServer::start(GatewayConfig {
        max_message_size: 1024,
        ..Default::default()
    })
    .await;
    let mut ws = server.connect_as("frank@example.com", "Frank").await;
    let frame = |len: usize| {
        let room_id = "x".repeat(len);
        Message::Text(format!(r#"{{"type":"join","roomId":"{}"}}"#, room_id).into())
    };

    // when (操作):
    ws.send(frame(1200)).await.unwrap();
    let reply = next_message(&mut ws).await;
    ws.send(frame(16 * 1024)).await.unwrap();
    let after_huge = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => return other,
            }
        }
    })
    .await
    .expect("connection stayed open");

    // then (期待する結果):
    match reply {
        ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::MessageTooLarge),
        other => panic!("expected an error frame, got {:?}", other),
    }
    assert!(
        matches!(after_huge, None | Some(Err(_)) | Some(Ok(Message::Close(_)))),
        "unexpected frame: {:?}",
        after_huge
    );
}
