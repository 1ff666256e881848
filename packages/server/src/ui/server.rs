//! Server execution logic.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, post},
};
use tandem_shared::protocol::CloseCode;
use tokio::{net::TcpListener, task::JoinHandle, time::Instant};
use tower_http::trace::TraceLayer;

use super::{
    handler::{
        change_password, get_room_detail, get_rooms, health_check, list_sessions, login, logout,
        register, request_password_reset, reset_password, revoke_all_sessions, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Collaboration gateway and identity API
///
/// # Example
///
/// ```ignore
/// let state = AppState::in_memory(
///     GatewayConfig::default(),
///     IdentityConfig::default(),
///     Argon2PasswordHasher::new(),
///     Arc::new(SystemClock),
/// );
/// Server::new(Arc::new(state)).run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/rooms", get(get_rooms))
            .route("/api/rooms/{room_id}", get(get_room_detail))
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/sessions", get(list_sessions))
            .route("/api/auth/sessions/revoke-all", post(revoke_all_sessions))
            .route("/api/auth/password", post(change_password))
            .route("/api/auth/password-reset", post(request_password_reset))
            .route("/api/auth/password-reset/confirm", post(reset_password))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind `host:port` and serve until Ctrl+C / SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Collaboration server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves, then
    /// close every connection with 1001.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let tasks = self.spawn_background_tasks();

        let state = self.state.clone();
        let graceful = async move {
            shutdown.await;
            let closed = state
                .disconnect_connection_usecase
                .terminate_all(CloseCode::GoingAway, "server shutting down")
                .await;
            tracing::info!("Closed {} connection(s) for shutdown", closed);
        };

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(graceful)
        .await;

        for task in tasks {
            task.abort();
        }
        result
    }

    fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let ping_interval = self.state.gateway_config.ping_interval;
        let sweep_interval = self.state.identity.config().session_sweep_interval;

        let heartbeat = {
            let state = self.state.clone();
            every(ping_interval, move || {
                let state = state.clone();
                async move {
                    let report = state.liveness_usecase.heartbeat().await;
                    tracing::debug!(
                        "Heartbeat: {} terminated, {} pinged",
                        report.terminated,
                        report.pinged
                    );
                }
            })
        };

        let inactivity = {
            let state = self.state.clone();
            every(ping_interval, move || {
                let state = state.clone();
                async move {
                    state.liveness_usecase.sweep_inactive().await;
                }
            })
        };

        let sessions = {
            let state = self.state.clone();
            every(sweep_interval, move || {
                let state = state.clone();
                async move {
                    if let Err(e) = state.identity.sweep_expired().await {
                        tracing::warn!("Session sweep failed: {}", e);
                    }
                }
            })
        };

        vec![heartbeat, inactivity, sessions]
    }
}

/// Run `tick` every `period`, starting one period from now
fn every<F, Fut>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            interval.tick().await;
            tick().await;
        }
    })
}
