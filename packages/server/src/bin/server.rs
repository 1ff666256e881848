//! Real-time collaboration server.
//!
//! Authenticated WebSocket rooms with cursor, selection, chat, presence, and
//! versioned edits, plus the HTTP identity API.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tandem-server
//! cargo run --bin tandem-server -- --host 0.0.0.0 --port 3000 --max-connections-per-ip 4
//! ```
//!
//! Every option can also be set through its `TANDEM_*` environment variable or
//! a `.env` file.

use std::{sync::Arc, time::Duration};

use clap::Parser;
use tandem_server::{
    config::{GatewayConfig, IdentityConfig},
    infrastructure::auth::Argon2PasswordHasher,
    ui::{AppState, Server},
};
use tandem_shared::{logger::setup_logger, time::SystemClock};

#[derive(Parser, Debug)]
#[command(name = "tandem-server")]
#[command(about = "Real-time collaboration gateway and identity service", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "TANDEM_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "TANDEM_PORT", default_value = "8080")]
    port: u16,

    /// Largest accepted frame in bytes
    #[arg(long, env = "TANDEM_MAX_MESSAGE_SIZE", default_value = "1048576")]
    max_message_size: usize,

    /// Heartbeat interval in milliseconds
    #[arg(long, env = "TANDEM_PING_INTERVAL_MS", default_value = "30000")]
    ping_interval_ms: u64,

    /// Seconds an unauthenticated connection may stay open
    #[arg(long, env = "TANDEM_AUTH_TIMEOUT_SECONDS", default_value = "10")]
    auth_timeout_seconds: u64,

    #[arg(long, env = "TANDEM_MAX_CONNECTIONS_PER_IP", default_value = "10")]
    max_connections_per_ip: usize,

    #[arg(long, env = "TANDEM_MAX_MESSAGES_PER_SECOND", default_value = "100")]
    max_messages_per_second: u32,

    /// Accept room traffic from unauthenticated connections
    #[arg(long, env = "TANDEM_NO_AUTH")]
    no_auth: bool,

    /// Comma-separated allow-list; `*` allows every origin
    #[arg(
        long,
        env = "TANDEM_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "*"
    )]
    allowed_origins: Vec<String>,

    /// Verbose logging of every frame
    #[arg(long, env = "TANDEM_DEBUG")]
    debug: bool,

    #[arg(long, env = "TANDEM_TOKEN_EXPIRATION_SECONDS", default_value = "3600")]
    token_expiration_seconds: u64,

    #[arg(long, env = "TANDEM_SESSION_EXPIRATION_SECONDS", default_value = "604800")]
    session_expiration_seconds: u64,

    #[arg(long, env = "TANDEM_REQUIRE_EMAIL_VERIFICATION")]
    require_email_verification: bool,

    #[arg(long, env = "TANDEM_MAX_LOGIN_ATTEMPTS", default_value = "5")]
    max_login_attempts: u32,

    #[arg(long, env = "TANDEM_LOCKOUT_MINUTES", default_value = "15")]
    lockout_minutes: u64,

    /// Turn off failed-login counting and lockout
    #[arg(long, env = "TANDEM_DISABLE_LOGIN_RATE_LIMITING")]
    disable_login_rate_limiting: bool,

    /// HMAC secret for bearer tokens
    #[arg(long, env = "TANDEM_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

impl Args {
    fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_message_size: self.max_message_size,
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            auth_timeout: Duration::from_secs(self.auth_timeout_seconds),
            max_connections_per_ip: self.max_connections_per_ip,
            max_messages_per_second: self.max_messages_per_second,
            require_auth: !self.no_auth,
            allowed_origins: self.allowed_origins.clone(),
            debug: self.debug,
            ..Default::default()
        }
    }

    fn identity_config(&self) -> IdentityConfig {
        let defaults = IdentityConfig::default();
        IdentityConfig {
            token_expiration: Duration::from_secs(self.token_expiration_seconds),
            session_expiration: Duration::from_secs(self.session_expiration_seconds),
            require_email_verification: self.require_email_verification,
            max_login_attempts: self.max_login_attempts,
            lockout: Duration::from_secs(self.lockout_minutes * 60),
            enable_rate_limiting: !self.disable_login_rate_limiting,
            jwt_secret: self.jwt_secret.clone().unwrap_or(defaults.jwt_secret),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // Initialize tracing
    let default_level = if args.debug { "debug" } else { "info" };
    setup_logger(env!("CARGO_BIN_NAME"), default_level);

    if args.jwt_secret.is_none() {
        tracing::warn!("TANDEM_JWT_SECRET is not set; using the development secret");
    }

    let state = AppState::in_memory(
        args.gateway_config(),
        args.identity_config(),
        Argon2PasswordHasher::new(),
        Arc::new(SystemClock),
    );

    let server = Server::new(Arc::new(state));
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
