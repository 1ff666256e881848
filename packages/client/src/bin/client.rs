//! Collaborative chat client with reconnection support.
//!
//! Logs in over HTTP, joins a room through the gateway, and sends every
//! stdin line as a `chat` message. Reconnects with exponential backoff
//! (1 s doubling up to 30 s, 5 attempts by default); origin, IP-limit, and
//! authentication rejections are not retried.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tandem-client -- --email alice@example.com --password secret123 --room doc-1
//! cargo run --bin tandem-client -- -e bob@example.com -P secret123 --register Bob
//! ```

use std::time::Duration;

use clap::Parser;
use tandem_client::{
    ReconnectPolicy,
    ui::{ChatOptions, run_chat_client},
};
use tandem_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "tandem-client")]
#[command(about = "Collaborative room chat client with reconnect support", long_about = None)]
struct Args {
    /// Gateway WebSocket URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Server root for the HTTP identity API
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    api_url: String,

    #[arg(short = 'e', long)]
    email: String,

    #[arg(short = 'P', long, env = "TANDEM_PASSWORD", hide_env_values = true)]
    password: String,

    /// Register with this display name before logging in
    #[arg(long, value_name = "DISPLAY_NAME")]
    register: Option<String>,

    /// Room (document) to join
    #[arg(short = 'r', long, default_value = "lobby")]
    room: String,

    /// Delay before the first reconnect attempt
    #[arg(long, default_value = "1000")]
    reconnect_base_ms: u64,

    #[arg(long, default_value = "30000")]
    reconnect_max_ms: u64,

    #[arg(long, default_value = "5")]
    reconnect_attempts: u32,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let options = ChatOptions {
        api_url: args.api_url,
        url: args.url,
        email: args.email,
        password: args.password,
        register: args.register,
        room_id: args.room,
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(args.reconnect_base_ms),
            max_delay: Duration::from_millis(args.reconnect_max_ms),
            max_attempts: args.reconnect_attempts,
        },
    };

    // Run the client
    if let Err(e) = run_chat_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
