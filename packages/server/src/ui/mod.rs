//! Server UI layer: axum router, handlers, shared state, shutdown.

mod handler;
mod server;
mod signal;
pub mod state;

pub use server::Server;
pub use state::AppState;
