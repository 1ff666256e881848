//! Client execution logic with reconnection support.

use std::sync::Arc;

use crate::{
    domain::{backoff_delay, should_attempt_reconnect, should_exit_immediately},
    error::ClientError,
    orchestrator::{ClientInner, ConnectionStatus},
    session::{run_session, shutdown_requested},
};

/// Run sessions until the user disconnects, the gateway rejects the client
/// for good, or the reconnect budget is spent.
pub(crate) async fn run_with_reconnect(inner: Arc<ClientInner>) -> Result<(), ClientError> {
    let policy = inner.config.reconnect;
    let mut shutdown = inner.shutdown.subscribe();
    let mut attempt = 0;

    loop {
        inner.set_status(if attempt == 0 {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Reconnecting { attempt }
        });
        tracing::info!(
            "Attempting to connect to {} (attempt {}/{})",
            inner.config.url,
            attempt + 1,
            policy.max_attempts + 1
        );

        let end = run_session(&inner).await;
        if end.established {
            // A session the gateway accepted earns a fresh budget
            attempt = 0;
        }

        let closing = *shutdown.borrow();
        let error = end.error.filter(|_| !closing);
        let Some(error) = error else {
            tracing::info!("Client session ended normally");
            inner.handler.on_disconnect(None, false);
            return Ok(());
        };

        if !should_attempt_reconnect(&error, attempt, policy.max_attempts) {
            let error = if should_exit_immediately(&error) {
                tracing::error!("Connection rejected: {}", error);
                error
            } else {
                tracing::error!("Failed to reconnect after {} attempts", attempt);
                ClientError::ReconnectExhausted { attempts: attempt }
            };
            inner.handler.on_disconnect(Some(&error), false);
            return Err(error);
        }

        if end.established {
            tracing::warn!("Connection lost: {}", error);
            inner.handler.on_disconnect(Some(&error), true);
        } else {
            tracing::warn!("Connection attempt failed: {}", error);
        }

        let delay = backoff_delay(&policy, attempt);
        attempt += 1;
        tracing::info!(
            "Reconnecting in {:?}... (attempt {}/{})",
            delay,
            attempt,
            policy.max_attempts
        );
        inner.set_status(ConnectionStatus::Reconnecting { attempt });

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_requested(&mut shutdown) => {
                inner.handler.on_disconnect(None, false);
                return Ok(());
            }
        }
    }
}
