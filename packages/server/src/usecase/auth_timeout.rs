//! Pending authentication deadlines, one per unauthenticated connection.

use std::{collections::HashMap, future::Future, time::Duration};

use tokio::{sync::Mutex, task::AbortHandle};

use crate::domain::ConnectionId;

#[derive(Default)]
pub struct AuthTimeouts {
    pending: Mutex<HashMap<ConnectionId, AbortHandle>>,
}

impl AuthTimeouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_expire` after `timeout` unless [`cancel`](Self::cancel) is
    /// called first. Re-arming replaces the previous deadline.
    pub async fn arm<F>(&self, connection_id: ConnectionId, timeout: Duration, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_expire.await;
        });
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.insert(connection_id, task.abort_handle()) {
            previous.abort();
        }
    }

    /// Returns whether a deadline was pending
    pub async fn cancel(&self, connection_id: &ConnectionId) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.remove(connection_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
