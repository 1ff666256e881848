//! Client configuration.

use std::time::Duration;

/// Exponential backoff between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; doubles on every further attempt
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Settings for one [`CollabClient`](crate::CollabClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway WebSocket URL, e.g. `ws://127.0.0.1:8080/ws`
    pub url: String,
    /// Bearer token sent in the `auth` frame. `None` skips authentication.
    pub token: Option<String>,
    /// Room (document) this client collaborates in
    pub room_id: String,
    /// Interval between application-level `ping` frames
    pub ping_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            room_id: room_id.into(),
            ping_interval: Duration::from_secs(25),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}
