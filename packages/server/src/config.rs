//! Gateway and identity service configuration.

use std::time::Duration;

use crate::domain::ConflictStrategy;

pub const ALLOW_ANY_ORIGIN: &str = "*";

/// Frames up to this multiple of `max_message_size` still get an error reply
const TRANSPORT_LIMIT_FACTOR: usize = 2;

/// Connection gateway options
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bytes; larger frames are answered with `message_too_large`, and
    /// frames past [`transport_message_limit`](Self::transport_message_limit)
    /// drop the connection
    pub max_message_size: usize,
    pub ping_interval: Duration,
    /// Connections idle longer than `ping_interval * inactivity_multiplier`
    /// are closed
    pub inactivity_multiplier: u32,
    pub auth_timeout: Duration,
    pub max_connections_per_ip: usize,
    pub max_messages_per_second: u32,
    pub require_auth: bool,
    /// `*` allows every origin
    pub allowed_origins: Vec<String>,
    pub debug: bool,
    /// Strategy for every room's conflict resolver
    pub conflict_strategy: ConflictStrategy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            ping_interval: Duration::from_secs(30),
            inactivity_multiplier: 2,
            auth_timeout: Duration::from_secs(10),
            max_connections_per_ip: 10,
            max_messages_per_second: 100,
            require_auth: true,
            allowed_origins: vec![ALLOW_ANY_ORIGIN.to_string()],
            debug: false,
            conflict_strategy: ConflictStrategy::LastWriteWins,
        }
    }
}

impl GatewayConfig {
    /// Requests without an `Origin` header come from non-browser clients and
    /// are allowed.
    pub fn is_origin_allowed(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == ALLOW_ANY_ORIGIN || allowed.eq_ignore_ascii_case(origin))
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.ping_interval * self.inactivity_multiplier
    }

    /// Hard cap enforced by the WebSocket layer while reading a frame
    pub fn transport_message_limit(&self) -> usize {
        self.max_message_size.saturating_mul(TRANSPORT_LIMIT_FACTOR)
    }
}

/// Identity & session service options
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Sliding lifetime of a session (and its token) from the last use
    pub token_expiration: Duration,
    /// Hard ceiling on a session's lifetime from creation
    pub session_expiration: Duration,
    pub require_email_verification: bool,
    pub max_login_attempts: u32,
    pub lockout: Duration,
    pub enable_rate_limiting: bool,
    pub jwt_secret: String,
    pub reset_token_ttl: Duration,
    pub session_sweep_interval: Duration,
    pub min_password_length: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_expiration: Duration::from_secs(60 * 60),
            session_expiration: Duration::from_secs(7 * 24 * 60 * 60),
            require_email_verification: false,
            max_login_attempts: 5,
            lockout: Duration::from_secs(15 * 60),
            enable_rate_limiting: true,
            jwt_secret: "tandem-development-secret".to_string(),
            reset_token_ttl: Duration::from_secs(60 * 60),
            session_sweep_interval: Duration::from_secs(5 * 60),
            min_password_length: 8,
        }
    }
}

pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_allows_any_origin() {
        // テスト項目: `*` が設定されていれば任意の Origin が許可される
        let config = GatewayConfig::default();

        assert!(config.is_origin_allowed(Some("https://evil.example")));
        assert!(config.is_origin_allowed(None));
    }

    #[test]
    fn test_allow_list_is_enforced() {
        // テスト項目: 許可リストにない Origin は拒否される
        // given (前提条件):
        let config = GatewayConfig {
            allowed_origins: vec!["https://app.example".to_string()],
            ..Default::default()
        };

        // then (期待する結果):
        assert!(config.is_origin_allowed(Some("https://APP.example")));
        assert!(!config.is_origin_allowed(Some("https://evil.example")));
        assert!(config.is_origin_allowed(None));
    }

    #[test]
    fn test_inactivity_timeout_is_multiple_of_ping_interval() {
        // テスト項目: 非アクティブ判定の閾値は ping 間隔の倍数になる
        let config = GatewayConfig {
            ping_interval: Duration::from_millis(500),
            ..Default::default()
        };

        assert_eq!(config.inactivity_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_transport_limit_is_bounded_above_message_limit() {
        // テスト項目: トランスポートの上限はメッセージ上限の 2 倍で、オーバーフローしない
        let config = GatewayConfig {
            max_message_size: 16,
            ..Default::default()
        };
        let huge = GatewayConfig {
            max_message_size: usize::MAX,
            ..Default::default()
        };

        assert_eq!(config.transport_message_limit(), 32);
        assert_eq!(huge.transport_message_limit(), usize::MAX);
    }
}
