//! Domain logic for client-side reconnect decisions.
//!
//! This module contains pure functions that implement business logic
//! without side effects, making them easy to test.

use std::time::Duration;

use tandem_shared::protocol::{CloseCode, ServerMessage};

use crate::{config::ReconnectPolicy, error::ClientError};

/// Check if the client should stop immediately based on the error type.
///
/// Origin, IP-cap, and authentication rejections (4001/4002/4003) fail the
/// same way on every retry.
pub fn should_exit_immediately(error: &ClientError) -> bool {
    match error {
        ClientError::Closed {
            code: Some(code), ..
        } => CloseCode::from_code(*code).is_some_and(CloseCode::is_terminal_rejection),
        ClientError::ReconnectExhausted { .. } => true,
        _ => false,
    }
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `error` - The client error that ended the session
/// * `current_attempt` - Reconnect attempts already made (0-indexed)
/// * `max_attempts` - The maximum number of reconnection attempts allowed
pub fn should_attempt_reconnect(
    error: &ClientError,
    current_attempt: u32,
    max_attempts: u32,
) -> bool {
    // Don't reconnect if the error requires immediate exit
    if should_exit_immediately(error) {
        return false;
    }

    // Don't reconnect if we've exhausted all attempts
    current_attempt < max_attempts
}

/// Check if `message` shows the gateway accepted the session: `auth_success`
/// when a token was sent, otherwise the ack for the configured room.
///
/// Only a confirmed session resets the reconnect budget.
pub fn confirms_session(message: &ServerMessage, authenticating: bool, room_id: &str) -> bool {
    match message {
        ServerMessage::AuthSuccess { .. } => authenticating,
        ServerMessage::RoomJoined {
            room_id: joined, ..
        } => !authenticating && joined == room_id,
        _ => false,
    }
}

/// Delay before reconnect attempt `attempt` (0-indexed):
/// `base_delay * 2^attempt`, capped at `max_delay`.
pub fn backoff_delay(policy: &ReconnectPolicy, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    policy
        .base_delay
        .checked_mul(factor)
        .map_or(policy.max_delay, |delay| delay.min(policy.max_delay))
}

#[cfg(test)]
mod tests {
    use tandem_shared::protocol::{UserProfile, UserRole};

    use super::*;

    fn closed(code: u16) -> ClientError {
        ClientError::Closed {
            code: Some(code),
            reason: String::new(),
        }
    }

    #[test]
    fn test_should_exit_immediately_on_terminal_close_codes() {
        // テスト項目: 4001 / 4002 / 4003 でクローズされた場合、即座に終了すべきと判定される
        // given (前提条件):
        let errors = [closed(4001), closed(4002), closed(4003)];

        // when (操作):
        let results: Vec<bool> = errors.iter().map(should_exit_immediately).collect();

        // then (期待する結果):
        assert_eq!(results, vec![true, true, true]);
    }

    #[test]
    fn test_should_exit_immediately_with_connection_error() {
        // テスト項目: ConnectionError の場合、即座に終了すべきではないと判定される
        // given (前提条件):
        let error = ClientError::ConnectionError("network error".to_string());

        // when (操作):
        let result = should_exit_immediately(&error);

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_should_exit_immediately_on_recoverable_close() {
        // テスト項目: 4000 (無応答) や 1001 (サーバー停止) では即座に終了しない
        assert!(!should_exit_immediately(&closed(4000)));
        assert!(!should_exit_immediately(&closed(1001)));
        assert!(!should_exit_immediately(&ClientError::Closed {
            code: None,
            reason: "stream ended".to_string(),
        }));
    }

    #[test]
    fn test_should_attempt_reconnect_with_auth_failure() {
        // テスト項目: 認証失敗 (4003) の場合、再接続すべきではないと判定される
        // given (前提条件):
        let error = closed(4003);

        // when (操作):
        let result = should_attempt_reconnect(&error, 0, 5);

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_should_attempt_reconnect_within_limit() {
        // テスト項目: 再接続回数が上限未満の場合、再接続すべきと判定される
        // given (前提条件):
        let error = ClientError::ConnectionError("network error".to_string());

        // when (操作):
        let result = should_attempt_reconnect(&error, 3, 5);

        // then (期待する結果):
        assert!(result);
    }

    #[test]
    fn test_should_attempt_reconnect_at_limit() {
        // テスト項目: 再接続回数が上限に達した場合、再接続すべきではないと判定される
        // given (前提条件):
        let error = ClientError::ConnectionError("network error".to_string());

        // when (操作):
        let result = should_attempt_reconnect(&error, 5, 5);

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_only_gateway_acceptance_confirms_session() {
        // テスト項目: トークン送信時は auth_success、未送信時は設定したルームの room_joined のみがセッション確立とみなされる
        // given (前提条件):
        let auth_success = ServerMessage::AuthSuccess {
            user: UserProfile {
                id: "u1".to_string(),
                display_name: "Alice".to_string(),
                role: UserRole::User,
            },
            session_id: "s1".to_string(),
        };
        let joined = |room: &str| ServerMessage::RoomJoined {
            room_id: room.to_string(),
            member_count: 1,
        };
        let pong = ServerMessage::Pong { timestamp: 0 };

        // then (期待する結果):
        assert!(confirms_session(&auth_success, true, "doc-1"));
        assert!(!confirms_session(&joined("doc-1"), true, "doc-1"));
        assert!(!confirms_session(&pong, true, "doc-1"));
        assert!(confirms_session(&joined("doc-1"), false, "doc-1"));
        assert!(!confirms_session(&joined("doc-2"), false, "doc-1"));
        assert!(!confirms_session(&auth_success, false, "doc-1"));
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        // テスト項目: 再接続の待ち時間は基準値から倍々に伸びる
        // given (前提条件):
        let policy = ReconnectPolicy::default();

        // when (操作):
        let delays: Vec<Duration> = (0..4).map(|n| backoff_delay(&policy, n)).collect();

        // then (期待する結果):
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn test_backoff_is_capped_at_max_delay() {
        // テスト項目: 待ち時間は max_delay を超えず、大きな試行回数でもオーバーフローしない
        // given (前提条件):
        let policy = ReconnectPolicy::default();

        // when (操作):
        let sixth = backoff_delay(&policy, 5);
        let huge = backoff_delay(&policy, 64);

        // then (期待する結果):
        assert_eq!(sixth, Duration::from_secs(30));
        assert_eq!(huge, Duration::from_secs(30));
    }
}
