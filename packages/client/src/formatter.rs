//! Message formatting utilities for client display.

use tandem_shared::{protocol::ErrorCode, time::timestamp_to_rfc3339};

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the banner shown once the client joined a room
    ///
    /// # Arguments
    ///
    /// * `room_id` - The joined room
    /// * `display_name` - The current user's name
    pub fn format_room_joined(room_id: &str, display_name: &str) -> String {
        let mut output = String::new();
        output.push_str("\n\n============================================================\n");
        output.push_str(&format!("Room: {}\n", room_id));
        output.push_str(&format!("You are '{}'.\n", display_name));
        output.push_str("Type messages and press Enter to send. Press Ctrl+C to exit.\n");
        output.push_str("============================================================\n");
        output
    }

    /// Format a user-joined notification
    pub fn format_user_joined(name: &str) -> String {
        format!("\n+ {} is online\n", name)
    }

    /// Format a user-left notification
    pub fn format_user_left(name: &str) -> String {
        format!("\n- {} left\n", name)
    }

    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `from` - Display name of the sender
    /// * `content` - The message content
    /// * `sent_at` - Unix timestamp when the message was sent (milliseconds)
    pub fn format_chat_message(from: &str, content: &str, sent_at: i64) -> String {
        let timestamp_str = timestamp_to_rfc3339(sent_at);
        format!(
            "\n\n------------------------------------------------------------\n\
             @{}: {}\n\
             sent at {}\n\
             ------------------------------------------------------------\n",
            from, content, timestamp_str
        )
    }

    /// Format a confirmation message after sending
    pub fn format_sent_confirmation(sent_at: i64) -> String {
        let timestamp_str = timestamp_to_rfc3339(sent_at);
        format!("sent at {}\n", timestamp_str)
    }

    /// Format an `error` frame from the gateway
    pub fn format_error(code: ErrorCode, message: &str) -> String {
        format!("\n! {:?}: {}\n", code, message)
    }

    /// Format the reconnecting notice
    pub fn format_reconnecting(reason: &str) -> String {
        format!("\n… connection lost ({}), reconnecting\n", reason)
    }
}
