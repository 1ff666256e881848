//! HTTP and WebSocket handlers.

mod http;
mod websocket;

pub use http::{
    change_password, get_room_detail, get_rooms, health_check, list_sessions, login, logout,
    register, request_password_reset, reset_password, revoke_all_sessions,
};
pub use websocket::websocket_handler;
