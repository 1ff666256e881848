//! UseCase layer.
//!
//! - `identity`: users, sessions, lockout, password reset
//! - gateway use cases: one per step of a connection's life (accept,
//!   authenticate, handle a frame, broadcast, liveness, disconnect)
//! - `document_versions`: per-room conflict resolvers for `edit` frames

mod accept_connection;
mod auth_timeout;
mod authenticate_connection;
mod broadcast_to_room;
mod disconnect_connection;
mod document_versions;
mod error;
mod handle_message;
mod identity;
mod liveness;
mod query_rooms;

pub use accept_connection::AcceptConnectionUseCase;
pub use auth_timeout::AuthTimeouts;
pub use authenticate_connection::AuthenticateConnectionUseCase;
pub use broadcast_to_room::BroadcastToRoomUseCase;
pub use disconnect_connection::DisconnectConnectionUseCase;
pub use document_versions::DocumentVersions;
pub use error::{ConnectionRejected, GatewayError, IdentityError};
pub use handle_message::HandleMessageUseCase;
pub use identity::{IdentityService, LoginOutcome, NewUser, PasswordResetGrant};
pub use liveness::{HeartbeatReport, LivenessUseCase};
pub use query_rooms::{QueryRoomsUseCase, RoomDetail};
