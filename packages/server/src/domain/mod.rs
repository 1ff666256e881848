//! Domain layer.
//!
//! Entities, value objects, and the pure rules of the collaboration core
//! (rate limiting, login lockout, conflict resolution), plus the interfaces
//! the domain needs from the outside world (repositories, message pushing,
//! token and password handling). Concrete implementations live in the
//! infrastructure layer.

pub mod auth;
pub mod conflict;
pub mod entity;
pub mod error;
pub mod message_pusher;
pub mod rate_limit;
pub mod repository;
pub mod value_object;

pub use auth::{AuthContext, Authenticator, PasswordHasher, TokenClaims, TokenCodec};
pub use conflict::{
    ConflictResolver, ConflictStrategy, ManualConflictHandler, MergeFn, PendingConflict,
    ResolveError,
};
pub use entity::{Connection, Session, SessionMetadata, User};
pub use error::{
    MessagePushError, PasswordHashError, RepositoryError, TokenError, ValueObjectError,
};
pub use message_pusher::{MessagePusher, OutboundFrame, PusherChannel};
pub use rate_limit::{LoginAttemptTracker, TokenBucket};
pub use repository::{ConnectionRepository, SessionRepository, UserRepository};
pub use value_object::{ConnectionId, Email, RoomId, SessionId, UserId};
