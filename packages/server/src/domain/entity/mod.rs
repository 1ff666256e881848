//! Domain entities.

mod connection;
mod session;
mod user;

pub use connection::Connection;
pub use session::{Session, SessionMetadata};
pub use user::User;
