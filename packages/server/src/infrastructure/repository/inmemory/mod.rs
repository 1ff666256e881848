//! In-memory repositories backed by `HashMap` behind a tokio `Mutex`.

mod connection;
mod session;
mod user;

pub use connection::InMemoryConnectionRepository;
pub use session::InMemorySessionRepository;
pub use user::InMemoryUserRepository;
