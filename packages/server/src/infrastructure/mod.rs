//! Infrastructure layer.
//!
//! Concrete implementations of the traits the domain defines.

pub mod auth;
pub mod dto;
pub mod message_pusher;
pub mod repository;
