//! Connection registry and identity hook for Salvo.
//!
//! - [`ConnectionRegistry`]: player identity → live outbound channel,
//!   plus the transient game pointer used to route pushes.
//! - [`Authenticator`]: turns the identity string in a client's first
//!   message into a [`PlayerId`](salvo_protocol::PlayerId).

mod auth;
mod error;
mod registry;

pub use auth::{Authenticator, UuidAuthenticator};
pub use error::SessionError;
pub use registry::{ConnectionRegistry, OutboundSender, Release};
