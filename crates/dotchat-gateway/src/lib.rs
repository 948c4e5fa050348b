//! Relay hub: the live-session registry and the per-connection loop.
//!
//! The hub only looks at `presence:join`. Every other frame is fanned out as
//! the exact text it arrived as, so ciphertext passes through untouched.

pub mod connection;
pub mod dispatcher;

pub use connection::Heartbeat;
pub use dispatcher::{Dispatcher, Outbound, Route, SessionId};
