//! Relay control surface: start/stop a hub on a port, report endpoints.

pub mod config;
pub mod control;
pub mod endpoints;
pub mod routes;

pub use config::RelayConfig;
pub use control::{RelayServer, ServerError};
pub use dotchat_gateway::Heartbeat;
