//! Dotchat client: the per-client protocol state machine and a WebSocket
//! driver that feeds it.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

pub use config::ClientConfig;
pub use connection::{ChatClient, Command, Renderer, run};
pub use error::ClientError;
pub use protocol::{ClientEvent, ClientState};
