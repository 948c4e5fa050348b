//! Wire types shared by the relay and its clients.

pub mod control;
pub mod envelope;

pub use control::{Endpoints, StartReply, StopReply};
pub use envelope::{
    ANONYMOUS, Envelope, MediaKind, ProtocolParseError, SOMEONE, SystemEvent, display_name,
};
