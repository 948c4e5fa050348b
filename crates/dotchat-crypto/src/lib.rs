//! Dotchat Crypto Library
//!
//! Each client process owns one X25519 identity for its lifetime. Payloads
//! are sealed to a single peer: X25519 key agreement, HKDF-SHA256 key
//! derivation, XChaCha20-Poly1305 with a fresh 24-byte random nonce.
//!
//! The relay only needs the wire types, so it builds this crate without the
//! `client` feature and never links the sealing code.

pub mod error;
pub mod keys;

#[cfg(feature = "client")]
pub mod identity;
#[cfg(feature = "client")]
pub mod seal;

pub use error::CryptoError;
pub use keys::{KEY_LEN, NONCE_LEN, SealedPayload};

#[cfg(feature = "client")]
pub use identity::Identity;
#[cfg(feature = "client")]
pub use seal::{open, open_text, seal};
