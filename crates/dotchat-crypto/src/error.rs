//! Crypto error types.

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The operating system random source could not be read. Callers must
    /// fall back to plaintext-only operation and say so.
    #[error("Secure random source unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authentication failed or the sealed payload was malformed. No
    /// plaintext is ever returned alongside this error.
    #[error("Failed to decrypt")]
    DecryptionFailed,

    #[error("Key derivation failed")]
    KeyDerivationFailed,

    #[error("Decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}
