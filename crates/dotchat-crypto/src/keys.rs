use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// X25519 public and secret key size.
pub const KEY_LEN: usize = 32;

/// XChaCha20-Poly1305 nonce size.
pub const NONCE_LEN: usize = 24;

/// A sealed payload as it travels inside an envelope.
/// Both fields are standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    pub nonce: String,
    pub cipher: String,
}

/// Encode a public key to base64 for the wire.
pub fn public_key_to_base64(key: &[u8; KEY_LEN]) -> String {
    BASE64.encode(key)
}

/// Decode a base64 public key. Fails unless it decodes to exactly 32 bytes.
pub fn public_key_from_base64(encoded: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidPublicKey(format!("expected {} bytes, got {}", KEY_LEN, len))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_base64_roundtrip() {
        let key = [7u8; KEY_LEN];
        let encoded = public_key_to_base64(&key);
        assert_eq!(public_key_from_base64(&encoded).unwrap(), key);
    }

    #[test]
    fn short_key_rejected() {
        let encoded = BASE64.encode([1u8; 16]);
        let err = public_key_from_base64(&encoded).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
    }

    #[test]
    fn garbage_key_rejected() {
        assert!(public_key_from_base64("not base64 at all!").is_err());
    }

    #[test]
    fn sealed_payload_wire_shape() {
        let sealed = SealedPayload {
            nonce: "bm9uY2U=".into(),
            cipher: "Y2lwaGVy".into(),
        };
        let json = serde_json::to_value(&sealed).unwrap();
        assert_eq!(json["nonce"], "bm9uY2U=");
        assert_eq!(json["cipher"], "Y2lwaGVy");
    }
}
