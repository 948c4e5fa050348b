use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand_core::{OsRng, RngCore};

use crate::error::CryptoError;
use crate::identity::Identity;
use crate::keys::{NONCE_LEN, SealedPayload, public_key_from_base64};

/// Seal `plaintext` so only the holder of `recipient_public_key` can open it,
/// authenticated as coming from `own`.
///
/// A fresh random nonce is drawn for every call.
pub fn seal(
    plaintext: &[u8],
    recipient_public_key: &str,
    own: &Identity,
) -> Result<SealedPayload, CryptoError> {
    let recipient = public_key_from_base64(recipient_public_key)?;
    let key = own.box_key(&recipient)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_slice()));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::CapabilityUnavailable(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(SealedPayload {
        nonce: BASE64.encode(nonce_bytes),
        cipher: BASE64.encode(ciphertext),
    })
}

/// Open a payload sealed by `sender_public_key` for `own`.
///
/// Any authentication failure, wrong or malformed sender key, or malformed
/// field yields [`CryptoError::DecryptionFailed`].
pub fn open(
    sealed: &SealedPayload,
    sender_public_key: &str,
    own: &Identity,
) -> Result<Vec<u8>, CryptoError> {
    let sender =
        public_key_from_base64(sender_public_key).map_err(|_| CryptoError::DecryptionFailed)?;
    let key = own.box_key(&sender).map_err(|_| CryptoError::DecryptionFailed)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_slice()));

    let nonce = BASE64
        .decode(&sealed.nonce)
        .ok()
        .filter(|n| n.len() == NONCE_LEN)
        .ok_or(CryptoError::DecryptionFailed)?;
    let ciphertext = BASE64
        .decode(&sealed.cipher)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// [`open`] for payloads that carry UTF-8 text (chat messages, base64 media).
pub fn open_text(
    sealed: &SealedPayload,
    sender_public_key: &str,
    own: &Identity,
) -> Result<String, CryptoError> {
    let plaintext = open(sealed, sender_public_key, own)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}
