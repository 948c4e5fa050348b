use std::fmt;

use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;
use crate::keys::{KEY_LEN, public_key_from_base64, public_key_to_base64};

/// HKDF info prefix for the box key. Both public keys follow it in
/// ascending byte order so each side derives the same key.
const HKDF_INFO: &[u8] = b"dotchat-box-v1";

/// The long-lived keypair of one client process.
///
/// The secret never leaves this struct; only [`Identity::public_key_base64`]
/// crosses the transport boundary.
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
}

impl Identity {
    /// Generate a fresh identity from the OS random source.
    ///
    /// Returns [`CryptoError::CapabilityUnavailable`] instead of producing a
    /// weak key when the random source cannot be read.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::CapabilityUnavailable(e.to_string()))?;
        let identity = Self::from_secret_bytes(bytes);
        bytes.zeroize();
        Ok(identity)
    }

    /// Rebuild an identity from raw secret bytes. Used by tests that need
    /// deterministic keys.
    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; KEY_LEN] {
        *self.public.as_bytes()
    }

    /// Public key as sent in `crypto:pubkey` and `from` fields.
    /// Stable for the lifetime of the identity.
    pub fn public_key_base64(&self) -> String {
        public_key_to_base64(self.public.as_bytes())
    }

    /// Check that `peer` (base64) can be sealed to: 32 bytes and not a
    /// low-order point that would force an all-zero shared secret.
    pub fn check_peer_key(&self, peer: &str) -> Result<(), CryptoError> {
        let peer = public_key_from_base64(peer)?;
        self.box_key(&peer).map(|_| ())
    }

    /// Derive the symmetric box key shared with `peer`.
    pub(crate) fn box_key(
        &self,
        peer: &[u8; KEY_LEN],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey("low-order point".into()));
        }

        let own = self.public.as_bytes();
        let (lo, hi) = if own.as_slice() <= peer.as_slice() {
            (own, peer)
        } else {
            (peer, own)
        };
        let mut info = Vec::with_capacity(HKDF_INFO.len() + 2 * KEY_LEN);
        info.extend_from_slice(HKDF_INFO);
        info.extend_from_slice(lo);
        info.extend_from_slice(hi);

        let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        hk.expand(&info, key.as_mut_slice())
            .map_err(|_| CryptoError::KeyDerivationFailed)?;
        Ok(key)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}
