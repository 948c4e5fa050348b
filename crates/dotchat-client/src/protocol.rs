use std::fmt;
use std::sync::OnceLock;

use tracing::{debug, info, warn};

use dotchat_crypto::{CryptoError, Identity, SealedPayload, open_text, seal};
use dotchat_types::{Envelope, MediaKind, SOMEONE, SystemEvent, display_name};

/// Something the hosting UI should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    System {
        event: SystemEvent,
        name: String,
    },
    Message {
        name: String,
        text: String,
        encrypted: bool,
    },
    Media {
        name: String,
        media_type: MediaKind,
        /// Base64 media bytes.
        data: String,
        file_name: Option<String>,
        encrypted: bool,
    },
    /// A peer key was accepted; outgoing traffic is sealed from now on.
    E2eActive { peer_key: String },
    /// A sealed frame could not be opened and was discarded.
    DecryptionFailed { name: String },
    /// An outgoing message or media item could not be built or sent.
    SendFailed { reason: String },
    /// A frame that is not a known envelope, shown as-is.
    Raw(String),
    /// The connection to the relay ended.
    Disconnected,
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System { event, name } => {
                let who = if name.is_empty() { SOMEONE } else { name.as_str() };
                match event {
                    SystemEvent::Join => write!(f, "* {} joined", who),
                    SystemEvent::Leave => write!(f, "* {} left", who),
                }
            }
            Self::Message { name, text, .. } => write!(f, "{}: {}", name, text),
            Self::Media {
                name,
                media_type,
                data,
                file_name,
                ..
            } => {
                let kind = match media_type {
                    MediaKind::Image => "image",
                    MediaKind::Audio => "audio",
                    MediaKind::File => "file",
                };
                match file_name {
                    Some(file) => write!(f, "{}: [{} {}, {} base64 chars]", name, kind, file, data.len()),
                    None => write!(f, "{}: [{}, {} base64 chars]", name, kind, data.len()),
                }
            }
            Self::E2eActive { .. } => write!(f, "* end-to-end encryption active"),
            Self::DecryptionFailed { name } => write!(f, "! failed to decrypt a message from {}", name),
            Self::SendFailed { reason } => write!(f, "! could not send: {}", reason),
            Self::Raw(text) => write!(f, "{}", text),
            Self::Disconnected => write!(f, "* disconnected"),
        }
    }
}

/// Per-client protocol state: own identity, the peer key slot and the name
/// this client announces.
///
/// Pure: it consumes raw frames and produces envelopes and events, leaving
/// the transport to the caller.
#[derive(Debug)]
pub struct ClientState {
    identity: Option<Identity>,
    own_public_key: Option<String>,
    /// First distinct key seen on the wire that can be sealed to. Never
    /// replaced.
    peer_public_key: OnceLock<String>,
    display_name: String,
    crypto_error: Option<String>,
}

impl ClientState {
    /// Create state with a freshly generated identity. If the random source
    /// is unavailable the state works in plaintext only; check
    /// [`ClientState::crypto_unavailable`] and tell the user.
    pub fn new(display_name: impl Into<String>) -> Self {
        match Identity::generate() {
            Ok(identity) => Self::with_identity(display_name, identity),
            Err(e) => Self::plaintext_only(display_name, e),
        }
    }

    pub fn with_identity(display_name: impl Into<String>, identity: Identity) -> Self {
        Self {
            own_public_key: Some(identity.public_key_base64()),
            identity: Some(identity),
            peer_public_key: OnceLock::new(),
            display_name: display_name.into(),
            crypto_error: None,
        }
    }

    /// State for a process whose crypto engine failed to initialise.
    pub fn plaintext_only(display_name: impl Into<String>, reason: CryptoError) -> Self {
        warn!("end-to-end encryption unavailable: {}", reason);
        Self {
            identity: None,
            own_public_key: None,
            peer_public_key: OnceLock::new(),
            display_name: display_name.into(),
            crypto_error: Some(reason.to_string()),
        }
    }

    /// Why encryption is off for this process, if it is.
    pub fn crypto_unavailable(&self) -> Option<&str> {
        self.crypto_error.as_deref()
    }

    pub fn own_public_key(&self) -> Option<&str> {
        self.own_public_key.as_deref()
    }

    pub fn peer_public_key(&self) -> Option<&str> {
        self.peer_public_key.get().map(String::as_str)
    }

    pub fn is_e2e_active(&self) -> bool {
        self.identity.is_some() && self.peer_public_key.get().is_some()
    }

    /// Name as announced, with the placeholder applied.
    pub fn display_name(&self) -> String {
        display_name(Some(&self.display_name))
    }

    /// Frames to send as soon as the connection is up: `presence:join`,
    /// then `crypto:pubkey` when encryption is available.
    pub fn greeting(&self) -> Vec<Envelope> {
        let mut frames = vec![Envelope::PresenceJoin {
            name: Some(self.display_name()),
        }];
        if let Some(key) = &self.own_public_key {
            frames.push(Envelope::CryptoPubkey {
                public_key: key.clone(),
            });
        }
        frames
    }

    /// Build the envelope for an outgoing chat message. Sealed to the peer
    /// once a peer key is known, plaintext otherwise.
    pub fn compose_message(&self, text: &str) -> Result<Envelope, CryptoError> {
        let name = Some(self.display_name());
        match self.sealing_context() {
            Some((identity, own, peer)) => Ok(Envelope::MessageE2e {
                name,
                from: own.to_string(),
                payload: seal(text.as_bytes(), peer, identity)?,
            }),
            None => Ok(Envelope::Message {
                text: text.to_string(),
                name,
                from: self.own_public_key.clone(),
            }),
        }
    }

    /// Build the envelope for outgoing media. `data` is the base64 content.
    pub fn compose_media(
        &self,
        media_type: MediaKind,
        data: &str,
        file_name: Option<String>,
    ) -> Result<Envelope, CryptoError> {
        let name = Some(self.display_name());
        match self.sealing_context() {
            Some((identity, own, peer)) => Ok(Envelope::MediaE2e {
                media_type,
                payload: seal(data.as_bytes(), peer, identity)?,
                file_name,
                name,
                from: own.to_string(),
            }),
            None => Ok(Envelope::Media {
                media_type,
                data: data.to_string(),
                file_name,
                name,
                from: self.own_public_key.clone(),
            }),
        }
    }

    fn sealing_context(&self) -> Option<(&Identity, &str, &str)> {
        let identity = self.identity.as_ref()?;
        let own = self.own_public_key.as_deref()?;
        let peer = self.peer_public_key.get()?;
        Some((identity, own, peer.as_str()))
    }

    /// Handle one raw inbound frame.
    pub fn handle_frame(&self, raw: &str) -> Option<ClientEvent> {
        match Envelope::parse(raw) {
            Ok(envelope) => self.handle_envelope(envelope),
            Err(_) => Some(ClientEvent::Raw(raw.to_string())),
        }
    }

    /// Dispatch one parsed envelope. `None` means nothing to render.
    pub fn handle_envelope(&self, envelope: Envelope) -> Option<ClientEvent> {
        match envelope {
            Envelope::System { event, name } => Some(ClientEvent::System { event, name }),

            Envelope::CryptoPubkey { public_key } => self.accept_peer_key(public_key),

            Envelope::MessageE2e { name, from, payload } => {
                if self.is_own(Some(&from)) {
                    debug!("dropping own message:e2e echo");
                    return None;
                }
                let name = display_name(name.as_deref());
                match self.open(&payload, &from) {
                    Ok(text) => Some(ClientEvent::Message {
                        name,
                        text,
                        encrypted: true,
                    }),
                    Err(e) => {
                        warn!("message:e2e from {} dropped: {}", name, e);
                        Some(ClientEvent::DecryptionFailed { name })
                    }
                }
            }

            Envelope::MediaE2e {
                media_type,
                payload,
                file_name,
                name,
                from,
            } => {
                if self.is_own(Some(&from)) {
                    debug!("dropping own media:e2e echo");
                    return None;
                }
                let name = display_name(name.as_deref());
                match self.open(&payload, &from) {
                    Ok(data) => Some(ClientEvent::Media {
                        name,
                        media_type,
                        data,
                        file_name,
                        encrypted: true,
                    }),
                    Err(e) => {
                        warn!("media:e2e from {} dropped: {}", name, e);
                        Some(ClientEvent::DecryptionFailed { name })
                    }
                }
            }

            Envelope::Message { text, name, from } => {
                if self.is_own(from.as_deref()) {
                    return None;
                }
                Some(ClientEvent::Message {
                    name: display_name(name.as_deref()),
                    text,
                    encrypted: false,
                })
            }

            Envelope::Media {
                media_type,
                data,
                file_name,
                name,
                from,
            } => {
                if self.is_own(from.as_deref()) {
                    return None;
                }
                Some(ClientEvent::Media {
                    name: display_name(name.as_deref()),
                    media_type,
                    data,
                    file_name,
                    encrypted: false,
                })
            }

            // Relays consume joins; one reaching a client carries nothing to show.
            Envelope::PresenceJoin { .. } => None,
        }
    }

    fn accept_peer_key(&self, key: String) -> Option<ClientEvent> {
        let identity = self.identity.as_ref()?;
        if self.is_own(Some(&key)) {
            return None;
        }
        if let Some(existing) = self.peer_public_key.get() {
            if *existing != key {
                debug!("ignoring additional peer key, first one wins");
            }
            return None;
        }
        if let Err(e) = identity.check_peer_key(&key) {
            warn!("ignoring unusable peer key: {}", e);
            return None;
        }

        match self.peer_public_key.set(key.clone()) {
            Ok(()) => {
                info!("end-to-end encryption active");
                Some(ClientEvent::E2eActive { peer_key: key })
            }
            Err(_) => None,
        }
    }

    fn is_own(&self, from: Option<&str>) -> bool {
        matches!((from, self.own_public_key.as_deref()), (Some(f), Some(own)) if f == own)
    }

    fn open(&self, payload: &SealedPayload, from: &str) -> Result<String, CryptoError> {
        let identity = self.identity.as_ref().ok_or(CryptoError::DecryptionFailed)?;
        open_text(payload, from, identity)
    }
}
