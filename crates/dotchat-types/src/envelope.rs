use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use dotchat_crypto::SealedPayload;

/// Name announced and rendered when a peer supplies none.
pub const ANONYMOUS: &str = "Anonymous";

/// Name rendered for a `system` notice that carries no name.
pub const SOMEONE: &str = "Someone";

/// Every frame on the wire. One JSON object, discriminated by `type`.
///
/// Binary content never has its own frame type: media bytes travel as base64
/// text inside `data` or inside a sealed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// First frame a client sends; names its session on the relay.
    #[serde(rename = "presence:join")]
    PresenceJoin {
        #[serde(default, deserialize_with = "lenient_name")]
        name: Option<String>,
    },

    /// Join/leave notice generated by the relay.
    #[serde(rename = "system")]
    System {
        event: SystemEvent,
        #[serde(default)]
        name: String,
    },

    /// Plaintext chat message. `from` is the sender's public key, used by
    /// receivers to drop their own echo.
    #[serde(rename = "message")]
    Message {
        text: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// Sealed chat message.
    #[serde(rename = "message:e2e")]
    MessageE2e {
        #[serde(default)]
        name: Option<String>,
        from: String,
        payload: SealedPayload,
    },

    /// Public key announcement for the one-time handshake.
    #[serde(rename = "crypto:pubkey")]
    CryptoPubkey {
        #[serde(rename = "pub")]
        public_key: String,
    },

    /// Plaintext media; `data` is base64.
    #[serde(rename = "media")]
    Media {
        #[serde(rename = "mediaType")]
        media_type: MediaKind,
        data: String,
        #[serde(rename = "fileName", default)]
        file_name: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// Sealed media; the sealed plaintext is the base64 `data` text.
    #[serde(rename = "media:e2e")]
    MediaE2e {
        #[serde(rename = "mediaType")]
        media_type: MediaKind,
        payload: SealedPayload,
        #[serde(rename = "fileName", default)]
        file_name: Option<String>,
        #[serde(default)]
        name: Option<String>,
        from: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemEvent {
    Join,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    File,
}

/// A frame that is not valid JSON or carries an unknown `type`.
///
/// Never escalated: relays forward such frames verbatim and clients render
/// them as raw lines.
#[derive(Debug, thiserror::Error)]
#[error("unrecognised frame: {0}")]
pub struct ProtocolParseError(#[from] serde_json::Error);

impl Envelope {
    /// Parse one raw frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolParseError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> String {
        // Serializing a plain enum of strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PresenceJoin { .. } => "presence:join",
            Self::System { .. } => "system",
            Self::Message { .. } => "message",
            Self::MessageE2e { .. } => "message:e2e",
            Self::CryptoPubkey { .. } => "crypto:pubkey",
            Self::Media { .. } => "media",
            Self::MediaE2e { .. } => "media:e2e",
        }
    }

    /// The sender's public key for frames that carry one.
    pub fn sender_key(&self) -> Option<&str> {
        match self {
            Self::Message { from, .. } | Self::Media { from, .. } => from.as_deref(),
            Self::MessageE2e { from, .. } | Self::MediaE2e { from, .. } => Some(from),
            Self::CryptoPubkey { public_key } => Some(public_key),
            Self::PresenceJoin { .. } | Self::System { .. } => None,
        }
    }

    pub fn system(event: SystemEvent, name: impl Into<String>) -> Self {
        Self::System {
            event,
            name: name.into(),
        }
    }
}

/// Join names come from arbitrary clients: numbers and booleans are taken in
/// their text form, anything else counts as no name.
fn lenient_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(name) => Some(name),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

/// Trim a user-supplied name, substituting [`ANONYMOUS`] when it is blank.
pub fn display_name(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => ANONYMOUS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sealed() -> SealedPayload {
        SealedPayload {
            nonce: "bm9uY2U=".into(),
            cipher: "Y2lwaGVy".into(),
        }
    }

    #[test]
    fn parses_presence_join() {
        let env = Envelope::parse(r#"{"type":"presence:join","name":"Bob"}"#).unwrap();
        assert_eq!(
            env,
            Envelope::PresenceJoin {
                name: Some("Bob".into())
            }
        );
    }

    #[test]
    fn presence_join_without_name() {
        let env = Envelope::parse(r#"{"type":"presence:join"}"#).unwrap();
        assert_eq!(env, Envelope::PresenceJoin { name: None });
    }

    #[test]
    fn presence_join_coerces_scalar_names() {
        let number = Envelope::parse(r#"{"type":"presence:join","name":5}"#).unwrap();
        assert_eq!(number, Envelope::PresenceJoin { name: Some("5".into()) });

        let flag = Envelope::parse(r#"{"type":"presence:join","name":true}"#).unwrap();
        assert_eq!(flag, Envelope::PresenceJoin { name: Some("true".into()) });

        for raw in [
            r#"{"type":"presence:join","name":null}"#,
            r#"{"type":"presence:join","name":{"first":"Bob"}}"#,
        ] {
            assert_eq!(Envelope::parse(raw).unwrap(), Envelope::PresenceJoin { name: None });
        }
    }

    #[test]
    fn system_wire_shape() {
        let json: Value =
            serde_json::from_str(&Envelope::system(SystemEvent::Join, "Bob").to_json()).unwrap();
        assert_eq!(json, json!({"type": "system", "event": "join", "name": "Bob"}));
    }

    #[test]
    fn system_without_name_parses_empty() {
        let env = Envelope::parse(r#"{"type":"system","event":"leave"}"#).unwrap();
        assert_eq!(env, Envelope::system(SystemEvent::Leave, ""));
    }

    #[test]
    fn pubkey_uses_pub_field() {
        let env = Envelope::CryptoPubkey {
            public_key: "AAAA".into(),
        };
        let json: Value = serde_json::from_str(&env.to_json()).unwrap();
        assert_eq!(json, json!({"type": "crypto:pubkey", "pub": "AAAA"}));
        assert_eq!(Envelope::parse(&env.to_json()).unwrap(), env);
    }

    #[test]
    fn media_uses_camel_case_fields() {
        let env = Envelope::MediaE2e {
            media_type: MediaKind::Audio,
            payload: sealed(),
            file_name: Some("note.webm".into()),
            name: Some("Ana".into()),
            from: "KEY".into(),
        };
        let json: Value = serde_json::from_str(&env.to_json()).unwrap();
        assert_eq!(json["type"], "media:e2e");
        assert_eq!(json["mediaType"], "audio");
        assert_eq!(json["fileName"], "note.webm");
        assert_eq!(json["payload"]["nonce"], "bm9uY2U=");
    }

    #[test]
    fn plaintext_media_with_null_file_name() {
        let raw = r#"{"type":"media","mediaType":"image","data":"iVBO","fileName":null,"name":"Ana","from":"KEY"}"#;
        match Envelope::parse(raw).unwrap() {
            Envelope::Media {
                media_type,
                file_name,
                from,
                ..
            } => {
                assert_eq!(media_type, MediaKind::Image);
                assert_eq!(file_name, None);
                assert_eq!(from.as_deref(), Some("KEY"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn message_without_from_omits_field() {
        let env = Envelope::Message {
            text: "hi".into(),
            name: Some("Ana".into()),
            from: None,
        };
        let json: Value = serde_json::from_str(&env.to_json()).unwrap();
        assert!(json.get("from").is_none());
    }

    #[test]
    fn unknown_type_is_a_parse_error() {
        assert!(Envelope::parse(r#"{"type":"typing","name":"Bob"}"#).is_err());
    }

    #[test]
    fn non_json_is_a_parse_error() {
        assert!(Envelope::parse("hello there").is_err());
        assert!(Envelope::parse("").is_err());
    }

    #[test]
    fn e2e_without_from_is_rejected() {
        let raw = r#"{"type":"message:e2e","name":"Ana","payload":{"nonce":"a","cipher":"b"}}"#;
        assert!(Envelope::parse(raw).is_err());
    }

    #[test]
    fn sender_key_per_kind() {
        let env = Envelope::MessageE2e {
            name: None,
            from: "K".into(),
            payload: sealed(),
        };
        assert_eq!(env.sender_key(), Some("K"));
        assert_eq!(env.kind(), "message:e2e");
        assert_eq!(Envelope::PresenceJoin { name: None }.sender_key(), None);
    }

    #[test]
    fn display_name_falls_back() {
        assert_eq!(display_name(Some("  Bob ")), "Bob");
        assert_eq!(display_name(Some("   ")), ANONYMOUS);
        assert_eq!(display_name(None), ANONYMOUS);
    }
}
