use tokio_tungstenite::tungstenite::http::Uri;

use crate::error::ClientError;

pub const DEFAULT_URL: &str = "ws://localhost:3000/ws";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Normalised relay URL.
    pub url: String,
    /// Name to announce; blank means the placeholder.
    pub name: String,
}

impl ClientConfig {
    /// Read `DOTCHAT_URL` and `DOTCHAT_NAME`.
    pub fn from_env() -> Result<Self, ClientError> {
        let url = std::env::var("DOTCHAT_URL").unwrap_or_else(|_| DEFAULT_URL.into());
        let name = std::env::var("DOTCHAT_NAME").unwrap_or_default();
        Ok(Self {
            url: normalize_url(&url)?,
            name: name.trim().to_string(),
        })
    }
}

/// Turn user input such as `192.168.0.7:3000` into `ws://192.168.0.7:3000/ws`.
///
/// A missing scheme becomes `ws://`; a missing or root path becomes `/ws`.
pub fn normalize_url(input: &str) -> Result<String, ClientError> {
    let input = input.trim();
    let (scheme, rest) = match input.split_once("://") {
        Some((scheme @ ("ws" | "wss"), rest)) => (scheme, rest),
        Some(_) => return Err(ClientError::InvalidUrl(input.to_string())),
        None => ("ws", input),
    };
    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(ClientError::InvalidUrl(input.to_string()));
    }
    let path = if path.is_empty() || path == "/" { "/ws" } else { path };

    let url = format!("{}://{}{}", scheme, authority, path);
    url.parse::<Uri>()
        .map_err(|_| ClientError::InvalidUrl(input.to_string()))?;
    Ok(url)
}
