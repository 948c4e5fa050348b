use dotchat_crypto::CryptoError;
use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid relay URL {0:?}")]
    InvalidUrl(String),

    #[error("could not connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },

    #[error("connection error: {0}")]
    Transport(#[from] Box<tungstenite::Error>),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<tungstenite::Error> for ClientError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}
