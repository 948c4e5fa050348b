use serde::{Deserialize, Serialize};

// -- Endpoints --

/// Connection URIs a hosting application can show to people who want to
/// join. Every entry has the form `ws://<host>:<port>/ws`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub localhost: Vec<String>,
    pub hostname: Vec<String>,
    pub lan: Vec<String>,
}

impl Endpoints {
    /// All URIs, loopback first.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.localhost
            .iter()
            .chain(&self.hostname)
            .chain(&self.lan)
            .map(String::as_str)
    }
}

// -- Control replies --

/// Reply to `start(port)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StartReply {
    pub fn started(port: u16, endpoints: Endpoints) -> Self {
        Self {
            ok: true,
            port: Some(port),
            endpoints: Some(endpoints),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            ok: false,
            port: None,
            endpoints: None,
            error: Some(error.to_string()),
        }
    }
}

/// Reply to `stop()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<E: ToString> From<Result<(), E>> for StopReply {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}
