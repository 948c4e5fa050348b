use std::net::IpAddr;

use anyhow::Context;

/// Port the original desktop app served on.
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Bind address for the listener.
    pub host: IpAddr,
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
        }
    }
}

impl RelayConfig {
    /// Read `DOTCHAT_HOST` and `DOTCHAT_PORT`, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let host = match lookup("DOTCHAT_HOST") {
            Some(h) => h.parse().with_context(|| format!("invalid DOTCHAT_HOST {:?}", h))?,
            None => defaults.host,
        };
        let port = match lookup("DOTCHAT_PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid DOTCHAT_PORT {:?}", p))?,
            None => defaults.port,
        };
        Ok(Self { host, port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(RelayConfig::from_lookup(lookup(&[])).unwrap(), RelayConfig::default());
    }

    #[test]
    fn reads_host_and_port() {
        let config =
            RelayConfig::from_lookup(lookup(&[("DOTCHAT_HOST", "127.0.0.1"), ("DOTCHAT_PORT", "5001")]))
                .unwrap();
        assert_eq!(config.host, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.port, 5001);
    }

    #[test]
    fn rejects_bad_port() {
        let err = RelayConfig::from_lookup(lookup(&[("DOTCHAT_PORT", "seventy")])).unwrap_err();
        assert!(err.to_string().contains("DOTCHAT_PORT"));
    }
}
