use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use parley_gateway::RelayConfig;
use parley_proto::WireMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub download_dir: PathBuf,
    pub relay: RelayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = RelayConfig::default();

        let host = lookup("PARLEY_HOST").unwrap_or_else(|| "127.0.0.1".into());
        let port = parse(&lookup, "PARLEY_PORT")?.unwrap_or(8080);
        let download_dir = lookup("PARLEY_DOWNLOAD_DIR")
            .unwrap_or_else(|| "./received".into())
            .into();

        let mode = match lookup("PARLEY_WIRE_MODE") {
            Some(v) => v
                .parse::<WireMode>()
                .map_err(anyhow::Error::msg)
                .context("invalid PARLEY_WIRE_MODE")?,
            None => defaults.mode,
        };
        let read_timeout = parse::<u64>(&lookup, "PARLEY_READ_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let handshake_timeout = parse::<u64>(&lookup, "PARLEY_HANDSHAKE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.handshake_timeout);
        let queue_capacity = parse::<usize>(&lookup, "PARLEY_QUEUE_CAPACITY")?
            .unwrap_or(defaults.queue_capacity);
        if queue_capacity == 0 {
            anyhow::bail!("PARLEY_QUEUE_CAPACITY must be at least 1");
        }

        Ok(Self {
            host,
            port,
            download_dir,
            relay: RelayConfig {
                mode,
                read_timeout,
                handshake_timeout,
                queue_capacity,
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid {}", key))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.download_dir, PathBuf::from("./received"));
        assert_eq!(config.relay.mode, WireMode::Framed);
        assert_eq!(config.relay.read_timeout, None);
        assert_eq!(config.relay.handshake_timeout, Duration::from_secs(30));
        assert_eq!(config.relay.queue_capacity, 256);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("PARLEY_HOST", "0.0.0.0"),
            ("PARLEY_PORT", "9000"),
            ("PARLEY_WIRE_MODE", "legacy"),
            ("PARLEY_READ_TIMEOUT_SECS", "120"),
            ("PARLEY_QUEUE_CAPACITY", "8"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.relay.mode, WireMode::Legacy);
        assert_eq!(config.relay.read_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.relay.queue_capacity, 8);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("PARLEY_PORT", "eighty")]).is_err());
        assert!(config(&[("PARLEY_WIRE_MODE", "json")]).is_err());
        assert!(config(&[("PARLEY_QUEUE_CAPACITY", "0")]).is_err());
    }
}
