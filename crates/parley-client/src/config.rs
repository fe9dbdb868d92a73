use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use parley_proto::WireMode;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub mode: WireMode,
    pub download_dir: PathBuf,
    pub read_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mode = match lookup("PARLEY_WIRE_MODE") {
            Some(v) => v
                .parse::<WireMode>()
                .map_err(anyhow::Error::msg)
                .context("invalid PARLEY_WIRE_MODE")?,
            None => WireMode::Framed,
        };

        Ok(Self {
            host: lookup("PARLEY_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: parse(&lookup, "PARLEY_PORT")?.unwrap_or(8080),
            mode,
            download_dir: lookup("PARLEY_DOWNLOAD_DIR")
                .unwrap_or_else(|| "./received".into())
                .into(),
            read_timeout: parse::<u64>(&lookup, "PARLEY_READ_TIMEOUT_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }

    pub fn server_addr(&self) -> String {
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
    use super::*;

    #[test]
    fn defaults_target_local_server() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.server_addr(), "127.0.0.1:8080");
        assert_eq!(config.mode, WireMode::Framed);
        assert_eq!(config.read_timeout, None);
    }

    #[test]
    fn reads_overrides() {
        let config = ClientConfig::from_lookup(|key| match key {
            "PARLEY_PORT" => Some("9100".into()),
            "PARLEY_WIRE_MODE" => Some("LEGACY".into()),
            "PARLEY_DOWNLOAD_DIR" => Some("/tmp/inbox".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.server_addr(), "127.0.0.1:9100");
        assert_eq!(config.mode, WireMode::Legacy);
        assert_eq!(config.download_dir, PathBuf::from("/tmp/inbox"));

        assert!(ClientConfig::from_lookup(|key| (key == "PARLEY_PORT").then(|| "-1".into())).is_err());
    }
}
