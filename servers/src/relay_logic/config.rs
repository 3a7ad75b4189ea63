use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lib_common::core::{DEFAULT_PORT, DEFAULT_RECONNECT_INTERVAL};
use lib_common::ingestors::DEFAULT_CONNECT_TIMEOUT;

const DEFAULT_CONFIG_FILE: &str = "server_relay.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Live event relay: upstream live room -> local WebSocket clients", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "RELAY_PORT", help = "Port to listen on for display clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "RELAY_BIND", help = "Address to bind the client listener to.")]
    pub bind_address: Option<String>,

    #[clap(long, env = "RELAY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "RELAY_TARGET", help = "Live room (creator handle) to subscribe to at startup.")]
    pub target: Option<String>,

    #[clap(long, env = "RELAY_UPSTREAM_URL", help = "WebSocket URL of the live event bridge.")]
    pub upstream_url: Option<String>,

    #[clap(long, env = "RELAY_RECONNECT_INTERVAL_MS", help = "Fixed delay in milliseconds between upstream reconnect attempts.")]
    pub reconnect_interval_ms: Option<u64>,

    #[clap(long, env = "RELAY_CONNECT_TIMEOUT_MS", help = "How long in milliseconds to wait for the bridge to confirm a room.")]
    pub connect_timeout_ms: Option<u64>,
}

/// Fully resolved settings, every value present.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub listen_addr: SocketAddr,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub target: Option<String>,
    pub upstream_url: String,
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            bind_address: other.bind_address.or(self.bind_address),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            target: other.target.or(self.target),
            upstream_url: other.upstream_url.or(self.upstream_url),
            reconnect_interval_ms: other.reconnect_interval_ms.or(self.reconnect_interval_ms),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(DEFAULT_PORT),
            bind_address: Some("127.0.0.1".to_string()),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            upstream_url: Some("ws://127.0.0.1:21213/live".to_string()),
            reconnect_interval_ms: Some(DEFAULT_RECONNECT_INTERVAL.as_millis() as u64),
            connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT.as_millis() as u64),
            ..Default::default()
        }
    }

    /// Turns the merged options into concrete settings.
    pub fn resolve(self) -> Result<RelaySettings> {
        let defaults = Config::defaults();
        let merged = defaults.merge(self);

        let bind = merged.bind_address.unwrap_or_default();
        let ip: IpAddr = bind
            .parse()
            .with_context(|| format!("invalid bind address `{}`", bind))?;

        Ok(RelaySettings {
            listen_addr: SocketAddr::new(ip, merged.port.unwrap_or(DEFAULT_PORT)),
            log_dir: merged.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: merged.log_level.unwrap_or_else(|| "info".to_string()),
            target: merged.target.filter(|t| !t.trim().is_empty()),
            upstream_url: merged.upstream_url.unwrap_or_default(),
            reconnect_interval: merged
                .reconnect_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RECONNECT_INTERVAL),
            connect_timeout: merged
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        })
    }
}

/// Reads a JSON config file. Missing or broken files yield `None`.
fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str::<Config>(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults < config file < environment/CLI.
pub fn load_config_from(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current = current.merge(file_config);
    }
    current.merge(cli)
}

pub fn load_config() -> Config {
    load_config_from(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let settings = Config::default().resolve().unwrap();
        assert_eq!(settings.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(settings.reconnect_interval, Duration::from_millis(10_000));
        assert_eq!(settings.connect_timeout, Duration::from_secs(15));
        assert_eq!(settings.target, None);
    }

    #[test]
    fn test_cli_beats_file_beats_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.conf");
        fs::write(&path, r#"{"port": 9100, "target": "alice", "reconnectIntervalMs": 2500}"#).unwrap();

        let cli = Config::try_parse_from([
            "server_relay",
            "--config-path",
            path.to_str().unwrap(),
            "--target",
            "bob",
        ])
        .unwrap();
        let settings = load_config_from(cli).resolve().unwrap();

        assert_eq!(settings.listen_addr.port(), 9100);
        assert_eq!(settings.target.as_deref(), Some("bob"));
        assert_eq!(settings.reconnect_interval, Duration::from_millis(2500));
    }

    #[test]
    fn test_connect_timeout_layers_like_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.conf");
        fs::write(&path, r#"{"connectTimeoutMs": 4000}"#).unwrap();

        let from_file = Config {
            config_path: Some(path.clone()),
            ..Default::default()
        };
        let settings = load_config_from(from_file).resolve().unwrap();
        assert_eq!(settings.connect_timeout, Duration::from_millis(4000));

        let cli = Config::try_parse_from([
            "server_relay",
            "--config-path",
            path.to_str().unwrap(),
            "--connect-timeout-ms",
            "750",
        ])
        .unwrap();
        let settings = load_config_from(cli).resolve().unwrap();
        assert_eq!(settings.connect_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_broken_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.conf");
        fs::write(&path, "{ not json").unwrap();

        let cli = Config {
            config_path: Some(path),
            ..Default::default()
        };
        assert_eq!(load_config_from(cli).port, Some(DEFAULT_PORT));
    }

    #[test]
    fn test_invalid_bind_address() {
        let config = Config {
            bind_address: Some("not-an-ip".into()),
            ..Default::default()
        };
        assert!(config.resolve().is_err());
    }
}
