use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Terminal overlay for the live event relay", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "OVERLAY_SERVER_URL", help = "WebSocket URL of the relay.")]
    pub server_url: Option<String>,

    #[clap(long, env = "OVERLAY_TARGET", help = "Live room to ask the relay to follow once connected.")]
    pub target: Option<String>,

    #[clap(long, env = "OVERLAY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "OVERLAY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "OVERLAY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl Config {
    fn merge(self, other: Config) -> Config {
        Config {
            server_url: other.server_url.or(self.server_url),
            target: other.target.or(self.target),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    pub fn server_url(&self) -> &str {
        self.server_url.as_deref().unwrap_or("ws://127.0.0.1:8080")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("warn")
    }
}

pub fn load_config_from(cli: Config) -> Config {
    let path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("overlay_client.conf"));

    let file_config = fs::read_to_string(&path)
        .ok()
        .and_then(|text| match serde_json::from_str::<Config>(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("Failed to parse config file {}: {}", path.display(), e);
                None
            }
        })
        .unwrap_or_default();

    file_config.merge(cli)
}

pub fn load_config() -> Config {
    load_config_from(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_file_layering() {
        assert_eq!(Config::default().server_url(), "ws://127.0.0.1:8080");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.conf");
        fs::write(&path, r#"{"serverUrl": "ws://10.0.0.2:8080", "target": "alice"}"#).unwrap();

        let cli = Config {
            config_path: Some(path),
            target: Some("bob".into()),
            ..Default::default()
        };
        let config = load_config_from(cli);
        assert_eq!(config.server_url(), "ws://10.0.0.2:8080");
        assert_eq!(config.target.as_deref(), Some("bob"));
        assert_eq!(config.log_level(), "warn");
    }
}
