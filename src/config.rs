//! Server configuration
//!
//! Defaults, then an optional JSON file named by `BOMB_ARENA_CONFIG`, then
//! individual environment overrides.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::network::room::RoomConfig;
use crate::{ticks_from_millis, DEFAULT_PORT, MAX_ROOM_PLAYERS, TICK_MILLIS};

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_VAR: &str = "BOMB_ARENA_CONFIG";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Players per room.
    pub max_room_players: usize,
    /// Match length in seconds.
    pub match_seconds: u64,
    /// Lines buffered per client before sends are dropped.
    pub outbound_queue: usize,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            max_room_players: MAX_ROOM_PLAYERS,
            match_seconds: 180,
            outbound_queue: 256,
            log_filter: "info".to_string(),
        }
    }
}

/// Partial config as read from a JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    bind_addr: Option<SocketAddr>,
    max_connections: Option<usize>,
    max_room_players: Option<usize>,
    match_seconds: Option<u64>,
    outbound_queue: Option<usize>,
    log_filter: Option<String>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Config file is not valid JSON for this schema.
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value for {name}: {value}")]
    InvalidVar {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// A value parsed but is unusable.
    #[error("Invalid setting: {0}")]
    Invalid(&'static str),
}

impl ServerConfig {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|name| env::var(name).ok())
    }

    /// Load using a custom variable lookup.
    pub fn load_with<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = var(CONFIG_PATH_VAR) {
            config.apply_file(Path::new(&path))?;
        }

        if let Some(addr) = var("BOMB_ARENA_ADDR") {
            config.bind_addr = parse_var("BOMB_ARENA_ADDR", addr)?;
        } else if let Some(port) = var("PORT") {
            let port: u16 = parse_var("PORT", port)?;
            config.bind_addr.set_port(port);
        }
        if let Some(v) = var("BOMB_ARENA_MAX_CONNECTIONS") {
            config.max_connections = parse_var("BOMB_ARENA_MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = var("BOMB_ARENA_MATCH_SECONDS") {
            config.match_seconds = parse_var("BOMB_ARENA_MATCH_SECONDS", v)?;
        }
        if let Some(v) = var("BOMB_ARENA_LOG") {
            config.log_filter = v;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply_json(&text)
    }

    fn apply_json(&mut self, text: &str) -> Result<(), ConfigError> {
        let file: ConfigFile = serde_json::from_str(text)?;

        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file.max_connections {
            self.max_connections = v;
        }
        if let Some(v) = file.max_room_players {
            self.max_room_players = v;
        }
        if let Some(v) = file.match_seconds {
            self.match_seconds = v;
        }
        if let Some(v) = file.outbound_queue {
            self.outbound_queue = v;
        }
        if let Some(v) = file.log_filter {
            self.log_filter = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_room_players == 0 {
            return Err(ConfigError::Invalid("max_room_players must be at least 1"));
        }
        if self.match_seconds == 0 {
            return Err(ConfigError::Invalid("match_seconds must be at least 1"));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid("outbound_queue must be at least 1"));
        }
        Ok(())
    }

    /// Room settings derived from this config.
    pub fn room_config(&self) -> RoomConfig {
        let mut room = RoomConfig {
            max_players: self.max_room_players,
            tick_period: Duration::from_millis(TICK_MILLIS),
            ..RoomConfig::default()
        };
        room.match_config.duration_ticks = ticks_from_millis(self.match_seconds * 1000);
        room
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidVar { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::load_with(vars(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.max_room_players, 4);
        assert_eq!(config.room_config().match_config.duration_ticks, 11_250);
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::load_with(vars(&[
            ("BOMB_ARENA_ADDR", "127.0.0.1:6000"),
            ("BOMB_ARENA_MATCH_SECONDS", "60"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.room_config().match_config.duration_ticks, 3_750);
    }

    #[test]
    fn test_port_override() {
        let config = ServerConfig::load_with(vars(&[("PORT", "7777")])).unwrap();
        assert_eq!(config.bind_addr.port(), 7777);
    }

    #[test]
    fn test_bad_env_value() {
        let err = ServerConfig::load_with(vars(&[("BOMB_ARENA_MAX_CONNECTIONS", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { name: "BOMB_ARENA_MAX_CONNECTIONS", .. }));
    }

    #[test]
    fn test_json_overlay() {
        let mut config = ServerConfig::default();
        config
            .apply_json(r#"{ "max_room_players": 2, "log_filter": "debug" }"#)
            .unwrap();
        assert_eq!(config.max_room_players, 2);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.max_connections, 1000);
    }

    #[test]
    fn test_json_rejects_unknown_fields() {
        let mut config = ServerConfig::default();
        assert!(matches!(
            config.apply_json(r#"{ "tick_rate": 30 }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::load_with(vars(&[(CONFIG_PATH_VAR, "/nonexistent/bomb-arena.json")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_zero_room_size_rejected() {
        let mut config = ServerConfig::default();
        config.apply_json(r#"{ "max_room_players": 0 }"#).unwrap();
        assert!(config.validate().is_err());
    }
}
