use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dcs_protocol::Permission;
use serde::Deserialize;

/// Daemon configuration: socket path, protocol version, subscribe queue
/// bound, lock-wait timeout, and the static uid-to-permission-set
/// authorization table. Loaded from a TOML file, then overridden by
/// `DCS_*` environment variables so deployments don't need a config file
/// just to change the socket path.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,

    #[serde(default = "default_subscribe_queue_bound")]
    pub subscribe_queue_bound: usize,

    #[serde(default = "default_lock_wait_timeout_secs")]
    pub lock_wait_timeout_secs: u64,

    /// uid -> permission set, the authorization stand-in for a full
    /// identity store.
    #[serde(default)]
    pub authorization: HashMap<u32, HashSet<Permission>>,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/run/dsf/dcs.sock")
}

fn default_protocol_version() -> u32 {
    dcs_protocol::PROTOCOL_VERSION
}

fn default_subscribe_queue_bound() -> usize {
    64
}

fn default_lock_wait_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            protocol_version: default_protocol_version(),
            subscribe_queue_bound: default_subscribe_queue_bound(),
            lock_wait_timeout_secs: default_lock_wait_timeout_secs(),
            authorization: HashMap::new(),
        }
    }
}

impl Config {
    /// Load from a TOML file at `path`, or fall back to defaults if the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DCS_SOCKET_PATH") {
            self.socket_path = PathBuf::from(path);
        }
        if let Ok(bound) = std::env::var("DCS_SUBSCRIBE_QUEUE_BOUND") {
            if let Ok(bound) = bound.parse() {
                self.subscribe_queue_bound = bound;
            }
        }
        if let Ok(secs) = std::env::var("DCS_LOCK_WAIT_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.lock_wait_timeout_secs = secs;
            }
        }
    }

    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_wait_timeout_secs)
    }

    /// The permission set authorized for `uid`, or empty if the uid has no
    /// entry (an unrecognized peer gets no permissions, not a crash).
    pub fn permissions_for_uid(&self, uid: u32) -> HashSet<Permission> {
        self.authorization.get(&uid).cloned().unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_socket_path() {
        let config = Config::default();
        assert_eq!(config.socket_path, PathBuf::from("/var/run/dsf/dcs.sock"));
        assert_eq!(config.protocol_version, dcs_protocol::PROTOCOL_VERSION);
    }

    #[test]
    fn unrecognized_uid_gets_no_permissions() {
        let config = Config::default();
        assert!(config.permissions_for_uid(12345).is_empty());
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let text = r#"
            socket_path = "/tmp/dcs-test.sock"
            subscribe_queue_bound = 128

            [authorization]
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/dcs-test.sock"));
        assert_eq!(config.subscribe_queue_bound, 128);
    }
}
