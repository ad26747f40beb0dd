//! Configuration loading and validation.
//!
//! Configuration is TOML, loaded once at startup. Every section has working
//! defaults so a minimal file (or none for development) boots a server.

use chatter_proto::{DeletePolicy, ReactionPolicy};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Placeholder secret shipped in the example config. Startup refuses it.
pub const INSECURE_SECRET: &str = "change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub policy: PolicyConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// WebSocket listener address.
    pub listen: SocketAddr,
    /// Optional TLS termination for the listener.
    pub tls: Option<TlsConfig>,
    /// Prometheus scrape port; 0 disables the endpoint (used by tests).
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8765".parse().expect("default listen addr"),
            tls: None,
            metrics_port: 9090,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// HS256 secret for verifying bearer tokens issued by the auth service.
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: INSECURE_SECRET.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite path, or ":memory:" for an ephemeral store.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "chatterd.db".to_string(),
        }
    }
}

/// Knobs for the message/group state machine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Seconds after creation during which the sender may recall a message.
    /// Group admins are exempt.
    pub recall_window_secs: u64,
    pub reaction_direct: ReactionPolicy,
    pub reaction_group: ReactionPolicy,
    pub delete_direct: DeletePolicy,
    pub delete_group: DeletePolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            recall_window_secs: 120,
            reaction_direct: ReactionPolicy::Replace,
            reaction_group: ReactionPolicy::Toggle,
            delete_direct: DeletePolicy::Hard,
            delete_group: DeletePolicy::Soft,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Outbound event queue depth per connection; slow consumers that fall
    /// further behind are disconnected.
    pub outbound_queue: usize,
    /// Maximum members accepted in a createGroup intent.
    pub max_group_members: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            max_group_members: 256,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Whether the configured secret is the shipped placeholder.
    pub fn has_insecure_secret(&self) -> bool {
        self.auth.jwt_secret == INSECURE_SECRET || self.auth.jwt_secret.len() < 16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.policy.recall_window_secs, 120);
        assert_eq!(config.policy.reaction_direct, ReactionPolicy::Replace);
        assert_eq!(config.policy.reaction_group, ReactionPolicy::Toggle);
        assert_eq!(config.policy.delete_direct, DeletePolicy::Hard);
        assert_eq!(config.policy.delete_group, DeletePolicy::Soft);
        assert!(config.has_insecure_secret());
    }

    #[test]
    fn parses_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [server]
            listen = "0.0.0.0:9000"
            metrics_port = 0

            [auth]
            jwt_secret = "a-long-enough-real-secret"

            [policy]
            recall_window_secs = 60
            reaction_group = "replace"
            "#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.server.metrics_port, 0);
        assert_eq!(config.policy.recall_window_secs, 60);
        assert_eq!(config.policy.reaction_group, ReactionPolicy::Replace);
        // Untouched sections keep defaults.
        assert_eq!(config.limits.outbound_queue, 256);
        assert!(!config.has_insecure_secret());
    }

    #[test]
    fn rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server]\nlisten = \"0.0.0.0:9000\"\ntyp0 = true\n").unwrap();
        assert!(matches!(
            Config::load(file.path().to_str().unwrap()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
