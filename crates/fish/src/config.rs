//! Layered configuration (§6.4): compile-time defaults → TOML file(s) →
//! `FISH__`-prefixed environment variables with `__` as the nesting
//! separator, the same three-source order `ClusterConfig::load()` uses.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FishConfig {
    pub core: CoreConfig,
    #[serde(default)]
    pub drivers: HashMap<String, Value>,
    #[serde(default)]
    pub gates: HashMap<String, Value>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreConfig {
    pub api_address: String,
    pub node_name: String,
    #[serde(default)]
    pub node_location: String,
    pub node_address: String,
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: String,
    pub db_path: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_election_window")]
    pub election_window: u64,
    #[serde(default = "default_retry_cap")]
    pub allocation_retry_cap: u32,
}

fn default_ping_interval() -> u64 {
    10
}

fn default_election_window() -> u64 {
    5
}

fn default_retry_cap() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,fish=debug".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for FishConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig {
                api_address: "0.0.0.0:8443".to_string(),
                node_name: "fish-node".to_string(),
                node_location: String::new(),
                node_address: "127.0.0.1:8443".to_string(),
                cert_path: "fish_data/node.crt".to_string(),
                key_path: "fish_data/node.key".to_string(),
                ca_path: "fish_data/ca.crt".to_string(),
                db_path: "fish_data/db".to_string(),
                ping_interval: default_ping_interval(),
                election_window: default_election_window(),
                allocation_retry_cap: default_retry_cap(),
            },
            drivers: HashMap::new(),
            gates: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FishConfig {
    /// Loads `fish.toml` (or a path given by `FISH_CONFIG`) layered over
    /// compile-time defaults, then `FISH__`-prefixed environment
    /// variables on top (§6.4).
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&FishConfig::default())
            .context("failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            for candidate in ["fish", "/etc/fish/fish", "config/fish"] {
                builder = builder.add_source(config::File::with_name(candidate).required(false));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FISH")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.core
            .node_address
            .parse::<std::net::SocketAddr>()
            .or_else(|_| {
                // Accept host:port that isn't a literal IP too (e.g. a
                // container hostname); only reject completely malformed
                // values.
                if self.core.node_address.contains(':') {
                    Ok(std::net::SocketAddr::from(([0, 0, 0, 0], 0)))
                } else {
                    anyhow::bail!("node_address must be host:port")
                }
            })
            .context("invalid core.node_address")?;

        if self.core.node_name.is_empty() {
            anyhow::bail!("core.node_name must not be empty");
        }
        if self.core.ping_interval == 0 {
            anyhow::bail!("core.ping_interval must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = FishConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_node_name() {
        let mut config = FishConfig::default();
        config.core.node_name.clear();
        assert!(config.validate().is_err());
    }
}
