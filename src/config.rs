//! Configuration structures
//!
//! Loaded from `orchestra.toml`. Every section has defaults, so an empty
//! or missing file yields a working auto-assign node.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::LinkAddress;
use crate::role::{RoleSource, RoleStore};

/// File name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "orchestra.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub sync: SyncConfig,
}

/// Identity of this node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Fixed link address; random when absent
    pub address: Option<LinkAddress>,

    /// Prefix of the display name, followed by the role name
    pub name_prefix: String,

    /// How the role is provisioned at boot
    pub role: RoleSource,

    /// Write a role granted at runtime to the role file
    pub persist_role: bool,

    /// Where the role is stored; platform data directory when absent
    pub role_file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: None,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            role: RoleSource::Auto,
            persist_role: true,
            role_file: None,
        }
    }
}

impl NodeConfig {
    /// Where the assigned role lives, if a location is known
    pub fn role_store(&self) -> Option<RoleStore> {
        self.role_file
            .clone()
            .or_else(RoleStore::default_path)
            .map(RoleStore::new)
    }
}

/// UDP link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub broadcast_address: String,
    pub port: u16,
    /// Peers the link learns socket addresses for
    pub max_peers: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            broadcast_address: "255.255.255.255".to_string(),
            port: DEFAULT_UDP_PORT,
            max_peers: DEFAULT_MAX_LINK_PEERS,
        }
    }
}

/// Discovery worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub announce_period_ms: u64,
    pub peer_timeout_ms: u64,
    pub peer_capacity: usize,
    pub queue_depth: usize,
    /// Delay between the first announce and the role request
    pub role_request_delay_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            announce_period_ms: DEFAULT_ANNOUNCE_PERIOD_MS,
            peer_timeout_ms: DEFAULT_PEER_TIMEOUT_MS,
            peer_capacity: DEFAULT_PEER_CAPACITY,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            role_request_delay_ms: DEFAULT_ROLE_REQUEST_DELAY_MS,
        }
    }
}

impl DiscoveryConfig {
    pub fn announce_period(&self) -> Duration {
        Duration::from_millis(self.announce_period_ms)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn role_request_delay(&self) -> Duration {
        Duration::from_millis(self.role_request_delay_ms)
    }
}

/// Clock sync and scheduled start settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub heartbeat_period_ms: u64,
    /// How far ahead of now the conductor schedules a start
    pub lead_time_ms: u64,
    pub queue_depth: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_period_ms: DEFAULT_HEARTBEAT_PERIOD_MS,
            lead_time_ms: DEFAULT_LEAD_TIME_MS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl SyncConfig {
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }

    pub fn lead_time(&self) -> Duration {
        Duration::from_millis(self.lead_time_ms)
    }
}

impl AppConfig {
    /// Default config path in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "ensemble", "ensemble-sync")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from an explicit path, or from the default path if it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    tracing::info!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject settings the workers cannot run with
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 8] = [
            (self.discovery.announce_period_ms == 0, "discovery.announce_period_ms must be > 0"),
            (self.discovery.peer_timeout_ms == 0, "discovery.peer_timeout_ms must be > 0"),
            (self.discovery.peer_capacity == 0, "discovery.peer_capacity must be > 0"),
            (self.discovery.queue_depth == 0, "discovery.queue_depth must be > 0"),
            (self.sync.heartbeat_period_ms == 0, "sync.heartbeat_period_ms must be > 0"),
            (self.sync.lead_time_ms == 0, "sync.lead_time_ms must be > 0"),
            (self.sync.queue_depth == 0, "sync.queue_depth must be > 0"),
            (self.network.max_peers == 0, "network.max_peers must be > 0"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(Error::Config(message.to_string())),
            None => Ok(()),
        }
    }
}
