//! Node configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use svs_core::Name;
use svs_sync::{DataNaming, HandlingPolicy, NamingScheme, SyncConfig, DEFAULT_DATA_MARKER};

use crate::error::{Result, SvsError};

/// Everything needed to open an [`SvsNode`](crate::SvsNode).
///
/// ```json
/// {
///   "source": "/alice",
///   "group": "/ndn/chat",
///   "handling": "equal_traffic",
///   "storage_path": "alice.db",
///   "sync": { "sync_interval": 10000 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The source this node publishes as.
    pub source: Name,
    /// The sync group prefix.
    pub group: Name,
    #[serde(default)]
    pub naming: NamingScheme,
    /// Data-type marker component. `null` omits it.
    #[serde(default = "default_marker")]
    pub data_marker: Option<String>,
    #[serde(default)]
    pub handling: HandlingPolicy,
    /// Keep packets fetched from other sources so this node can serve them.
    #[serde(default)]
    pub cache_others: bool,
    /// SQLite database for packets. Packets live in memory when absent.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_marker() -> Option<String> {
    Some(DEFAULT_DATA_MARKER.to_string())
}

impl NodeConfig {
    /// Defaults for everything but the names.
    pub fn new(source: Name, group: Name) -> Self {
        Self {
            source,
            group,
            naming: NamingScheme::default(),
            data_marker: default_marker(),
            handling: HandlingPolicy::default(),
            cache_others: false,
            storage_path: None,
            sync: SyncConfig::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.is_empty() {
            return Err(SvsError::Config("source must not be empty".into()));
        }
        if self.group.is_empty() {
            return Err(SvsError::Config("group must not be empty".into()));
        }
        if matches!(self.data_marker.as_deref(), Some("")) {
            return Err(SvsError::Config("data_marker must not be empty".into()));
        }
        self.sync.validate()?;
        Ok(())
    }

    /// Data naming derived from the group, scheme and marker.
    pub fn data_naming(&self) -> DataNaming {
        DataNaming::new(self.group.clone(), self.naming).with_marker(self.data_marker.as_deref())
    }
}
