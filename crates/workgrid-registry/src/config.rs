//! Workgrid configuration
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file
//! (`WORKGRID_CONFIG`, default `workgrid.toml`), then `WORKGRID_*`
//! environment variables with `__` between nested keys, e.g.
//! `WORKGRID_SELECTION__WEIGHTED_QUORUMS=0,2`.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use workgrid_common::{Address, QuorumNumber};

use crate::coordinator::CoordinatorSettings;
use crate::strategy::RestakeableScope;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "WORKGRID_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "workgrid.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkgridConfig {
    /// Tracing filter used when `RUST_LOG` is unset
    pub log_filter: String,
    pub selection: SelectionSettings,
    pub strategies: StrategySettings,
    pub coordinator: CoordinatorConfig,
    pub feed: ChannelSettings,
    pub events: ChannelSettings,
    pub bootstrap: BootstrapSettings,
}

impl Default for WorkgridConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            selection: SelectionSettings::default(),
            strategies: StrategySettings::default(),
            coordinator: CoordinatorConfig::default(),
            feed: ChannelSettings { channel_capacity: 256 },
            events: ChannelSettings {
                channel_capacity: 1024,
            },
            bootstrap: BootstrapSettings::default(),
        }
    }
}

/// Selection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// Quorums selecting by stake weight
    pub weighted_quorums: Vec<QuorumNumber>,
    pub detect_stale_snapshots: bool,
    /// Quorum used when a request names none
    pub default_quorum: QuorumNumber,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            weighted_quorums: Vec::new(),
            detect_stale_snapshots: true,
            default_quorum: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    /// Scope of the restakeable strategy list; unset means every quorum
    pub restakeable_quorum: Option<QuorumNumber>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub worker_mgt_address: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub channel_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Addresses whitelisted at start-up
    pub whitelist: Vec<Address>,
}

impl WorkgridConfig {
    /// Load configuration from `.env`, the config file, and environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load with an explicit config file path; a missing file is skipped
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("WORKGRID")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("selection.weighted_quorums")
                    .with_list_parse_key("bootstrap.whitelist"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            weighted_quorums: self.selection.weighted_quorums.iter().copied().collect(),
            detect_stale_snapshots: self.selection.detect_stale_snapshots,
            restakeable_scope: RestakeableScope::from(self.strategies.restakeable_quorum),
            worker_mgt_address: self.coordinator.worker_mgt_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkgridConfig::default();
        assert_eq!(config.log_filter, "info");
        assert!(config.selection.detect_stale_snapshots);
        assert_eq!(config.feed.channel_capacity, 256);
        assert_eq!(config.events.channel_capacity, 1024);

        let settings = config.coordinator_settings();
        assert_eq!(settings.restakeable_scope, RestakeableScope::AllQuorums);
        assert!(settings.weighted_quorums.is_empty());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = WorkgridConfig::load_from(Path::new("/nonexistent/workgrid.toml")).unwrap();
        assert_eq!(config.events.channel_capacity, 1024);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("workgrid-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
log_filter = "debug"

[selection]
weighted_quorums = [0, 2]
detect_stale_snapshots = false

[strategies]
restakeable_quorum = 1

[coordinator]
worker_mgt_address = "0x0101010101010101010101010101010101010101"

[bootstrap]
whitelist = ["0x0202020202020202020202020202020202020202"]
"#,
        )
        .unwrap();

        let config = WorkgridConfig::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.selection.weighted_quorums, vec![0, 2]);
        assert_eq!(config.bootstrap.whitelist, vec![Address([2u8; 20])]);

        let settings = config.coordinator_settings();
        assert!(!settings.detect_stale_snapshots);
        assert_eq!(settings.restakeable_scope, RestakeableScope::Quorum(1));
        assert_eq!(settings.worker_mgt_address, Some(Address([1u8; 20])));
        // Untouched sections keep their defaults
        assert_eq!(config.feed.channel_capacity, 256);
    }
}
