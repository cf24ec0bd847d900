//! Configuration loading for the task controller.
//!
//! All controller settings are loaded from a TOML configuration file. Every
//! section is optional and falls back to its defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Complete controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Request handling and broadcast settings
    #[serde(default)]
    pub controller: GeneralConfig,
    /// Routine task selection settings
    #[serde(default)]
    pub routine: RoutineConfig,
    /// Multi-actor move order settings
    #[serde(default)]
    pub move_orders: MoveOrderConfig,
}

impl ControllerConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parses configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serializes this configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Request handling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Send TaskInfo to every permitted controller when an actor's task changes
    pub broadcast_task_info: bool,
    /// Actors beyond this count in a single request are ignored
    pub max_actors_per_request: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            broadcast_task_info: true,
            max_actors_per_request: 64,
        }
    }
}

/// Routine task selection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutineConfig {
    /// Run routine selection for idle actors at all
    pub enabled: bool,
    /// Seconds between routine scans of the same idle actor
    pub scan_interval: f64,
    /// Minimum seconds before a `finish_on_failed` entry is retried
    pub failed_retry_delay: f64,
}

impl RoutineConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.scan_interval).unwrap_or_default()
    }

    pub fn failed_retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.failed_retry_delay).unwrap_or_default()
    }
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval: 1.0,
            failed_retry_delay: 5.0,
        }
    }
}

/// What to do with an actor when a move order finds no free tile for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrowdingPolicy {
    /// Send the actor to the requested tile anyway
    #[default]
    Stack,
    /// Leave the actor out of the order
    Skip,
    /// Reject the whole order
    Fail,
}

/// Multi-actor move order settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveOrderConfig {
    /// How many rings of tiles around the destination to search
    pub search_radius: u32,
    /// Policy when the search finds nothing
    pub crowding: CrowdingPolicy,
}

impl Default for MoveOrderConfig {
    fn default() -> Self {
        Self {
            search_radius: 3,
            crowding: CrowdingPolicy::Stack,
        }
    }
}

/// Generates a default configuration file content.
pub fn default_config_toml() -> String {
    r#"# Task Controller Configuration

[controller]
broadcast_task_info = true
max_actors_per_request = 64

[routine]
enabled = true
scan_interval = 1.0
failed_retry_delay = 5.0

[move_orders]
search_radius = 3
crowding = "stack"
"#
    .to_string()
}
