use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Hub status topic Home Assistant uses when none is configured.
pub const DEFAULT_STATUS_TOPIC: &str = "homeassistant/status";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Root of every state and command topic
    pub base_topic: String,
    /// Prefix Home Assistant reads discovery configs from
    pub discovery_topic: String,
    /// Topic Home Assistant announces `online` on
    pub status_topic: String,
    pub output: OutputMode,
    pub legacy_action_sensor: bool,
    pub legacy_api: bool,
    /// Point `json_attributes_topic` at the state topic
    pub entity_attributes: bool,
    /// Per-entity availability tracking, overridable per entity
    pub availability: bool,
    pub last_seen: LastSeen,
    pub frontend_url: Option<String>,
    /// Gateway version reported in `origin` and the bridge device
    pub version: String,
    pub log_levels: Vec<String>,
    pub timing: Timing,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_topic: "meshbridge".into(),
            discovery_topic: "homeassistant".into(),
            status_topic: DEFAULT_STATUS_TOPIC.into(),
            output: OutputMode::Json,
            legacy_action_sensor: false,
            legacy_api: true,
            entity_attributes: true,
            availability: false,
            last_seen: LastSeen::Disable,
            frontend_url: None,
            version: env!("CARGO_PKG_VERSION").into(),
            log_levels: ["error", "warning", "info", "debug"].map(String::from).into(),
            timing: Timing::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output == OutputMode::Attribute {
            return Err(Error::AttributeOutput);
        }

        if self.discovery_topic == self.base_topic {
            return Err(Error::DiscoveryTopicIsBaseTopic(self.base_topic.clone()));
        }

        Ok(())
    }

    pub fn bridge_state_topic(&self) -> String {
        format!("{}/bridge/state", self.base_topic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Json,
    Attribute,
    AttributeAndJson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastSeen {
    #[serde(rename = "disable")]
    Disable,
    #[serde(rename = "ISO_8601", alias = "iso_8601")]
    Iso8601,
    #[serde(rename = "ISO_8601_local", alias = "iso_8601_local")]
    Iso8601Local,
    #[serde(rename = "epoch")]
    Epoch,
}

impl LastSeen {
    pub fn is_timestamp(self) -> bool {
        matches!(self, LastSeen::Iso8601 | LastSeen::Iso8601Local)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Wait for retained discovery configs before the first publishing sweep
    pub startup_grace_ms: u64,
    /// Wait between retracting and recreating entries on rename
    pub recreate_delay_ms: u64,
    /// Wait after the hub comes online before republishing states
    pub republish_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            startup_grace_ms: 5_000,
            recreate_delay_ms: 2_000,
            republish_delay_ms: 30_000,
        }
    }
}

impl Timing {
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn recreate_delay(&self) -> Duration {
        Duration::from_millis(self.recreate_delay_ms)
    }

    pub fn republish_delay(&self) -> Duration {
        Duration::from_millis(self.republish_delay_ms)
    }
}
