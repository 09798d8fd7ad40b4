//! Entries of the gateway's own bridge entity.
//!
//! The bridge is named `bridge`, so its state topics live below
//! `{base_topic}/bridge`. Requests go to `{base_topic}/bridge/request/...`,
//! which are absolute and therefore set as literal command topics.

use meshbridge_common::Platform;
use serde_json::json;

use crate::{config::DiscoveryConfig, entry::DiscoveryEntry};

pub fn entries(config: &DiscoveryConfig) -> Vec<DiscoveryEntry> {
    let request = |path: &str| format!("{}/bridge/request/{path}", config.base_topic);

    vec![
        DiscoveryEntry::new(
            Platform::BinarySensor,
            "connection_state",
            json!({
                "name": "Connection state",
                "device_class": "connectivity",
                "entity_category": "diagnostic",
                "state_topic": true,
                "state_topic_postfix": "state",
                "value_template": "{{ value_json.state }}",
                "payload_on": "online",
                "payload_off": "offline",
                "availability": false,
            }),
        ),
        DiscoveryEntry::new(
            Platform::BinarySensor,
            "restart_required",
            json!({
                "name": "Restart required",
                "device_class": "problem",
                "entity_category": "diagnostic",
                "enabled_by_default": false,
                "state_topic": true,
                "state_topic_postfix": "info",
                "value_template": "{{ value_json.restart_required }}",
                "payload_on": true,
                "payload_off": false,
            }),
        ),
        DiscoveryEntry::new(
            Platform::Button,
            "restart",
            json!({
                "name": "Restart",
                "device_class": "restart",
                "state_topic": false,
                "command_topic": request("restart"),
                "payload_press": "",
            }),
        ),
        DiscoveryEntry::new(
            Platform::Select,
            "log_level",
            json!({
                "name": "Log level",
                "entity_category": "config",
                "state_topic": true,
                "state_topic_postfix": "info",
                "value_template": "{{ value_json.log_level | lower }}",
                "command_topic": request("options"),
                "command_template": "{\"options\": {\"advanced\": {\"log_level\": \"{{ value }}\" } } }",
                "options": config.log_levels,
            }),
        ),
        DiscoveryEntry::new(
            Platform::Sensor,
            "version",
            json!({
                "name": "Version",
                "icon": "mdi:zigbee",
                "entity_category": "diagnostic",
                "state_topic": true,
                "state_topic_postfix": "info",
                "value_template": "{{ value_json.version }}",
            }),
        ),
        DiscoveryEntry::new(
            Platform::Sensor,
            "coordinator_version",
            json!({
                "name": "Coordinator version",
                "icon": "mdi:chip",
                "entity_category": "diagnostic",
                "enabled_by_default": false,
                "state_topic": true,
                "state_topic_postfix": "info",
                "value_template": "{{ value_json.coordinator.meta.revision }}",
            }),
        ),
        DiscoveryEntry::new(
            Platform::Sensor,
            "network_map",
            json!({
                "name": "Network map",
                "entity_category": "diagnostic",
                "enabled_by_default": false,
                "state_topic": true,
                "state_topic_postfix": "response/networkmap",
                "value_template": "{{ now().strftime('%Y-%m-%d %H:%M:%S') }}",
                "json_attributes_topic": true,
                "json_attributes_template": "{{ value_json.data.value | tojson }}",
            }),
        ),
        DiscoveryEntry::new(
            Platform::Switch,
            "permit_join",
            json!({
                "name": "Permit join",
                "icon": "mdi:human-greeting-proximity",
                "state_topic": true,
                "state_topic_postfix": "info",
                "value_template": "{{ value_json.permit_join | lower }}",
                "command_topic": request("permit_join"),
                "payload_on": "{\"time\": 254}",
                "payload_off": "{\"time\": 0}",
                "state_on": "true",
                "state_off": "false",
            }),
        ),
    ]
}
