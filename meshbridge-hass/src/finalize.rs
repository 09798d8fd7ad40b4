//! Turns relative discovery entries into hub-ready payloads.

use meshbridge_common::{
    Entity, EntityKind,
    topic::{command_topic, encode_base_topic, state_topic},
};
use serde_json::{Map, Value, json};

use crate::{config::DiscoveryConfig, entry::DiscoveryEntry};

const AVAILABILITY_TEMPLATE: &str = "{{ value_json.state }}";

/// Override keys that never apply to the payload itself.
const RESERVED_OVERRIDES: [&str; 3] = ["type", "object_id", "include"];

pub struct Finalizer<'a> {
    config: &'a DiscoveryConfig,
    bridge: &'a Entity,
}

impl<'a> Finalizer<'a> {
    pub fn new(config: &'a DiscoveryConfig, bridge: &'a Entity) -> Self {
        Self { config, bridge }
    }

    pub fn finalize(&self, entry: &DiscoveryEntry, entity: &Entity) -> Map<String, Value> {
        let base = self.config.base_topic.as_str();
        let mut payload = entry.payload.clone();

        let take = |payload: &mut Map<String, Value>, key: &str| match payload.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let state_postfix = take(&mut payload, "state_topic_postfix");
        let command_prefix = take(&mut payload, "command_topic_prefix");
        let command_postfix = take(&mut payload, "command_topic_postfix");
        let object_id_postfix = take(&mut payload, "object_id_postfix");

        let state = state_topic(base, &entity.name, state_postfix.as_deref());
        let command = |postfix: Option<&str>| {
            command_topic(base, &entity.name, command_prefix.as_deref(), postfix)
        };

        match payload.get("state_topic") {
            None | Some(Value::Bool(true)) => {
                payload.insert("state_topic".into(), state.clone().into());
            }
            Some(Value::Bool(false)) => {
                payload.remove("state_topic");
            }
            Some(_) => {}
        }

        let topic_keys = payload
            .keys()
            .filter(|key| key.ends_with("_topic") && *key != "state_topic")
            .cloned()
            .collect::<Vec<_>>();
        for key in topic_keys {
            let is_command = key == "command_topic"
                || key.ends_with("_command_topic")
                || key == "set_position_topic";

            let resolved = match &payload[&key] {
                Value::Bool(false) => {
                    payload.remove(&key);
                    continue;
                }
                Value::Bool(true) if is_command => command(command_postfix.as_deref()),
                Value::Bool(true) => state.clone(),
                Value::String(s) if key.ends_with("_command_topic") => command(Some(s.as_str())),
                _ => continue,
            };
            payload.insert(key, resolved.into());
        }

        if !entity.is_bridge()
            && self.config.entity_attributes
            && !payload.contains_key("json_attributes_topic")
        {
            payload.insert("json_attributes_topic".into(), state.into());
        }

        payload.insert(
            "object_id".into(),
            self.hub_object_id(entry, entity, object_id_postfix.as_deref()).into(),
        );
        payload.insert(
            "unique_id".into(),
            format!("{}_{}_{base}", entity.id, entry.object_id).into(),
        );
        payload.insert("device".into(), self.device_payload(entity));
        payload.insert(
            "origin".into(),
            json!({ "name": "meshbridge", "sw": self.config.version }),
        );

        self.availability(&mut payload, entity);

        if let Some(overrides) = entity.options.homeassistant.custom() {
            apply_overrides(&mut payload, overrides, false);
        }
        if let Some(Some(overrides)) = entity.options.homeassistant.object(&entry.object_id) {
            apply_overrides(&mut payload, overrides, true);
        }

        payload
    }

    fn hub_object_id(&self, entry: &DiscoveryEntry, entity: &Entity, postfix: Option<&str>) -> String {
        let mut id = entity.name.replace([' ', '/'], "_");

        match entry.object_id.strip_prefix(entry.platform.as_str()) {
            Some(rest) => {
                if let Some((_, suffix)) = rest.split_once('_') {
                    id.push('_');
                    id.push_str(suffix);
                }
            }
            None => {
                id.push('_');
                id.push_str(&entry.object_id);
            }
        }

        let mut id = id.to_lowercase();
        if let Some(postfix) = postfix {
            id.push_str(postfix);
        }
        id
    }

    fn availability(&self, payload: &mut Map<String, Value>, entity: &Entity) {
        if payload.get("availability") == Some(&Value::Bool(false)) {
            payload.remove("availability");
            return;
        }

        let template = if entity.options.disabled { "{{ 'offline' }}" } else { AVAILABILITY_TEMPLATE };

        let mut availability = vec![json!({
            "topic": self.config.bridge_state_topic(),
            "value_template": template,
        })];

        let tracked = entity.options.availability.unwrap_or(self.config.availability);
        if tracked && !entity.is_bridge() {
            availability.push(json!({
                "topic": format!("{}/{}/availability", self.config.base_topic, entity.name),
                "value_template": template,
            }));
            payload.insert("availability_mode".into(), "all".into());
        }

        payload.insert("availability".into(), availability.into());
    }

    pub fn device_payload(&self, entity: &Entity) -> Value {
        let mut device = Map::new();
        device.insert("identifiers".into(), json!([self.identifier(entity)]));

        match &entity.kind {
            EntityKind::Device(dev) => {
                device.insert("name".into(), entity.name.clone().into());
                if let Some(definition) = &dev.definition {
                    device.insert(
                        "model".into(),
                        format!("{} ({})", definition.description, definition.model).into(),
                    );
                    device.insert("model_id".into(), definition.model.clone().into());
                    device.insert("manufacturer".into(), definition.vendor.clone().into());
                }
                if let Some(build) = &dev.software_build_id {
                    device.insert("sw_version".into(), build.clone().into());
                }
                if let Some(hw) = dev.hardware_version {
                    device.insert("hw_version".into(), hw.into());
                }
            }
            EntityKind::Group(_) => {
                device.insert("name".into(), entity.name.clone().into());
                device.insert("model".into(), "Group".into());
                device.insert("manufacturer".into(), "meshbridge".into());
            }
            EntityKind::Bridge(bridge) => {
                device.insert("name".into(), "Meshbridge Bridge".into());
                device.insert("model".into(), "Bridge".into());
                device.insert("manufacturer".into(), "meshbridge".into());
                device.insert("sw_version".into(), self.config.version.clone().into());
                if let Some(coordinator) = &bridge.coordinator_type {
                    device.insert("hw_version".into(), coordinator.clone().into());
                }
            }
        }

        if !entity.is_bridge() {
            device.insert("via_device".into(), self.identifier(self.bridge).into());
        }

        if let Some(url) = &self.config.frontend_url {
            let url = url.trim_end_matches('/');
            let page = match &entity.kind {
                EntityKind::Device(dev) => format!("{url}/#/device/{}/info", dev.ieee_address),
                EntityKind::Group(group) => format!("{url}/#/group/{}", group.group_id),
                EntityKind::Bridge(_) => format!("{url}/#/settings"),
            };
            device.insert("configuration_url".into(), page.into());
        }

        Value::Object(device)
    }

    fn identifier(&self, entity: &Entity) -> String {
        match &entity.kind {
            EntityKind::Group(_) => format!(
                "meshbridge_{}_{}",
                encode_base_topic(&self.config.base_topic),
                entity.numeric_id()
            ),
            _ => format!("meshbridge_{}", entity.id),
        }
    }
}

fn apply_overrides(payload: &mut Map<String, Value>, overrides: &Map<String, Value>, with_name: bool) {
    for (key, value) in overrides {
        if RESERVED_OVERRIDES.contains(&key.as_str()) || (!with_name && key == "name") {
            continue;
        }

        match value {
            Value::Null => {
                payload.remove(key);
            }
            Value::Object(device) if key == "device" => {
                if let Some(Value::Object(current)) = payload.get_mut("device") {
                    current.extend(device.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            // per object id overrides and other nested maps
            Value::Object(_) => {}
            value => {
                payload.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use meshbridge_common::{Platform, entity::Definition};

    use super::*;
    use crate::testing::{bridge, definition_with};

    fn config() -> DiscoveryConfig {
        DiscoveryConfig { base_topic: "z2m".into(), version: "1.2.3".into(), ..Default::default() }
    }

    fn light_entry() -> DiscoveryEntry {
        DiscoveryEntry::new(
            Platform::Light,
            "light_l2",
            json!({
                "name": "L2",
                "command_topic": true,
                "command_topic_prefix": "l2",
                "state_topic_postfix": "l2",
                "schema": "json",
            }),
        )
    }

    fn bulb() -> Entity {
        Entity::device(
            "0x0017880100000001",
            "Living Room/Bulb",
            Definition {
                model: "LCT015".into(),
                vendor: "Philips".into(),
                description: "Hue white and color ambiance".into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn resolves_topics_and_identity() {
        let config = config();
        let bridge = bridge();
        let payload = Finalizer::new(&config, &bridge).finalize(&light_entry(), &bulb());

        assert_eq!(
            Value::Object(payload),
            json!({
                "name": "L2",
                "schema": "json",
                "state_topic": "z2m/Living Room/Bulb/l2",
                "command_topic": "z2m/Living Room/Bulb/l2/set",
                "json_attributes_topic": "z2m/Living Room/Bulb/l2",
                "object_id": "living_room_bulb_l2",
                "unique_id": "0x0017880100000001_light_l2_z2m",
                "device": {
                    "identifiers": ["meshbridge_0x0017880100000001"],
                    "name": "Living Room/Bulb",
                    "model": "Hue white and color ambiance (LCT015)",
                    "model_id": "LCT015",
                    "manufacturer": "Philips",
                    "via_device": "meshbridge_bridge_0x00124b0012345678",
                },
                "origin": { "name": "meshbridge", "sw": "1.2.3" },
                "availability": [
                    { "topic": "z2m/bridge/state", "value_template": "{{ value_json.state }}" },
                ],
            })
        );
    }

    #[test]
    fn relative_command_topics() {
        let config = config();
        let bridge = bridge();
        let entry = DiscoveryEntry::new(
            Platform::Climate,
            "climate",
            json!({
                "state_topic": false,
                "mode_command_topic": "system_mode",
                "mode_state_topic": true,
                "set_position_topic": true,
                "current_temperature_topic": false,
            }),
        );

        let payload = Finalizer::new(&config, &bridge).finalize(&entry, &bulb());
        assert!(payload.get("state_topic").is_none());
        assert!(payload.get("current_temperature_topic").is_none());
        assert_eq!(payload["mode_command_topic"], "z2m/Living Room/Bulb/set/system_mode");
        assert_eq!(payload["mode_state_topic"], "z2m/Living Room/Bulb");
        assert_eq!(payload["set_position_topic"], "z2m/Living Room/Bulb/set");
        assert_eq!(payload["object_id"], "living_room_bulb");
    }

    #[test]
    fn availability_and_overrides() {
        let config = DiscoveryConfig { availability: true, ..config() };
        let bridge = bridge();

        let mut entity = definition_with("0x01", "sensor", vec![]);
        entity.options.disabled = true;
        entity.options.homeassistant = meshbridge_common::entity::DiscoveryOverrides::Custom(
            serde_json::from_value(json!({
                "name": "ignored",
                "icon": "mdi:flower",
                "schema": null,
                "device": { "suggested_area": "garden" },
                "light_l2": { "name": "Left" },
            }))
            .unwrap(),
        );

        let payload = Finalizer::new(&config, &bridge).finalize(&light_entry(), &entity);
        assert_eq!(payload["name"], "Left");
        assert_eq!(payload["icon"], "mdi:flower");
        assert!(payload.get("schema").is_none());
        assert_eq!(payload["device"]["suggested_area"], "garden");
        assert_eq!(payload["device"]["name"], "sensor");
        assert_eq!(payload["availability_mode"], "all");
        assert_eq!(
            payload["availability"],
            json!([
                { "topic": "z2m/bridge/state", "value_template": "{{ 'offline' }}" },
                { "topic": "z2m/sensor/availability", "value_template": "{{ 'offline' }}" },
            ])
        );
    }

    #[test]
    fn bridge_and_group_devices() {
        let config = DiscoveryConfig { frontend_url: Some("http://gw:8080/".into()), ..config() };
        let bridge = bridge();
        let finalizer = Finalizer::new(&config, &bridge);

        let device = finalizer.device_payload(&bridge);
        assert_eq!(device["name"], "Meshbridge Bridge");
        assert_eq!(device["configuration_url"], "http://gw:8080/#/settings");
        assert!(device.get("via_device").is_none());

        let group = Entity::group(7, "lounge", vec![]);
        let device = finalizer.device_payload(&group);
        assert_eq!(device["identifiers"], json!(["meshbridge_12250109_7"]));
        assert_eq!(device["model"], "Group");
        assert_eq!(device["configuration_url"], "http://gw:8080/#/group/7");

        let entry = DiscoveryEntry::new(
            Platform::BinarySensor,
            "connection_state",
            json!({ "availability": false, "state_topic_postfix": "state" }),
        );
        let payload = finalizer.finalize(&entry, &bridge);
        assert!(payload.get("availability").is_none());
        assert!(payload.get("json_attributes_topic").is_none());
        assert_eq!(payload["state_topic"], "z2m/bridge/state");
        assert_eq!(payload["object_id"], "bridge_connection_state");
    }

    #[test]
    fn object_id_postfix() {
        let config = config();
        let bridge = bridge();
        let entry = DiscoveryEntry::new(
            Platform::Scene,
            "scene_1",
            json!({ "object_id_postfix": "_movie_time" }),
        );
        let payload = Finalizer::new(&config, &bridge).finalize(&entry, &bulb());
        assert_eq!(payload["object_id"], "living_room_bulb_1_movie_time");
        assert!(payload.get("object_id_postfix").is_none());
    }
}
