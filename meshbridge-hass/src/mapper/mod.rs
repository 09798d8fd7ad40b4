//! Capability to discovery entry mapping.
//!
//! [`map`] turns capabilities of one kind into discovery entries. A device maps
//! each capability on its own; a group merges the light, switch, lock and cover
//! capabilities of its members (see [`group_members`]).

use meshbridge_common::{
    Capability, CapabilityKind,
    capability::{Info, Specific},
    entity::Definition,
};
use serde_json::Value;

use crate::entry::DiscoveryEntry;

mod binary;
mod climate;
mod cover;
mod enumerated;
mod fan;
mod legacy;
mod light;
mod lock;
pub(crate) mod lookup;
mod numeric;
mod switch;
mod text;

pub use self::legacy::{is_legacy_click, legacy_entry};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("no capabilities to map")]
    Empty,
    #[error("{kind} capability has no `{feature}` feature")]
    MissingFeature { kind: CapabilityKind, feature: &'static str },
    #[error("endpoint is not supported for {0} capabilities")]
    Endpoint(CapabilityKind),
    #[error("climate setpoint `{0}` has no explicit bounds")]
    UnboundedSetpoint(String),
    #[error("cover has `running` but no `position`")]
    RunningWithoutPosition,
    #[error("fan mode `{0}` is neither a speed nor a preset")]
    UnknownFanMode(String),
}

/// What a mapping may look at beyond the capabilities being mapped.
#[derive(Debug, Clone, Copy)]
pub struct MapContext<'a> {
    /// Endpoints are ignored when mapping for a group
    pub group: bool,
    /// Every capability of the entity, or of all members of a group
    pub all: &'a [&'a Capability],
    pub definition: Option<&'a Definition>,
}

pub fn map(caps: &[&Capability], ctx: &MapContext<'_>) -> Result<Vec<DiscoveryEntry>, MapError> {
    let first = *caps.first().ok_or(MapError::Empty)?;
    let endpoint = if ctx.group { None } else { first.info().endpoint.as_deref() };

    let mut entries = match first {
        Capability::Light(_) => light::map(&specifics(caps), endpoint, ctx)?,
        Capability::Switch(switch) => switch::map(switch, endpoint)?,
        Capability::Climate(climate) => climate::map(climate, endpoint)?,
        Capability::Lock(lock) => lock::map(lock, endpoint)?,
        Capability::Cover(_) => cover::map(&specifics(caps), endpoint, ctx)?,
        Capability::Fan(fan) => fan::map(fan, ctx)?,
        Capability::Binary(binary) => binary::map(binary, endpoint),
        Capability::Numeric(numeric) => numeric::map(numeric, endpoint),
        Capability::Enum(enumerated) => enumerated::map(enumerated, endpoint),
        Capability::Text(_) | Capability::Composite(_) | Capability::List(_) => {
            text::map(first, endpoint)
        }
    };

    post_process(first.info(), &mut entries);

    Ok(entries)
}

fn post_process(info: &Info, entries: &mut [DiscoveryEntry]) {
    let label = info.label();

    for entry in entries {
        if let Some(category) = info.category {
            entry.set("entity_category", category.as_str());
        }

        // sensors have no input, so they cannot be configured
        if entry.platform.is_sensor() && entry.get_str("entity_category") == Some("config") {
            entry.set("entity_category", "diagnostic");
        }

        // the hub derives the name from the device class
        if entry.get("device_class").is_some_and(|class| !class.is_null())
            && entry.get_str("name") == Some(label.as_str())
        {
            entry.set("name", Value::Null);
        }
    }
}

fn specifics<'a>(caps: &[&'a Capability]) -> Vec<&'a Specific> {
    caps.iter().filter_map(|cap| cap.as_specific()).collect()
}

pub fn device_batches(definition: &Definition) -> Vec<Vec<&Capability>> {
    definition.exposes.iter().map(|cap| vec![cap]).collect()
}

/// Merges the capabilities of group members into mapping batches, in order of
/// first appearance. Switches, locks and covers on an endpoint are keyed by
/// their state property so distinct switches of one member stay distinct.
pub fn group_members<'a>(
    members: impl IntoIterator<Item = &'a Definition>,
) -> Vec<Vec<&'a Capability>> {
    let mut batches: Vec<(String, Vec<&'a Capability>)> = Vec::new();

    for cap in members.into_iter().flat_map(|definition| &definition.exposes) {
        let kind = cap.kind();
        if !matches!(
            kind,
            CapabilityKind::Light | CapabilityKind::Switch | CapabilityKind::Lock | CapabilityKind::Cover
        ) {
            continue;
        }

        let mut key = kind.as_str().to_owned();
        if kind != CapabilityKind::Light && cap.info().endpoint.is_some() {
            if let Some(state) = cap.as_specific().and_then(|s| s.feature("state")) {
                key.push_str(state.info().property());
            }
        }

        match batches.iter_mut().find(|(k, _)| *k == key) {
            Some((_, batch)) => batch.push(cap),
            None => batches.push((key, vec![cap])),
        }
    }

    batches.into_iter().map(|(_, batch)| batch).collect()
}

fn object_id(base: &str, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(endpoint) => format!("{base}_{endpoint}"),
        None => base.to_owned(),
    }
}

fn display_name(info: &Info, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(endpoint) => format!("{} {endpoint}", info.label()),
        None => info.label(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn humanize(s: &str) -> String {
    capitalize(&s.replace('_', " "))
}

fn missing(kind: CapabilityKind, feature: &'static str) -> MapError {
    MapError::MissingFeature { kind, feature }
}

#[cfg(test)]
mod tests {
    use meshbridge_common::Platform;
    use serde_json::json;

    use super::*;

    pub(crate) fn cap(value: Value) -> Capability {
        serde_json::from_value(value).unwrap()
    }

    pub(crate) fn map_one(value: Value) -> Result<Vec<DiscoveryEntry>, MapError> {
        let cap = cap(value);
        let all = [&cap];
        map(&[&cap], &MapContext { group: false, all: &all, definition: None })
    }

    fn state(value_on: &str, value_off: &str) -> Value {
        json!({ "type": "binary", "name": "state", "property": "state", "access": 7,
                "value_on": value_on, "value_off": value_off })
    }

    #[test]
    fn every_kind_maps() {
        let minimal = [
            json!({ "type": "light", "features": [state("ON", "OFF")] }),
            json!({ "type": "switch", "features": [state("ON", "OFF")] }),
            json!({ "type": "climate", "features": [
                { "type": "numeric", "name": "occupied_heating_setpoint", "access": 7,
                  "value_min": 5, "value_max": 30 },
                { "type": "numeric", "name": "local_temperature", "access": 5 },
            ] }),
            json!({ "type": "lock", "features": [state("LOCK", "UNLOCK")] }),
            json!({ "type": "cover", "features": [state("OPEN", "CLOSE")] }),
            json!({ "type": "fan", "features": [state("ON", "OFF")] }),
            json!({ "type": "binary", "name": "contact", "access": 1, "value_on": false, "value_off": true }),
            json!({ "type": "numeric", "name": "temperature", "access": 1, "unit": "°C" }),
            json!({ "type": "enum", "name": "mode", "access": 1, "values": ["a", "b"] }),
            json!({ "type": "text", "name": "label", "access": 1 }),
            json!({ "type": "composite", "name": "schedule", "access": 1, "features": [] }),
            json!({ "type": "list", "name": "events", "access": 1 }),
        ];

        for value in minimal {
            let entries = map_one(value.clone()).unwrap();
            assert!(!entries.is_empty(), "no entries for {value}");
        }
    }

    #[test]
    fn empty_batch_is_an_error() {
        assert_eq!(
            map(&[], &MapContext { group: false, all: &[], definition: None }),
            Err(MapError::Empty)
        );
    }

    #[test]
    fn category_override() {
        let entries = map_one(json!({
            "type": "numeric", "name": "sensitivity", "access": 3, "category": "config",
        }))
        .unwrap();

        let sensor = entries.iter().find(|e| e.platform == Platform::Sensor).unwrap();
        let number = entries.iter().find(|e| e.platform == Platform::Number).unwrap();
        assert_eq!(sensor.get_str("entity_category"), Some("diagnostic"));
        assert_eq!(number.get_str("entity_category"), Some("config"));
    }

    #[test]
    fn device_class_clears_name() {
        let entries = map_one(json!({
            "type": "numeric", "name": "humidity", "access": 1, "unit": "%",
        }))
        .unwrap();
        assert_eq!(entries[0].get("name"), Some(&Value::Null));

        // endpoint names stay, the hub cannot tell them apart otherwise
        let entries = map_one(json!({
            "type": "numeric", "name": "humidity", "property": "humidity_l1", "access": 1,
            "unit": "%", "endpoint": "l1",
        }))
        .unwrap();
        assert_eq!(entries[0].get_str("name"), Some("Humidity l1"));
    }

    #[test]
    fn group_batches() {
        let plug = |ep: &str| -> Value {
            json!({ "type": "switch", "endpoint": ep, "features": [
                { "type": "binary", "name": "state", "property": format!("state_{ep}"),
                  "access": 7, "value_on": "ON", "value_off": "OFF", "endpoint": ep },
            ] })
        };

        let a: Definition = serde_json::from_value(json!({
            "model": "A", "vendor": "V",
            "exposes": [plug("l1"), plug("l2"), { "type": "numeric", "name": "power", "access": 1 }],
        }))
        .unwrap();
        let b: Definition = serde_json::from_value(json!({
            "model": "B", "vendor": "V",
            "exposes": [plug("l1"), { "type": "light", "features": [state("ON", "OFF")] }],
        }))
        .unwrap();

        let batches = group_members([&a, &b]);
        let sizes = batches.iter().map(Vec::len).collect::<Vec<_>>();
        assert_eq!(sizes, [2, 1, 1]);
        assert_eq!(batches[2][0].kind(), CapabilityKind::Light);
    }

    #[test]
    fn helpers() {
        assert_eq!(capitalize("l1"), "L1");
        assert_eq!(object_id("light", Some("l2")), "light_l2");
        assert_eq!(object_id("fan", None), "fan");
    }
}
