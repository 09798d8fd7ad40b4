use meshbridge_common::Platform;
use serde_json::{Map, Value};

/// One Home Assistant entity config derived from the capabilities of an
/// entity, before its topics are resolved.
///
/// Payloads use relative placeholders the finalizer resolves: `state_topic`
/// and every other `*_topic` set to `true` become the entity's state topic,
/// `command_topic: true` its command topic, and a `*_command_topic` holding a
/// string `s` the command topic with `/s` appended. `state_topic_postfix`,
/// `command_topic_prefix`, `command_topic_postfix` and `object_id_postfix`
/// shape those topics and are stripped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryEntry {
    pub platform: Platform,
    pub object_id: String,
    pub mock_properties: Vec<MockProperty>,
    pub payload: Map<String, Value>,
}

/// A property guaranteed to be present in published states, because the
/// entity config reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct MockProperty {
    pub property: String,
    pub value: Value,
}

impl DiscoveryEntry {
    pub fn new(platform: Platform, object_id: impl Into<String>, payload: Value) -> Self {
        Self {
            platform,
            object_id: object_id.into(),
            mock_properties: Vec::new(),
            payload: into_map(payload),
        }
    }

    pub fn mock(mut self, property: &str) -> Self {
        self.mock_properties.push(MockProperty { property: property.into(), value: Value::Null });
        self
    }

    pub fn mock_value(mut self, property: &str, value: Value) -> Self {
        self.mock_properties.push(MockProperty { property: property.into(), value });
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.payload.insert(key.into(), value.into());
    }

    pub fn set_opt(&mut self, key: &str, value: Option<impl Into<Value>>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.payload.remove(key)
    }

    pub fn extend(&mut self, other: Map<String, Value>) {
        self.payload.extend(other);
    }
}

pub(crate) fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub(crate) fn value_template(property: &str) -> String {
    format!("{{{{ value_json.{property} }}}}")
}
