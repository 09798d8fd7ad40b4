use alloc::{borrow::ToOwned, string::String, vec::Vec};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{Capability, EntityId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Friendly name, used in state and command topics
    pub name: String,
    #[serde(default)]
    pub options: EntityOptions,
    #[serde(flatten)]
    pub kind: EntityKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Device(Device),
    Group(Group),
    Bridge(Bridge),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub ieee_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Definition>,
    #[serde(default)]
    pub interviewing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_build_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_version: Option<u32>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// What the capability library knows about a device model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub model: String,
    pub vendor: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub supports_ota: bool,
    #[serde(default)]
    pub exposes: Vec<Capability>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: u16,
    #[serde(default)]
    pub members: Vec<EntityId>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bridge {
    pub coordinator_ieee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator_type: Option<String>,
    /// Gateway software version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: u8,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityOptions {
    /// A disabled entity stays announced but is forced unavailable
    #[serde(default)]
    pub disabled: bool,
    /// Legacy click sensor, `None` keeps the model default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy: Option<bool>,
    /// Per-entity availability tracking, `None` follows the global setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<bool>,
    #[serde(default)]
    pub homeassistant: DiscoveryOverrides,
}

/// User supplied discovery overrides of one entity.
///
/// ```json
/// { "name": "Kitchen",                      // ignored at entity level
///   "device": { "suggested_area": "kitchen" },
///   "battery": { "name": "Kitchen battery" },
///   "linkquality": null,                    // never announce this object id
///   "include": ["battery", "light"] }       // announce only these object ids
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DiscoveryOverrides {
    #[default]
    Inherit,
    /// Entity is hidden from the hub entirely
    Excluded,
    Custom(Map<String, Value>),
}

impl DiscoveryOverrides {
    pub fn is_excluded(&self) -> bool {
        matches!(self, DiscoveryOverrides::Excluded)
    }

    pub fn custom(&self) -> Option<&Map<String, Value>> {
        match self {
            DiscoveryOverrides::Custom(map) => Some(map),
            _ => None,
        }
    }

    pub fn object(&self, object_id: &str) -> Option<Option<&Map<String, Value>>> {
        match self.custom()?.get(object_id)? {
            Value::Null => Some(None),
            Value::Object(map) => Some(Some(map)),
            _ => None,
        }
    }

    pub fn include(&self) -> Option<Vec<&str>> {
        let list = self.custom()?.get("include")?.as_array()?;
        Some(list.iter().filter_map(Value::as_str).collect())
    }
}

impl Serialize for DiscoveryOverrides {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DiscoveryOverrides::Inherit => serializer.serialize_bool(true),
            DiscoveryOverrides::Excluded => serializer.serialize_none(),
            DiscoveryOverrides::Custom(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DiscoveryOverrides {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null | Value::Bool(false) => Ok(DiscoveryOverrides::Excluded),
            Value::Bool(true) => Ok(DiscoveryOverrides::Inherit),
            Value::Object(map) => Ok(DiscoveryOverrides::Custom(map)),
            other => Err(serde::de::Error::custom(alloc::format!(
                "expected an object, a boolean or null, got {other}"
            ))),
        }
    }
}

impl Entity {
    pub fn device(ieee_address: &str, name: &str, definition: Definition) -> Self {
        Self {
            id: EntityId::from(ieee_address),
            name: name.to_owned(),
            options: EntityOptions::default(),
            kind: EntityKind::Device(Device {
                ieee_address: ieee_address.to_owned(),
                definition: Some(definition),
                ..Default::default()
            }),
        }
    }

    pub fn group(group_id: u16, name: &str, members: Vec<EntityId>) -> Self {
        Self {
            id: EntityId::from(alloc::format!("{group_id}")),
            name: name.to_owned(),
            options: EntityOptions::default(),
            kind: EntityKind::Group(Group { group_id, members, scenes: Vec::new() }),
        }
    }

    pub fn bridge(coordinator_ieee: &str) -> Self {
        Self {
            id: EntityId::from(alloc::format!("bridge_{coordinator_ieee}")),
            name: "bridge".to_owned(),
            options: EntityOptions::default(),
            kind: EntityKind::Bridge(Bridge {
                coordinator_ieee: coordinator_ieee.to_owned(),
                coordinator_type: None,
                version: None,
            }),
        }
    }

    pub fn is_device(&self) -> bool {
        matches!(self.kind, EntityKind::Device(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, EntityKind::Group(_))
    }

    pub fn is_bridge(&self) -> bool {
        matches!(self.kind, EntityKind::Bridge(_))
    }

    pub fn as_device(&self) -> Option<&Device> {
        match &self.kind {
            EntityKind::Device(device) => Some(device),
            _ => None,
        }
    }

    pub fn definition(&self) -> Option<&Definition> {
        self.as_device()?.definition.as_ref()
    }

    pub fn scenes(&self) -> &[Scene] {
        match &self.kind {
            EntityKind::Device(device) => &device.scenes,
            EntityKind::Group(group) => &group.scenes,
            EntityKind::Bridge(_) => &[],
        }
    }

    pub fn numeric_id(&self) -> String {
        match &self.kind {
            EntityKind::Device(device) => device.ieee_address.clone(),
            EntityKind::Group(group) => alloc::format!("{}", group.group_id),
            EntityKind::Bridge(bridge) => bridge.coordinator_ieee.clone(),
        }
    }
}
