//! Discovery topic codec.
//!
//! ```plain
//! {prefix}/{platform}/{node}/{object_id}/config
//! homeassistant/sensor/0x00158d0001a2b3c4/battery/config    (device)
//! homeassistant/light/12250109_7/light/config               (group 7, base topic "z2m")
//! ```

use alloc::{string::String, vec::Vec};
use core::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Entity, EntityKind};

/// Hub-native entity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    BinarySensor,
    Button,
    Climate,
    Cover,
    DeviceAutomation,
    Fan,
    Light,
    Lock,
    Number,
    Scene,
    Select,
    Sensor,
    Switch,
    Text,
    Update,
}

impl Platform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Platform::BinarySensor => "binary_sensor",
            Platform::Button => "button",
            Platform::Climate => "climate",
            Platform::Cover => "cover",
            Platform::DeviceAutomation => "device_automation",
            Platform::Fan => "fan",
            Platform::Light => "light",
            Platform::Lock => "lock",
            Platform::Number => "number",
            Platform::Scene => "scene",
            Platform::Select => "select",
            Platform::Sensor => "sensor",
            Platform::Switch => "switch",
            Platform::Text => "text",
            Platform::Update => "update",
        }
    }

    pub const fn is_sensor(self) -> bool {
        matches!(self, Platform::Sensor | Platform::BinarySensor)
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "binary_sensor" => Platform::BinarySensor,
            "button" => Platform::Button,
            "climate" => Platform::Climate,
            "cover" => Platform::Cover,
            "device_automation" => Platform::DeviceAutomation,
            "fan" => Platform::Fan,
            "light" => Platform::Light,
            "lock" => Platform::Lock,
            "number" => Platform::Number,
            "scene" => Platform::Scene,
            "select" => Platform::Select,
            "sensor" => Platform::Sensor,
            "switch" => Platform::Switch,
            "text" => Platform::Text,
            "update" => Platform::Update,
            _ => return Err("unknown platform"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiscoveryTopic {
    pub prefix: String,
    pub platform: Platform,
    /// IEEE address of a device, `{encoded base topic}_{id}` otherwise
    pub node_id: String,
    pub object_id: String,
}

impl DiscoveryTopic {
    pub fn new(prefix: &str, platform: Platform, entity: &Entity, base_topic: &str, object_id: &str) -> Self {
        Self {
            prefix: prefix.into(),
            platform,
            node_id: node_id(entity, base_topic),
            object_id: object_id.into(),
        }
    }

    pub fn parse(prefix: &str, topic: &str) -> Result<Self, &'static str> {
        let rest = topic
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or("not below the discovery prefix")?;

        let parts = rest.split('/').collect::<Vec<_>>();
        match parts[..] {
            [platform, node_id, object_id, "config"] => Ok(Self {
                prefix: prefix.into(),
                platform: platform.parse()?,
                node_id: node_id.into(),
                object_id: object_id.into(),
            }),
            [_, _, _, _] => Err("{prefix}/{platform}/{node}/{object}/... is not a config topic"),
            _ => Err("{prefix}/{platform}/{node}/{object}/config"),
        }
    }

    pub fn entity_key(&self) -> &str {
        match self.node_id.split_once('_') {
            Some((_, id)) => id,
            None => &self.node_id,
        }
    }
}

impl Display for DiscoveryTopic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}/{}/config", self.prefix, self.platform, self.node_id, self.object_id)
    }
}

/// Concatenated decimal character codes of the base topic.
pub fn encode_base_topic(base_topic: &str) -> String {
    use core::fmt::Write as _;

    let mut out = String::new();
    for c in base_topic.chars() {
        let _ = write!(out, "{}", c as u32);
    }
    out
}

pub fn node_id(entity: &Entity, base_topic: &str) -> String {
    match &entity.kind {
        EntityKind::Device(device) => device.ieee_address.clone(),
        EntityKind::Group(_) | EntityKind::Bridge(_) => {
            alloc::format!("{}_{}", encode_base_topic(base_topic), entity.numeric_id())
        }
    }
}

pub fn state_topic(base_topic: &str, name: &str, postfix: Option<&str>) -> String {
    match postfix {
        Some(postfix) => alloc::format!("{base_topic}/{name}/{postfix}"),
        None => alloc::format!("{base_topic}/{name}"),
    }
}

pub fn command_topic(
    base_topic: &str,
    name: &str,
    prefix: Option<&str>,
    postfix: Option<&str>,
) -> String {
    let mut topic = alloc::format!("{base_topic}/{name}/");
    if let Some(prefix) = prefix {
        topic.push_str(prefix);
        topic.push('/');
    }
    topic.push_str("set");
    if let Some(postfix) = postfix {
        topic.push('/');
        topic.push_str(postfix);
    }
    topic
}
