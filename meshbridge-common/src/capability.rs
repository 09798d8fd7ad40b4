//! Capability model of a mesh entity.
//!
//! Every device exposes a list of capabilities. Leaf capabilities (binary,
//! numeric, enum, text, list) describe one property of the state payload,
//! specific capabilities (light, switch, climate, lock, cover, fan) group the
//! features that together make up one appliance.
//!
//! # Example
//!
//! ```json
//! { "type": "numeric", "name": "battery", "property": "battery", "access": 1,
//!   "unit": "%", "value_min": 0, "value_max": 100 }
//! ```

use alloc::{borrow::ToOwned, boxed::Box, string::String, vec::Vec};
use core::{
    fmt::Display,
    ops::{BitOr, BitOrAssign},
};

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Access bitmask of a capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Access(pub u8);

impl Access {
    /// The property is reported in state payloads
    pub const STATE: Access = Access(1);
    /// The property can be written
    pub const SET: Access = Access(2);
    /// The property can be polled
    pub const GET: Access = Access(4);

    pub const fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn readable(self) -> bool {
        self.contains(Self::STATE)
    }

    pub const fn settable(self) -> bool {
        self.contains(Self::SET)
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Self) -> Self::Output {
        Access(self.0 | rhs.0)
    }
}

impl BitOrAssign for Access {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Config,
    Diagnostic,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Config => "config",
            Category::Diagnostic => "diagnostic",
        }
    }
}

/// Fields shared by every capability kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub property: String,
    #[serde(default)]
    pub access: Access,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Info {
    pub fn new(name: &str, access: Access) -> Self {
        Self {
            name: name.to_owned(),
            property: name.to_owned(),
            access,
            ..Default::default()
        }
    }

    pub fn label(&self) -> String {
        if !self.label.is_empty() {
            return self.label.clone();
        }

        let mut label = String::with_capacity(self.name.len());
        for (i, c) in self.name.chars().enumerate() {
            match c {
                '_' => label.push(' '),
                c if i == 0 => label.extend(c.to_uppercase()),
                c => label.push(c),
            }
        }
        label
    }

    pub fn property(&self) -> &str {
        if self.property.is_empty() { &self.name } else { &self.property }
    }

    pub fn property_without_endpoint(&self) -> &str {
        let property = self.property();
        match &self.endpoint {
            Some(endpoint) => property
                .strip_suffix(endpoint.as_str())
                .and_then(|p| p.strip_suffix('_'))
                .unwrap_or(property),
            None => property,
        }
    }
}

/// A capability that groups the features of one appliance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Specific {
    #[serde(flatten)]
    pub info: Info,
    #[serde(default)]
    pub features: Vec<Capability>,
}

impl Specific {
    pub fn feature(&self, name: &str) -> Option<&Capability> {
        self.features.iter().find(|f| f.info().name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.info().name == name)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.info.endpoint.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binary {
    #[serde(flatten)]
    pub info: Info,
    pub value_on: Value,
    pub value_off: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_toggle: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Numeric {
    #[serde(flatten)]
    pub info: Info,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_min: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_max: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_step: Option<Number>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enumerated {
    #[serde(flatten)]
    pub info: Info,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Enumerated {
    pub fn value_strings(&self) -> Vec<String> {
        self.values.iter().map(value_to_string).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Text {
    #[serde(flatten)]
    pub info: Info,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composite {
    #[serde(flatten)]
    pub info: Info,
    #[serde(default)]
    pub features: Vec<Capability>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct List {
    #[serde(flatten)]
    pub info: Info,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<Box<Capability>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Capability {
    Light(Specific),
    Switch(Specific),
    Climate(Specific),
    Lock(Specific),
    Cover(Specific),
    Fan(Specific),
    Binary(Binary),
    Numeric(Numeric),
    Enum(Enumerated),
    Text(Text),
    Composite(Composite),
    List(List),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapabilityKind {
    Light,
    Switch,
    Climate,
    Lock,
    Cover,
    Fan,
    Binary,
    Numeric,
    Enum,
    Text,
    Composite,
    List,
}

impl CapabilityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::Light => "light",
            CapabilityKind::Switch => "switch",
            CapabilityKind::Climate => "climate",
            CapabilityKind::Lock => "lock",
            CapabilityKind::Cover => "cover",
            CapabilityKind::Fan => "fan",
            CapabilityKind::Binary => "binary",
            CapabilityKind::Numeric => "numeric",
            CapabilityKind::Enum => "enum",
            CapabilityKind::Text => "text",
            CapabilityKind::Composite => "composite",
            CapabilityKind::List => "list",
        }
    }
}

impl Display for CapabilityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::Light(_) => CapabilityKind::Light,
            Capability::Switch(_) => CapabilityKind::Switch,
            Capability::Climate(_) => CapabilityKind::Climate,
            Capability::Lock(_) => CapabilityKind::Lock,
            Capability::Cover(_) => CapabilityKind::Cover,
            Capability::Fan(_) => CapabilityKind::Fan,
            Capability::Binary(_) => CapabilityKind::Binary,
            Capability::Numeric(_) => CapabilityKind::Numeric,
            Capability::Enum(_) => CapabilityKind::Enum,
            Capability::Text(_) => CapabilityKind::Text,
            Capability::Composite(_) => CapabilityKind::Composite,
            Capability::List(_) => CapabilityKind::List,
        }
    }

    pub fn info(&self) -> &Info {
        match self {
            Capability::Light(s)
            | Capability::Switch(s)
            | Capability::Climate(s)
            | Capability::Lock(s)
            | Capability::Cover(s)
            | Capability::Fan(s) => &s.info,
            Capability::Binary(b) => &b.info,
            Capability::Numeric(n) => &n.info,
            Capability::Enum(e) => &e.info,
            Capability::Text(t) => &t.info,
            Capability::Composite(c) => &c.info,
            Capability::List(l) => &l.info,
        }
    }

    pub fn features(&self) -> &[Capability] {
        match self {
            Capability::Light(s)
            | Capability::Switch(s)
            | Capability::Climate(s)
            | Capability::Lock(s)
            | Capability::Cover(s)
            | Capability::Fan(s) => &s.features,
            Capability::Composite(c) => &c.features,
            _ => &[],
        }
    }

    pub fn as_specific(&self) -> Option<&Specific> {
        match self {
            Capability::Light(s)
            | Capability::Switch(s)
            | Capability::Climate(s)
            | Capability::Lock(s)
            | Capability::Cover(s)
            | Capability::Fan(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Binary> {
        match self {
            Capability::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_numeric(&self) -> Option<&Numeric> {
        match self {
            Capability::Numeric(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&Enumerated> {
        match self {
            Capability::Enum(e) => Some(e),
            _ => None,
        }
    }
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => alloc::format!("{other}"),
    }
}
