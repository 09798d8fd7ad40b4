use std::{
    collections::{BTreeMap, HashMap},
    sync::{PoisonError, RwLock},
};

use meshbridge_common::{Entity, EntityId, EntityKind};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::Result;

/// Read access to the gateway's entities.
pub trait Directory: Send + Sync + 'static {
    fn bridge(&self) -> Entity;

    fn entity(&self, id: &EntityId) -> Option<Entity>;

    fn resolve(&self, key: &str) -> Option<Entity>;

    fn entities(&self) -> Vec<Entity>;

    fn cached_state(&self, id: &EntityId) -> Option<Map<String, Value>>;
}

/// In-memory [`Directory`].
///
/// ```json
/// { "bridge": { "coordinator_ieee": "0x00124b0012345678", "version": "2.1.0" },
///   "entities": [ { "type": "device", "id": "0x...", "name": "kitchen", ... } ],
///   "states": { "0x...": { "temperature": 21.5 } } }
/// ```
pub struct Registry {
    inner: RwLock<Inner>,
}

struct Inner {
    bridge: Entity,
    entities: BTreeMap<EntityId, Entity>,
    states: HashMap<EntityId, Map<String, Value>>,
}

#[derive(Deserialize)]
struct RegistryFile {
    bridge: meshbridge_common::entity::Bridge,
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    states: HashMap<EntityId, Map<String, Value>>,
}

impl Registry {
    pub fn new(bridge: Entity) -> Self {
        Self {
            inner: RwLock::new(Inner {
                bridge,
                entities: BTreeMap::new(),
                states: HashMap::new(),
            }),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: RegistryFile = serde_json::from_str(json)?;

        let mut bridge = Entity::bridge(&file.bridge.coordinator_ieee);
        bridge.kind = EntityKind::Bridge(file.bridge);

        let registry = Self::new(bridge);
        for entity in file.entities {
            registry.insert(entity);
        }
        for (id, state) in file.states {
            registry.set_state(&id, state);
        }

        Ok(registry)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, entity: Entity) -> Option<Entity> {
        self.write().entities.insert(entity.id.clone(), entity)
    }

    pub fn remove(&self, id: &EntityId) -> Option<Entity> {
        let mut inner = self.write();
        inner.states.remove(id);
        inner.entities.remove(id)
    }

    pub fn rename(&self, id: &EntityId, name: &str) -> Option<String> {
        let mut inner = self.write();
        let entity = inner.entities.get_mut(id)?;
        Some(core::mem::replace(&mut entity.name, name.to_owned()))
    }

    pub fn set_state(&self, id: &EntityId, state: Map<String, Value>) {
        self.write().states.insert(id.clone(), state);
    }
}

impl Directory for Registry {
    fn bridge(&self) -> Entity {
        self.read().bridge.clone()
    }

    fn entity(&self, id: &EntityId) -> Option<Entity> {
        let inner = self.read();
        if inner.bridge.id == *id {
            return Some(inner.bridge.clone());
        }
        inner.entities.get(id).cloned()
    }

    fn resolve(&self, key: &str) -> Option<Entity> {
        let inner = self.read();

        if inner.bridge.id == key || inner.bridge.numeric_id() == key {
            return Some(inner.bridge.clone());
        }

        if let Some(entity) = inner.entities.get(&EntityId::from(key)) {
            return Some(entity.clone());
        }

        inner
            .entities
            .values()
            .find(|entity| entity.name == key || entity.numeric_id() == key)
            .cloned()
    }

    fn entities(&self) -> Vec<Entity> {
        self.read().entities.values().cloned().collect()
    }

    fn cached_state(&self, id: &EntityId) -> Option<Map<String, Value>> {
        self.read().states.get(id).cloned()
    }
}
