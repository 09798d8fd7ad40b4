use std::collections::{BTreeMap, BTreeSet, HashMap};

use meshbridge_common::EntityId;
use serde_json::Value;

/// What was sent, or seen retained, on one discovery topic.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PublishedMessage {
    pub payload: String,
    pub published: bool,
}

#[derive(Debug, Default)]
pub(crate) struct DiscoveredRecord {
    /// Keyed by full discovery topic
    pub messages: BTreeMap<String, PublishedMessage>,
    /// Device automation trigger keys, `{key}_{value}`
    pub triggers: BTreeSet<String>,
    /// Grows monotonically, never pruned
    pub mock_properties: BTreeMap<String, Value>,
    /// Set by the first publishing pass
    pub discovered: bool,
}

#[derive(Debug, Default)]
pub(crate) struct DiscoveryStore {
    records: HashMap<EntityId, DiscoveredRecord>,
}

impl DiscoveryStore {
    pub fn record_mut(&mut self, id: &EntityId) -> &mut DiscoveredRecord {
        self.records.entry(id.clone()).or_default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&DiscoveredRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut DiscoveredRecord> {
        self.records.get_mut(id)
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<DiscoveredRecord> {
        self.records.remove(id)
    }

    pub fn is_discovered(&self, id: &EntityId) -> bool {
        self.get(id).is_some_and(|record| record.discovered)
    }
}
