//! The discovery reconciler.
//!
//! Every pass over an entity derives its full set of discovery configs,
//! publishes the ones that differ from what the hub already has and retracts
//! the ones no longer produced. On startup a silent pass per entity is seeded
//! from retained configs before anything is published.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use meshbridge::{Directory, PublishOpts, Transport};
use meshbridge_common::{
    Capability, DiscoveryTopic, Entity, EntityId, EntityKind, Platform,
    topic::{encode_base_topic, state_topic},
};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use crate::{
    Result, bridge,
    config::{DiscoveryConfig, LastSeen},
    entry::DiscoveryEntry,
    finalize::Finalizer,
    mapper::{self, MapContext, is_legacy_click, legacy_entry},
    store::{DiscoveryStore, PublishedMessage},
};

const TRIGGER_KEYS: [&str; 2] = ["action", "click"];

const ENDPOINT_PREFIXES: [&str; 3] = ["light_", "switch_", "cover_"];

pub struct Discovery<T, D> {
    config: DiscoveryConfig,
    transport: Arc<T>,
    directory: Arc<D>,
    store: Mutex<DiscoveryStore>,
    /// Entities with a pass in flight, and whether another one was requested
    /// (`Some(publish)`) while it ran
    passes: StdMutex<HashMap<EntityId, Option<bool>>>,
    startup: StdMutex<Startup>,
}

#[derive(Default)]
struct Startup {
    complete: bool,
    /// Retractions requested during the grace window
    deferred: Vec<String>,
}

impl<T: Transport, D: Directory> Discovery<T, D> {
    pub fn new(config: DiscoveryConfig, transport: Arc<T>, directory: Arc<D>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            transport,
            directory,
            store: Mutex::new(DiscoveryStore::default()),
            passes: StdMutex::new(HashMap::new()),
            startup: StdMutex::new(Startup::default()),
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    fn startup_complete(&self) -> bool {
        self.startup.lock().unwrap_or_else(PoisonError::into_inner).complete
    }

    fn lookup(&self, id: &EntityId) -> Option<Entity> {
        self.directory.entity(id)
    }

    pub async fn start(&self) -> Result<()> {
        let ids = self.known_ids();
        tracing::info!("Seeding discovery state for {} entities", ids.len());
        for id in &ids {
            self.request_pass(id, false).await;
        }

        let wildcard = format!("{}/#", self.config.discovery_topic);
        self.transport.subscribe(&wildcard).await?;
        tokio::time::sleep(self.config.timing.startup_grace()).await;
        self.transport.unsubscribe(&wildcard).await?;

        self.finish_startup().await;

        // entities may have joined during the grace window
        let ids = self.known_ids();
        tracing::info!("Publishing discovery configs for {} entities", ids.len());
        for id in &ids {
            self.request_pass(id, true).await;
        }

        Ok(())
    }

    fn known_ids(&self) -> Vec<EntityId> {
        let mut ids = vec![self.directory.bridge().id];
        ids.extend(self.directory.entities().into_iter().map(|entity| entity.id));
        ids
    }

    async fn finish_startup(&self) {
        let deferred = {
            let mut startup = self.startup.lock().unwrap_or_else(PoisonError::into_inner);
            startup.complete = true;
            core::mem::take(&mut startup.deferred)
        };

        for topic in deferred {
            self.clear(&topic).await;
        }
    }

    /// Runs a pass over one entity. A request for an entity whose pass is
    /// still running is folded into a single follow-up pass.
    pub async fn request_pass(&self, id: &EntityId, publish: bool) {
        if publish && !self.startup_complete() {
            tracing::debug!("Dropping pass for '{id}', startup sweep pending");
            return;
        }

        {
            let mut passes = self.passes.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(pending) = passes.get_mut(id) {
                *pending = Some(pending.unwrap_or(false) || publish);
                return;
            }
            passes.insert(id.clone(), None);
        }

        let mut publish = publish;
        loop {
            self.discover(id, publish).await;

            let mut passes = self.passes.lock().unwrap_or_else(PoisonError::into_inner);
            match passes.get_mut(id).and_then(Option::take) {
                Some(next) => publish = next,
                None => {
                    passes.remove(id);
                    break;
                }
            }
        }
    }

    pub fn should_discover(&self, entity: &Entity) -> bool {
        if entity.options.homeassistant.is_excluded() {
            return false;
        }

        match &entity.kind {
            EntityKind::Group(group) => !group.members.is_empty(),
            EntityKind::Device(device) => device.definition.is_some() && !device.interviewing,
            EntityKind::Bridge(_) => true,
        }
    }

    pub fn entries(&self, entity: &Entity) -> Vec<DiscoveryEntry> {
        let mut entries = Vec::new();

        match &entity.kind {
            EntityKind::Bridge(_) => entries.extend(bridge::entries(&self.config)),
            EntityKind::Device(_) => {
                if let Some(definition) = entity.definition() {
                    let all = definition.exposes.iter().collect::<Vec<_>>();
                    let ctx = MapContext { group: false, all: &all, definition: Some(definition) };
                    for batch in mapper::device_batches(definition) {
                        self.map_batch(entity, &batch, &ctx, &mut entries);
                    }
                }
            }
            EntityKind::Group(group) => {
                let members = group
                    .members
                    .iter()
                    .filter_map(|id| self.directory.entity(id))
                    .collect::<Vec<_>>();
                let definitions = members.iter().filter_map(Entity::definition).collect::<Vec<_>>();
                let all = definitions.iter().copied().flat_map(|d| &d.exposes).collect::<Vec<_>>();
                let ctx = MapContext { group: true, all: &all, definition: None };

                for batch in mapper::group_members(definitions.iter().copied()) {
                    self.map_batch(entity, &batch, &ctx, &mut entries);
                }
            }
        }

        if entity.is_device() && self.config.last_seen != LastSeen::Disable {
            let mut last_seen = DiscoveryEntry::new(
                Platform::Sensor,
                "last_seen",
                json!({
                    "name": "Last seen",
                    "icon": "mdi:clock",
                    "value_template": "{{ value_json.last_seen }}",
                    "enabled_by_default": false,
                    "entity_category": "diagnostic",
                }),
            );
            if self.config.last_seen.is_timestamp() {
                last_seen.set("device_class", "timestamp");
            }
            entries.push(last_seen);
        }

        if entity.definition().is_some_and(|definition| definition.supports_ota) {
            entries.extend(self.ota_entries(entity));
        }

        for scene in entity.scenes() {
            entries.push(DiscoveryEntry::new(
                Platform::Scene,
                format!("scene_{}", scene.id),
                json!({
                    "name": scene.name,
                    "state_topic": false,
                    "command_topic": true,
                    "payload_on": format!("{{ \"scene_recall\": {} }}", scene.id),
                    "object_id_postfix": format!("_{}", scene.name.replace(' ', "_").to_lowercase()),
                }),
            ));
        }

        if self.config.legacy_api {
            if let Some(entry) = entity.definition().and_then(|d| legacy_entry(&d.model)) {
                entries.push(entry);
            }
        }

        entries.retain(|entry| {
            let legacy_action = entry.platform == Platform::Sensor
                && TRIGGER_KEYS.contains(&entry.object_id.as_str());
            if legacy_action && !self.config.legacy_action_sensor {
                return false;
            }
            !(entity.options.legacy == Some(false) && is_legacy_click(entry))
        });

        apply_entry_overrides(entity, &entries)
    }

    fn map_batch(
        &self,
        entity: &Entity,
        batch: &[&Capability],
        ctx: &MapContext<'_>,
        entries: &mut Vec<DiscoveryEntry>,
    ) {
        match mapper::map(batch, ctx) {
            Ok(mapped) => entries.extend(mapped),
            Err(err) => tracing::warn!("Skipping capability of '{}': {err}", entity.name),
        }
    }

    fn ota_entries(&self, entity: &Entity) -> Vec<DiscoveryEntry> {
        let mut entries = vec![
            DiscoveryEntry::new(
                Platform::Sensor,
                "update_state",
                json!({
                    "name": "Update state",
                    "icon": "mdi:update",
                    "value_template": "{{ value_json['update']['state'] }}",
                    "enabled_by_default": false,
                    "entity_category": "diagnostic",
                }),
            )
            .mock("update_state"),
        ];

        if self.config.legacy_api {
            entries.push(
                DiscoveryEntry::new(
                    Platform::BinarySensor,
                    "update_available",
                    json!({
                        "name": null,
                        "payload_on": true,
                        "payload_off": false,
                        "value_template": "{{ value_json['update']['state'] == \"available\" }}",
                        "enabled_by_default": false,
                        "device_class": "update",
                        "entity_category": "diagnostic",
                    }),
                )
                .mock("update_available"),
            );
        }

        let ieee = match &entity.kind {
            EntityKind::Device(device) => device.ieee_address.as_str(),
            _ => entity.id.as_str(),
        };
        entries.push(DiscoveryEntry::new(
            Platform::Update,
            "update",
            json!({
                "name": null,
                "device_class": "firmware",
                "entity_category": "config",
                "command_topic": format!(
                    "{}/bridge/request/device/ota_update/update",
                    self.config.base_topic
                ),
                "payload_install": format!("{{\"id\": \"{ieee}\"}}"),
                "value_template": "{{ value_json['update']['installed_version'] }}",
                "latest_version_topic": true,
                "latest_version_template": "{{ value_json['update']['latest_version'] }}",
                "json_attributes_template":
                    "{\"in_progress\": {{ iif(value_json['update']['state'] == 'updating', 'true', 'false') }} }",
            }),
        ));

        entries
    }

    async fn discover(&self, id: &EntityId, publish: bool) {
        let Some(entity) = self.lookup(id) else {
            tracing::debug!("Not discovering '{id}', entity is gone");
            return;
        };

        let entries = if self.should_discover(&entity) {
            self.entries(&entity)
        } else if entity.options.homeassistant.is_excluded() {
            Vec::new()
        } else {
            tracing::debug!("Not discovering '{}' yet", entity.name);
            return;
        };

        let bridge = self.directory.bridge();
        let finalizer = Finalizer::new(&self.config, &bridge);

        let mut store = self.store.lock().await;
        let record = store.record_mut(&entity.id);
        let previous = record.messages.keys().cloned().collect::<Vec<_>>();
        if publish {
            record.discovered = true;
        }

        let mut produced = BTreeSet::new();
        for entry in &entries {
            let topic = DiscoveryTopic::new(
                &self.config.discovery_topic,
                entry.platform,
                &entity,
                &self.config.base_topic,
                &entry.object_id,
            )
            .to_string();

            for mock in &entry.mock_properties {
                record
                    .mock_properties
                    .entry(mock.property.clone())
                    .or_insert_with(|| mock.value.clone());
            }

            let payload = match serde_json::to_string(&finalizer.finalize(entry, &entity)) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!("Failed to serialize '{topic}': {err}");
                    continue;
                }
            };
            produced.insert(topic.clone());

            if record
                .messages
                .get(&topic)
                .is_some_and(|known| known.published && known.payload == payload)
            {
                tracing::debug!("Skipping '{topic}', already discovered");
                continue;
            }

            let published = publish && {
                match self.transport.publish(&topic, &payload, PublishOpts::discovery()).await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!("Failed to publish '{topic}': {err}");
                        false
                    }
                }
            };
            record.messages.insert(topic, PublishedMessage { payload, published });
        }

        let stale = previous
            .into_iter()
            .filter(|topic| !produced.contains(topic) && !self.is_automation(topic))
            .collect::<Vec<_>>();
        for topic in &stale {
            record.messages.remove(topic);
        }
        drop(store);

        for topic in stale {
            self.clear(&topic).await;
        }
    }

    fn is_automation(&self, topic: &str) -> bool {
        DiscoveryTopic::parse(&self.config.discovery_topic, topic)
            .is_ok_and(|topic| topic.platform == Platform::DeviceAutomation)
    }

    async fn clear(&self, topic: &str) {
        {
            let mut startup = self.startup.lock().unwrap_or_else(PoisonError::into_inner);
            if !startup.complete {
                startup.deferred.push(topic.to_owned());
                return;
            }
        }

        tracing::debug!("Retracting '{topic}'");
        if let Err(err) = self.transport.publish(topic, "", PublishOpts::discovery()).await {
            tracing::warn!("Failed to retract '{topic}': {err}");
        }
    }

    pub async fn on_discovery_message(&self, topic: &str, payload: &str) {
        let Ok(parsed) = DiscoveryTopic::parse(&self.config.discovery_topic, topic) else {
            return;
        };
        let Ok(Value::Object(message)) = serde_json::from_str::<Value>(payload) else {
            tracing::debug!("Ignoring malformed discovery message on '{topic}'");
            return;
        };

        let base = format!("{}/", self.config.base_topic);
        let automation = parsed.platform == Platform::DeviceAutomation;
        let embedded = if automation {
            message.get("topic")
        } else {
            message
                .get("availability")
                .and_then(|availability| availability.get(0))
                .and_then(|availability| availability.get("topic"))
                .or_else(|| message.get("state_topic"))
        };
        let trusted = embedded.and_then(Value::as_str).is_some_and(|t| t.starts_with(&base));

        if !trusted {
            if self.refers_to_us(&parsed) {
                tracing::info!("Retracting foreign discovery config '{topic}'");
                self.clear(topic).await;
            }
            return;
        }

        let entity = self
            .directory
            .resolve(parsed.entity_key())
            .filter(|entity| !(entity.is_device() && entity.definition().is_none()))
            .filter(|entity| !entity.options.homeassistant.is_excluded());
        let Some(entity) = entity else {
            self.clear(topic).await;
            return;
        };

        let canonical = match serde_json::to_string(&message) {
            Ok(canonical) => canonical,
            Err(_) => return,
        };

        let mut store = self.store.lock().await;
        let record = store.record_mut(&entity.id);

        if automation {
            let key = message.get("type").and_then(Value::as_str).unwrap_or_default();
            let expected = format!("{}{}/{key}", base, entity.name);
            if embedded.and_then(Value::as_str) == Some(expected.as_str()) {
                record.triggers.insert(parsed.object_id.clone());
                record
                    .messages
                    .insert(topic.to_owned(), PublishedMessage { payload: canonical, published: true });
                return;
            }
        } else if let Some(known) = record.messages.get_mut(topic) {
            *known = PublishedMessage { payload: canonical, published: true };
            return;
        }

        drop(store);
        self.clear(topic).await;
    }

    fn refers_to_us(&self, topic: &DiscoveryTopic) -> bool {
        let encoded = format!("{}_", encode_base_topic(&self.config.base_topic));
        topic.node_id.starts_with(&encoded)
            || self.directory.resolve(&topic.node_id).is_some_and(|entity| entity.is_device())
    }

    pub async fn is_discovered(&self, id: &EntityId) -> bool {
        self.store.lock().await.is_discovered(id)
    }

    pub async fn remove_entity(&self, id: &EntityId) {
        let Some(record) = self.store.lock().await.remove(id) else {
            return;
        };

        for topic in record.messages.keys() {
            self.clear(topic).await;
        }
    }

    /// Retracts every config of a renamed entity before announcing it again, so
    /// the hub does not keep the old entity around.
    pub async fn rename(&self, id: &EntityId) {
        let (topics, triggers) = {
            let mut store = self.store.lock().await;
            let Some(record) = store.get_mut(id) else {
                return;
            };
            let topics = core::mem::take(&mut record.messages).into_keys().collect::<Vec<_>>();
            (topics, record.triggers.clone())
        };

        for topic in &topics {
            self.clear(topic).await;
        }

        tokio::time::sleep(self.config.timing.recreate_delay()).await;
        self.request_pass(id, true).await;

        let Some(entity) = self.lookup(id) else {
            return;
        };
        for trigger in triggers {
            if let Some((key, value)) = trigger.split_once('_') {
                self.publish_device_trigger(&entity, key, value, true).await;
            }
        }
    }

    pub async fn scenes_changed(&self, id: &EntityId) {
        let topics = {
            let mut store = self.store.lock().await;
            let Some(record) = store.get_mut(id) else {
                return;
            };
            let scenes = record
                .messages
                .keys()
                .filter(|topic| {
                    DiscoveryTopic::parse(&self.config.discovery_topic, topic)
                        .is_ok_and(|topic| topic.platform == Platform::Scene)
                })
                .cloned()
                .collect::<Vec<_>>();
            for topic in &scenes {
                record.messages.remove(topic);
            }
            scenes
        };

        for topic in &topics {
            self.clear(topic).await;
        }

        tokio::time::sleep(self.config.timing.recreate_delay()).await;
        self.request_pass(id, true).await;
    }

    pub async fn publish_device_trigger(&self, entity: &Entity, key: &str, value: &str, force: bool) {
        let overrides = &entity.options.homeassistant;
        if overrides.is_excluded() || overrides.object("device_automation") == Some(None) {
            return;
        }
        if !self.startup_complete() {
            return;
        }

        let trigger = format!("{key}_{value}");
        let topic = DiscoveryTopic::new(
            &self.config.discovery_topic,
            Platform::DeviceAutomation,
            entity,
            &self.config.base_topic,
            &trigger,
        )
        .to_string();

        let mut store = self.store.lock().await;
        let record = store.record_mut(&entity.id);
        if record.triggers.contains(&trigger) && !force {
            return;
        }
        record.triggers.insert(trigger);

        let bridge = self.directory.bridge();
        let finalizer = Finalizer::new(&self.config, &bridge);
        let payload = json!({
            "automation_type": "trigger",
            "type": key,
            "subtype": value,
            "payload": value,
            "topic": format!("{}/{}/{key}", self.config.base_topic, entity.name),
            "device": finalizer.device_payload(entity),
            "origin": { "name": "meshbridge", "sw": self.config.version },
        })
        .to_string();

        let published = match self.transport.publish(&topic, &payload, PublishOpts::discovery()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Failed to publish trigger '{topic}': {err}");
                false
            }
        };
        record.messages.insert(topic, PublishedMessage { payload, published });
    }

    pub async fn adjust_message_before_publish(&self, entity: &Entity, message: &mut Map<String, Value>) {
        if let Some(record) = self.store.lock().await.get(&entity.id) {
            for (property, value) in &record.mock_properties {
                if !message.contains_key(property) {
                    message.insert(property.clone(), value.clone());
                }
            }
        }

        if let Some(Value::Object(color)) = message.get_mut("color") {
            if let Some(hue) = color.get("hue").cloned() {
                color.insert("h".into(), hue);
            }
            if let Some(saturation) = color.get("saturation").cloned() {
                color.insert("s".into(), saturation);
            }
        }

        let supports_ota = entity.definition().is_some_and(|definition| definition.supports_ota);
        let has_latest = message
            .get("update")
            .and_then(|update| update.get("latest_version"))
            .is_some_and(|version| !version.is_null());
        if supports_ota && !has_latest {
            let mut update = match message.remove("update") {
                Some(Value::Object(update)) => update,
                _ => Map::new(),
            };
            update.insert("installed_version".into(), (-1).into());
            update.insert("latest_version".into(), (-1).into());
            message.insert("update".into(), Value::Object(update));
        }
    }

    pub async fn on_entity_state(&self, id: &EntityId, state: &Map<String, Value>) -> Result<()> {
        let Some(entity) = self.lookup(id) else {
            return Ok(());
        };
        let Some(definition) = entity.definition() else {
            return Ok(());
        };

        let object_ids = match self.store.lock().await.get(id) {
            Some(record) => record
                .messages
                .keys()
                .filter_map(|topic| DiscoveryTopic::parse(&self.config.discovery_topic, topic).ok())
                .map(|topic| topic.object_id)
                .collect::<BTreeSet<_>>(),
            None => BTreeSet::new(),
        };

        let endpoints = object_ids
            .iter()
            .filter_map(|object_id| {
                ENDPOINT_PREFIXES.iter().find_map(|prefix| object_id.strip_prefix(prefix))
            })
            .filter(|endpoint| {
                definition
                    .exposes
                    .iter()
                    .any(|cap| cap.info().endpoint.as_deref() == Some(*endpoint))
            })
            .collect::<BTreeSet<_>>();

        for endpoint in endpoints {
            let split = state
                .iter()
                .filter_map(|(key, value)| {
                    let key = key.strip_suffix(endpoint)?.strip_suffix('_')?;
                    Some((key.to_owned(), value.clone()))
                })
                .collect::<Map<_, _>>();

            if !split.is_empty() {
                let topic = state_topic(&self.config.base_topic, &entity.name, Some(endpoint));
                self.transport
                    .publish(&topic, &serde_json::to_string(&split)?, PublishOpts::state())
                    .await?;
            }
        }

        for key in TRIGGER_KEYS {
            let value = match state.get(key) {
                Some(Value::String(value)) if !value.is_empty() => value.clone(),
                Some(Value::String(_) | Value::Null) | None => continue,
                Some(other) => other.to_string(),
            };

            self.publish_device_trigger(&entity, key, &value, false).await;

            let topic = state_topic(&self.config.base_topic, &entity.name, Some(key));
            self.transport.publish(&topic, &value, PublishOpts::state()).await?;
        }

        Ok(())
    }

    pub async fn republish_states(&self) {
        for entity in self.directory.entities() {
            let Some(mut state) = self.directory.cached_state(&entity.id) else {
                continue;
            };

            self.adjust_message_before_publish(&entity, &mut state).await;
            let topic = state_topic(&self.config.base_topic, &entity.name, None);
            let payload = match serde_json::to_string(&state) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!("Failed to serialize state of '{}': {err}", entity.name);
                    continue;
                }
            };
            if let Err(err) = self.transport.publish(&topic, &payload, PublishOpts::state()).await {
                tracing::warn!("Failed to republish '{topic}': {err}");
            }
        }
    }
}

fn apply_entry_overrides(entity: &Entity, entries: &[DiscoveryEntry]) -> Vec<DiscoveryEntry> {
    let overrides = &entity.options.homeassistant;
    let include = overrides.include();

    entries
        .iter()
        .filter(|entry| {
            include.as_ref().is_none_or(|include| include.contains(&entry.object_id.as_str()))
        })
        .filter(|entry| overrides.object(&entry.object_id) != Some(None))
        .map(|entry| {
            let mut entry = entry.clone();
            if let Some(Some(object)) = overrides.object(&entry.object_id) {
                if let Some(platform) = object.get("type").and_then(Value::as_str) {
                    match platform.parse() {
                        Ok(platform) => entry.platform = platform,
                        Err(err) => tracing::warn!("Ignoring type override '{platform}': {err}"),
                    }
                }
                if let Some(object_id) = object.get("object_id").and_then(Value::as_str) {
                    entry.object_id = object_id.to_owned();
                }
            }
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use meshbridge_common::entity::{DiscoveryOverrides, Scene};

    use super::*;
    use crate::testing::{Engine, Op, RecordingTransport, config, definition_with, engine};

    const BATTERY_TOPIC: &str = "homeassistant/sensor/0x01/battery/config";

    fn battery_sensor() -> Entity {
        definition_with(
            "0x01",
            "sensor",
            vec![json!({ "type": "numeric", "name": "battery", "property": "battery", "access": 1, "unit": "%" })],
        )
    }

    fn numeric(name: &str) -> Value {
        json!({ "type": "numeric", "name": name, "property": name, "access": 1 })
    }

    fn object_ids(discovery: &Engine, entity: &Entity) -> Vec<String> {
        discovery.entries(entity).into_iter().map(|e| e.object_id).collect()
    }

    fn published(transport: &RecordingTransport, topic: &str) -> Vec<String> {
        transport
            .publishes()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload)
            .collect()
    }

    fn last_config(transport: &RecordingTransport, topic: &str) -> Value {
        let payload = published(transport, topic).pop().unwrap();
        serde_json::from_str(&payload).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn battery_sensor_is_announced_after_startup() {
        let (discovery, transport, _) = engine(config(), vec![battery_sensor()]);
        discovery.start().await.unwrap();

        let ops = transport.ops();
        let unsubscribed = ops
            .iter()
            .position(|op| *op == Op::Unsubscribe("homeassistant/#".into()))
            .unwrap();
        assert_eq!(ops[0], Op::Subscribe("homeassistant/#".into()));
        assert!(!ops[..unsubscribed].iter().any(|op| matches!(op, Op::Publish { .. })));

        let payload = last_config(&transport, BATTERY_TOPIC);
        assert_eq!(payload["device_class"], "battery");
        assert_eq!(payload["state_class"], "measurement");
        assert_eq!(payload["unit_of_measurement"], "%");
        assert_eq!(payload["value_template"], "{{ value_json.battery }}");
        assert_eq!(payload["state_topic"], "z2m/sensor");
        assert_eq!(payload["unique_id"], "0x01_battery_z2m");
        assert!(discovery.is_discovered(&EntityId::from("0x01")).await);

        let bridge_topic = "homeassistant/binary_sensor/12250109_0x00124b0012345678/connection_state/config";
        assert_eq!(published(&transport, bridge_topic).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settable_binary_becomes_switch() {
        let child_lock = definition_with(
            "0x01",
            "sensor",
            vec![json!({ "type": "binary", "name": "child_lock", "property": "child_lock",
                         "access": 3, "value_on": true, "value_off": false })],
        );
        let (discovery, transport, _) = engine(config(), vec![child_lock]);
        discovery.start().await.unwrap();

        let payload = last_config(&transport, "homeassistant/switch/0x01/switch_child_lock/config");
        assert_eq!(payload["payload_on"], "true");
        assert_eq!(payload["payload_off"], "false");
        assert_eq!(
            payload["value_template"],
            "{% if value_json.child_lock %}true{% else %}false{% endif %}"
        );
        assert_eq!(payload["command_topic"], "z2m/sensor/set/child_lock");
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_entries_are_not_republished() {
        let (discovery, transport, _) = engine(config(), vec![battery_sensor()]);
        discovery.start().await.unwrap();
        transport.take();

        discovery.request_pass(&EntityId::from("0x01"), true).await;
        assert!(transport.ops().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_entries_are_retracted_once() {
        let (discovery, transport, registry) = engine(config(), vec![battery_sensor()]);
        discovery.start().await.unwrap();
        transport.take();

        let id = EntityId::from("0x01");
        registry.insert(definition_with("0x01", "sensor", vec![]));
        discovery.request_pass(&id, true).await;
        discovery.request_pass(&id, true).await;

        assert_eq!(published(&transport, BATTERY_TOPIC), vec![String::new()]);
    }

    #[tokio::test(start_paused = true)]
    async fn excluded_entity_is_retracted() {
        let (discovery, transport, registry) = engine(config(), vec![battery_sensor()]);
        discovery.start().await.unwrap();
        transport.take();

        let mut excluded = battery_sensor();
        excluded.options.homeassistant = DiscoveryOverrides::Excluded;
        registry.insert(excluded);
        discovery.request_pass(&EntityId::from("0x01"), true).await;

        assert_eq!(published(&transport, BATTERY_TOPIC), vec![String::new()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publish_is_retried_by_next_pass() {
        let (discovery, transport, _) = engine(config(), vec![battery_sensor()]);
        transport.set_failing(true);
        discovery.start().await.unwrap();
        assert!(published(&transport, BATTERY_TOPIC).is_empty());

        transport.set_failing(false);
        discovery.request_pass(&EntityId::from("0x01"), true).await;
        assert_eq!(published(&transport, BATTERY_TOPIC).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rename_retracts_before_recreating() {
        let (discovery, transport, registry) = engine(config(), vec![battery_sensor()]);
        discovery.start().await.unwrap();
        transport.take();

        let id = EntityId::from("0x01");
        registry.rename(&id, "sensor_2");
        discovery.rename(&id).await;

        let publishes = transport.publishes();
        let last_retraction = publishes.iter().rposition(|(_, p)| p.is_empty()).unwrap();
        let first_config = publishes.iter().position(|(_, p)| !p.is_empty()).unwrap();
        assert!(last_retraction < first_config);

        assert_eq!(last_config(&transport, BATTERY_TOPIC)["state_topic"], "z2m/sensor_2");
    }

    #[tokio::test(start_paused = true)]
    async fn retained_configs_seed_the_store() {
        let (discovery, transport, _) = engine(config(), vec![battery_sensor()]);
        let id = EntityId::from("0x01");
        discovery.request_pass(&id, false).await;

        let retained = discovery.store.lock().await.get(&id).unwrap().messages[BATTERY_TOPIC]
            .payload
            .clone();
        discovery.on_discovery_message(BATTERY_TOPIC, &retained).await;

        // capability the device no longer exposes
        let stale = "homeassistant/sensor/0x01/temperature/config";
        let ours = json!({ "state_topic": "z2m/sensor" }).to_string();
        discovery.on_discovery_message(stale, &ours).await;

        // another gateway's device
        let foreign = json!({ "state_topic": "other/sensor" }).to_string();
        discovery.on_discovery_message("homeassistant/sensor/0xdead/battery/config", &foreign).await;

        discovery.on_discovery_message(BATTERY_TOPIC, "not json").await;
        assert!(transport.publishes().is_empty());

        discovery.finish_startup().await;
        discovery.request_pass(&id, true).await;

        assert!(published(&transport, BATTERY_TOPIC).is_empty());
        assert_eq!(published(&transport, stale), vec![String::new()]);
        assert_eq!(transport.publishes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn action_state_publishes_trigger_once() {
        let (discovery, transport, _) = engine(config(), vec![battery_sensor()]);
        discovery.start().await.unwrap();
        transport.take();

        let id = EntityId::from("0x01");
        let state = json!({ "action": "single", "battery": 80 });
        let state = state.as_object().unwrap();
        discovery.on_entity_state(&id, state).await.unwrap();
        discovery.on_entity_state(&id, state).await.unwrap();

        let trigger_topic = "homeassistant/device_automation/0x01/action_single/config";
        assert_eq!(published(&transport, trigger_topic).len(), 1);
        let trigger = last_config(&transport, trigger_topic);
        assert_eq!(trigger["type"], "action");
        assert_eq!(trigger["subtype"], "single");
        assert_eq!(trigger["topic"], "z2m/sensor/action");

        assert_eq!(published(&transport, "z2m/sensor/action"), vec!["single", "single"]);

        // triggers survive passes that do not produce them
        transport.take();
        discovery.request_pass(&id, true).await;
        assert!(transport.ops().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn group_light_prefers_hs_when_listed_first() {
        let light = |features: Vec<Value>| json!({ "type": "light", "features": features });
        let state = json!({ "type": "binary", "name": "state", "property": "state", "access": 7,
                            "value_on": "ON", "value_off": "OFF" });
        let color = |name: &str| {
            json!({ "type": "composite", "name": name, "property": "color", "access": 7, "features": [] })
        };

        let a = definition_with("0x0a", "a", vec![light(vec![state.clone(), color("color_xy")])]);
        let b = definition_with(
            "0x0b",
            "b",
            vec![light(vec![state, color("color_hs"), color("color_xy")])],
        );
        let group = Entity::group(1, "lounge", vec!["0x0a".into(), "0x0b".into()]);
        let (discovery, _, _) = engine(config(), vec![a, b, group.clone()]);

        let entries = discovery.entries(&group);
        let light = entries.iter().find(|e| e.platform == Platform::Light).unwrap();
        assert_eq!(light.get("supported_color_modes"), Some(&json!(["hs"])));
    }

    #[tokio::test(start_paused = true)]
    async fn state_hook_fills_expected_fields() {
        let mut bulb = definition_with("0x02", "bulb", vec![]);
        if let EntityKind::Device(device) = &mut bulb.kind {
            device.definition.as_mut().unwrap().supports_ota = true;
        }
        let (discovery, _, _) = engine(config(), vec![bulb.clone()]);
        discovery.request_pass(&bulb.id, false).await;

        let update = discovery
            .entries(&bulb)
            .into_iter()
            .find(|e| e.platform == Platform::Update)
            .unwrap();
        assert_eq!(update.get_str("payload_install"), Some("{\"id\": \"0x02\"}"));

        let mut message = json!({ "color": { "hue": 10, "saturation": 20 } })
            .as_object()
            .unwrap()
            .clone();
        discovery.adjust_message_before_publish(&bulb, &mut message).await;

        assert_eq!(message["color"], json!({ "hue": 10, "saturation": 20, "h": 10, "s": 20 }));
        assert_eq!(message["update"], json!({ "installed_version": -1, "latest_version": -1 }));
        assert_eq!(message["update_state"], Value::Null);
        assert!(message.contains_key("update_state"));
    }

    #[tokio::test(start_paused = true)]
    async fn overrides_filter_and_rename_entries() {
        let mut sensor = definition_with(
            "0x01",
            "sensor",
            vec![
                json!({ "type": "numeric", "name": "battery", "property": "battery", "access": 1, "unit": "%" }),
                json!({ "type": "numeric", "name": "linkquality", "property": "linkquality", "access": 1 }),
            ],
        );
        sensor.options.homeassistant = DiscoveryOverrides::Custom(
            json!({ "linkquality": null, "battery": { "object_id": "power" } })
                .as_object()
                .unwrap()
                .clone(),
        );
        let (discovery, _, _) = engine(config(), vec![sensor.clone()]);

        let ids = discovery.entries(&sensor).into_iter().map(|e| e.object_id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["power"]);
    }

    #[tokio::test(start_paused = true)]
    async fn entity_joining_during_grace_window_is_announced() {
        let (discovery, transport, registry) = engine(config(), vec![]);
        let startup = tokio::spawn({
            let discovery = discovery.clone();
            async move { discovery.start().await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        registry.insert(battery_sensor());
        discovery.request_pass(&EntityId::from("0x01"), true).await;
        assert!(transport.publishes().is_empty());

        startup.await.unwrap().unwrap();
        assert_eq!(published(&transport, BATTERY_TOPIC).len(), 1);
        assert!(discovery.is_discovered(&EntityId::from("0x01")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_during_a_pass_fold_into_one_follow_up() {
        let battery = json!({ "type": "numeric", "name": "battery", "property": "battery", "access": 1, "unit": "%" });
        let (discovery, transport, registry) = engine(config(), vec![battery_sensor()]);
        discovery.start().await.unwrap();
        transport.take();

        let id = EntityId::from("0x01");
        registry.insert(definition_with("0x01", "sensor", vec![battery.clone(), numeric("temperature")]));
        transport.set_delay(Some(Duration::from_secs(1)));
        let running = tokio::spawn({
            let (discovery, id) = (discovery.clone(), id.clone());
            async move { discovery.request_pass(&id, true).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        registry.insert(definition_with(
            "0x01",
            "sensor",
            vec![battery, numeric("temperature"), numeric("linkquality")],
        ));
        discovery.request_pass(&id, false).await;
        discovery.request_pass(&id, true).await;

        assert_eq!(discovery.passes.lock().unwrap().get(&id), Some(&Some(true)));
        assert!(transport.publishes().is_empty());

        running.await.unwrap();
        assert_eq!(published(&transport, "homeassistant/sensor/0x01/temperature/config").len(), 1);
        assert_eq!(published(&transport, "homeassistant/sensor/0x01/linkquality/config").len(), 1);
        assert!(discovery.passes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rename_replays_known_triggers() {
        let (discovery, transport, registry) = engine(config(), vec![battery_sensor()]);
        discovery.start().await.unwrap();

        let id = EntityId::from("0x01");
        let state = json!({ "action": "single" });
        discovery.on_entity_state(&id, state.as_object().unwrap()).await.unwrap();
        transport.take();

        registry.rename(&id, "sensor_2");
        discovery.rename(&id).await;

        let trigger_topic = "homeassistant/device_automation/0x01/action_single/config";
        let payloads = published(&transport, trigger_topic);
        assert_eq!(payloads.len(), 2);
        assert!(payloads[0].is_empty());
        assert_eq!(last_config(&transport, trigger_topic)["topic"], "z2m/sensor_2/action");
    }

    #[tokio::test(start_paused = true)]
    async fn scene_change_recreates_only_scenes() {
        let with_scenes = |scenes: &[(u8, &str)]| {
            let mut entity = battery_sensor();
            if let EntityKind::Device(device) = &mut entity.kind {
                device.scenes = scenes
                    .iter()
                    .map(|&(id, name)| Scene { id, name: name.into() })
                    .collect();
            }
            entity
        };
        let (discovery, transport, registry) =
            engine(config(), vec![with_scenes(&[(1, "Relax"), (2, "Bright")])]);
        discovery.start().await.unwrap();

        let relax = "homeassistant/scene/0x01/scene_1/config";
        let bright = "homeassistant/scene/0x01/scene_2/config";
        assert_eq!(published(&transport, relax).len(), 1);
        assert_eq!(last_config(&transport, bright)["payload_on"], "{ \"scene_recall\": 2 }");
        transport.take();

        let id = EntityId::from("0x01");
        registry.insert(with_scenes(&[(1, "Relax")]));
        discovery.scenes_changed(&id).await;

        assert_eq!(published(&transport, bright), vec![String::new()]);
        let payloads = published(&transport, relax);
        assert_eq!(payloads.len(), 2);
        assert!(payloads[0].is_empty());
        assert_eq!(last_config(&transport, relax)["name"], "Relax");
        assert!(published(&transport, BATTERY_TOPIC).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_configs_naming_our_devices_are_retracted() {
        let (discovery, transport, _) = engine(config(), vec![battery_sensor()]);
        let foreign = json!({ "state_topic": "other/sensor" }).to_string();

        let by_device = "homeassistant/sensor/0x01/old_battery/config";
        let by_base_topic = "homeassistant/sensor/12250109_gone/state/config";
        let unrelated = "homeassistant/sensor/0xdead/battery/config";
        for topic in [by_device, by_base_topic, unrelated] {
            discovery.on_discovery_message(topic, &foreign).await;
        }
        assert!(transport.publishes().is_empty());

        discovery.finish_startup().await;
        assert_eq!(published(&transport, by_device), vec![String::new()]);
        assert_eq!(published(&transport, by_base_topic), vec![String::new()]);
        assert!(published(&transport, unrelated).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn republish_continues_past_failed_entity() {
        let other = definition_with("0x02", "other", vec![]);
        let (discovery, transport, registry) = engine(config(), vec![battery_sensor(), other]);
        discovery.start().await.unwrap();
        transport.take();

        registry.set_state(&EntityId::from("0x01"), json!({ "battery": 90 }).as_object().unwrap().clone());
        registry.set_state(&EntityId::from("0x02"), json!({ "linkquality": 5 }).as_object().unwrap().clone());
        transport.fail_topic("z2m/sensor");

        discovery.republish_states().await;
        assert_eq!(
            transport.publishes(),
            vec![("z2m/other".to_owned(), json!({ "linkquality": 5 }).to_string())]
        );
    }

    #[test]
    fn legacy_sensors_follow_flags() {
        let action = json!({ "type": "enum", "name": "action", "property": "action", "access": 1,
                             "values": ["single", "double"] });
        let mut remote = definition_with("0x03", "remote", vec![action]);
        if let EntityKind::Device(device) = &mut remote.kind {
            device.definition.as_mut().unwrap().model = "WXKG01LM".into();
        }

        let (discovery, _, _) = engine(config(), vec![remote.clone()]);
        assert!(object_ids(&discovery, &remote).is_empty());

        let legacy = DiscoveryConfig { legacy_action_sensor: true, ..config() };
        let (discovery, _, _) = engine(legacy.clone(), vec![remote.clone()]);
        assert_eq!(object_ids(&discovery, &remote), vec!["action", "click"]);

        remote.options.legacy = Some(false);
        let (discovery, _, _) = engine(legacy, vec![remote.clone()]);
        assert_eq!(object_ids(&discovery, &remote), vec!["action"]);
    }

    #[test]
    fn include_lists_allowed_object_ids() {
        let mut sensor = definition_with("0x01", "sensor", vec![numeric("battery"), numeric("linkquality")]);
        sensor.options.homeassistant = DiscoveryOverrides::Custom(
            json!({ "include": ["linkquality"] }).as_object().unwrap().clone(),
        );
        let (discovery, _, _) = engine(config(), vec![sensor.clone()]);

        assert_eq!(object_ids(&discovery, &sensor), vec!["linkquality"]);
    }

    #[test]
    fn last_seen_and_update_entries() {
        let mut bulb = definition_with("0x02", "bulb", vec![]);
        if let EntityKind::Device(device) = &mut bulb.kind {
            device.definition.as_mut().unwrap().supports_ota = true;
        }

        let iso = DiscoveryConfig { last_seen: LastSeen::Iso8601, ..config() };
        let (discovery, _, _) = engine(iso, vec![bulb.clone()]);
        let entries = discovery.entries(&bulb);
        let ids = entries.iter().map(|e| e.object_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["last_seen", "update_state", "update_available", "update"]);
        assert_eq!(entries[0].get("device_class"), Some(&json!("timestamp")));
        assert_eq!(entries[2].get("device_class"), Some(&json!("update")));

        let epoch = DiscoveryConfig { last_seen: LastSeen::Epoch, legacy_api: false, ..config() };
        let (discovery, _, _) = engine(epoch, vec![bulb.clone()]);
        let entries = discovery.entries(&bulb);
        let ids = entries.iter().map(|e| e.object_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["last_seen", "update_state", "update"]);
        assert_eq!(entries[0].get("device_class"), None);
    }
}
