//! Routes gateway events to the discovery engine.

use std::sync::Arc;

use meshbridge::{Directory, Subscription, Transport};
use meshbridge_common::EntityId;
use serde_json::{Map, Value};

use crate::{Discovery, Result, config::DEFAULT_STATUS_TOPIC};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Announce,
    Joined,
    Interviewed,
    Message,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EntityAdded(EntityId),
    EntityRemoved(EntityId),
    EntityRenamed { id: EntityId, from: String, to: String },
    GroupMembersChanged(EntityId),
    /// Capabilities or options of an entity changed
    EntityChanged(EntityId),
    ScenesChanged(EntityId),
    Network(NetworkEvent, EntityId),
    /// A state payload the gateway published for an entity
    EntityState { id: EntityId, state: Map<String, Value> },
    TransportMessage { topic: String, payload: String },
    /// The transport (re)connected
    Connected,
}

/// Owns the engine's subscription to the gateway's event bus. Dropping the
/// dispatcher detaches it.
pub struct Dispatcher<T, D> {
    discovery: Arc<Discovery<T, D>>,
    events: Subscription<Event>,
}

impl<T: Transport, D: Directory> Dispatcher<T, D> {
    pub fn new(discovery: Arc<Discovery<T, D>>, events: Subscription<Event>) -> Self {
        Self { discovery, events }
    }

    pub fn discovery(&self) -> &Arc<Discovery<T, D>> {
        &self.discovery
    }

    pub async fn start(&self) -> Result<()> {
        self.subscribe_status().await?;

        let discovery = self.discovery.clone();
        tokio::spawn(async move {
            if let Err(err) = discovery.start().await {
                tracing::error!("Startup discovery failed: {err}");
            }
        });

        Ok(())
    }

    async fn subscribe_status(&self) -> Result<()> {
        let config = self.discovery.config();
        let transport = self.discovery.transport();

        transport.subscribe(&config.status_topic).await?;
        if config.status_topic != DEFAULT_STATUS_TOPIC {
            transport.subscribe(DEFAULT_STATUS_TOPIC).await?;
        }

        Ok(())
    }

    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            if let Err(err) = self.handle(event).await {
                tracing::warn!("Failed to handle event: {err}");
            }
        }

        tracing::info!("Event bus closed, stopping discovery");
    }

    pub async fn handle(&self, event: Event) -> Result<()> {
        tracing::debug!("Handling {event:?}");

        match event {
            Event::EntityAdded(id)
            | Event::GroupMembersChanged(id)
            | Event::EntityChanged(id) => {
                self.discovery.request_pass(&id, true).await;
            }
            Event::EntityRemoved(id) => self.discovery.remove_entity(&id).await,
            Event::EntityRenamed { id, from, to } => {
                tracing::info!("Recreating discovery of '{from}' as '{to}'");
                let discovery = self.discovery.clone();
                tokio::spawn(async move { discovery.rename(&id).await });
            }
            Event::ScenesChanged(id) => {
                let discovery = self.discovery.clone();
                tokio::spawn(async move { discovery.scenes_changed(&id).await });
            }
            Event::Network(kind, id) => {
                if !self.discovery.is_discovered(&id).await {
                    tracing::debug!("{kind:?} from undiscovered '{id}'");
                    self.discovery.request_pass(&id, true).await;
                }
            }
            Event::EntityState { id, state } => self.discovery.on_entity_state(&id, &state).await?,
            Event::TransportMessage { topic, payload } => self.on_message(&topic, &payload).await,
            Event::Connected => self.subscribe_status().await?,
        }

        Ok(())
    }

    async fn on_message(&self, topic: &str, payload: &str) {
        let config = self.discovery.config();

        if topic == config.status_topic || topic == DEFAULT_STATUS_TOPIC {
            if payload.trim().eq_ignore_ascii_case("online") {
                let discovery = self.discovery.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(discovery.config().timing.republish_delay()).await;
                    discovery.republish_states().await;
                });
            }
            return;
        }

        let below_prefix = topic
            .strip_prefix(config.discovery_topic.as_str())
            .is_some_and(|rest| rest.starts_with('/'));
        if below_prefix {
            self.discovery.on_discovery_message(topic, payload).await;
        }
    }
}
