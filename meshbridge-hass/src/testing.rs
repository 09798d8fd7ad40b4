//! Fixtures shared by the unit tests of this crate.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use meshbridge::{PublishOpts, Registry, Transport};
use meshbridge_common::{Entity, entity::Definition};
use serde_json::Value;

use crate::{Discovery, DiscoveryConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Publish { topic: String, payload: String, opts: PublishOpts },
    Subscribe(String),
    Unsubscribe(String),
}

/// [`Transport`] that records every operation instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    ops: Mutex<Vec<Op>>,
    failing: AtomicBool,
    failing_topics: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn take(&self) -> Vec<Op> {
        core::mem::take(&mut *self.ops.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn publishes(&self) -> Vec<(String, String)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Publish { topic, payload, .. } => Some((topic, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap_or_else(PoisonError::into_inner).push(topic.to_owned());
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    fn record(&self, op: Op) {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).push(op);
    }
}

impl Transport for RecordingTransport {
    async fn publish(&self, topic: &str, payload: &str, opts: PublishOpts) -> meshbridge::Result<()> {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing_topic = self
            .failing_topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|failing| failing == topic);
        if failing_topic || self.failing.load(Ordering::SeqCst) {
            return Err(meshbridge::Error::Closed);
        }

        self.record(Op::Publish { topic: topic.to_owned(), payload: payload.to_owned(), opts });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> meshbridge::Result<()> {
        self.record(Op::Subscribe(topic.to_owned()));
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> meshbridge::Result<()> {
        self.record(Op::Unsubscribe(topic.to_owned()));
        Ok(())
    }
}

pub fn bridge() -> Entity {
    Entity::bridge("0x00124b0012345678")
}

pub fn definition_with(ieee_address: &str, name: &str, exposes: Vec<Value>) -> Entity {
    let exposes = exposes
        .into_iter()
        .map(|cap| serde_json::from_value(cap).unwrap())
        .collect();

    Entity::device(
        ieee_address,
        name,
        Definition {
            model: "TEST".into(),
            vendor: "Acme".into(),
            description: "Test device".into(),
            supports_ota: false,
            exposes,
        },
    )
}

pub fn config() -> DiscoveryConfig {
    DiscoveryConfig { base_topic: "z2m".into(), version: "1.2.3".into(), ..Default::default() }
}

pub type Engine = Discovery<RecordingTransport, Registry>;

pub fn engine(
    config: DiscoveryConfig,
    entities: Vec<Entity>,
) -> (Arc<Engine>, Arc<RecordingTransport>, Arc<Registry>) {
    let transport = Arc::new(RecordingTransport::default());
    let registry = Arc::new(Registry::new(bridge()));
    for entity in entities {
        registry.insert(entity);
    }

    let discovery = Discovery::new(config, transport.clone(), registry.clone()).unwrap();
    (Arc::new(discovery), transport, registry)
}
