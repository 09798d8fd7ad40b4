use core::{convert::Infallible, sync::atomic::AtomicU16};
use std::{collections::BTreeMap, sync::Arc};

use mqtt_endpoint_tokio::mqtt_ep::{
    self, Endpoint,
    packet::v5_0,
    role,
    transport::{TcpTransport, connect_helper},
};
use mqtt_protocol_core::mqtt::packet::{
    Property, Qos, SubEntry, SubOpts, SubscriptionIdentifier,
    v5_0::{Connack, Publish},
};
use tokio::sync::Mutex;

pub mod directory;
pub mod events;
pub mod log;
pub mod transport;

pub use meshbridge_common as common;

pub use self::{
    directory::{Directory, Registry},
    events::{EventBus, Subscription},
    transport::{MqttTransport, Transport},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("mqtt transport error: {0}")]
    MqttTransport(#[from] mqtt_ep::TransportError),
    #[error("mqtt connection error: {0}")]
    MqttConnection(#[from] mqtt_ep::ConnectionError),
    #[error("mqtt packet field error: {0}")]
    MqttPacketField(&'static str),
    #[error("mqtt packet error: {0}")]
    MqttPacket(mqtt_ep::result_code::MqttError),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("connection closed")]
    Closed,
}

impl From<mqtt_ep::result_code::MqttError> for Error {
    fn from(e: mqtt_ep::result_code::MqttError) -> Self {
        Error::MqttPacket(e)
    }
}

pub(crate) type SubscriptionHandler = Box<dyn FnMut(PublishEvent) -> bool + Send + Sync>;

pub struct MqttConnection {
    endpoint: Endpoint<role::Client>,
    next_packet_id: AtomicU16,
    // key could be SubscriptionIdentifier if it implemented Ord
    sub_handlers: Mutex<BTreeMap<u32, SubscriptionHandler>>,
}

impl MqttConnection {
    pub async fn connect(client_id: &str, addr: &str) -> Result<Arc<Self>> {
        let endpoint = mqtt_ep::endpoint::Endpoint::<role::Client>::new(mqtt_ep::Version::V5_0);

        let tcp_stream = connect_helper::connect_tcp(addr, None).await?;
        let transport = TcpTransport::from_stream(tcp_stream);
        endpoint
            .attach(transport, mqtt_ep::endpoint::Mode::Client)
            .await?;

        let connect = v5_0::Connect::builder().client_id(client_id)?.build()?;

        endpoint.send(connect).await?;

        let packet = endpoint.recv().await?;
        let connack: Connack = packet.try_into().map_err(Error::MqttPacketField)?;
        tracing::debug!("Received CONNACK: {connack:?}");

        Ok(MqttConnection {
            endpoint,
            next_packet_id: AtomicU16::new(1),
            sub_handlers: Mutex::new(BTreeMap::new()),
        }
        .into())
    }

    fn next_packet_id(&self) -> u16 {
        loop {
            let id = self
                .next_packet_id
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            if id != 0 {
                break id;
            }
        }
    }

    fn next_subscription_id(&self) -> Result<SubscriptionIdentifier> {
        // max value is 2^28 - 1 (min value is also 1)
        SubscriptionIdentifier::new(self.next_packet_id() as u32)
            .map_err(|_| Error::MqttPacketField("subscription identifier"))
    }

    pub async fn recv(&self) -> Result<PublishEvent> {
        loop {
            let packet = self.endpoint.recv().await?;

            let publish: Result<Publish, _> = packet.try_into();
            if let Ok(publish) = publish {
                let sub_id = publish.props.iter().find_map(|p| {
                    if let Property::SubscriptionIdentifier(id) = p {
                        Some(id.clone())
                    } else {
                        None
                    }
                });

                break Ok(PublishEvent {
                    sub_id,
                    topic: publish.topic_name().to_owned(),
                    payload: publish.payload().as_slice().to_vec(),
                });
            }
        }
    }

    pub async fn handle(&self) -> Result<Infallible> {
        loop {
            let event = self.recv().await?;

            tracing::trace!("Handling publish on {}", event.topic);

            if let Some(sub_id) = event.sub_id.clone() {
                let mut handlers = self.sub_handlers.lock().await;

                if let Some(handler) = handlers.get_mut(&sub_id.val()) {
                    let retain = handler(event);

                    if !retain {
                        tracing::debug!("Removing subscription handler for ID {}", sub_id.val());
                        handlers.remove(&sub_id.val());
                    }
                }
            }
        }
    }

    pub async fn subscribe(&self, topic: &str) -> Result<SubscriptionIdentifier> {
        let sub_id = self.next_subscription_id()?;

        let subscribe = v5_0::Subscribe::builder()
            .packet_id(self.next_packet_id())
            .props(vec![Property::SubscriptionIdentifier(sub_id.clone())])
            .entries(vec![SubEntry::new(
                topic.to_string(),
                SubOpts::new().set_qos(Qos::AtLeastOnce),
            )?])
            .build()?;

        tracing::info!("Subscribing to topic '{topic}'");

        self.endpoint
            .register_packet_id(subscribe.packet_id())
            .await?;

        self.endpoint.send(subscribe).await?;

        Ok(sub_id)
    }

    pub async fn subscribe_with_handler(
        &self,
        topic: &str,
        handler: SubscriptionHandler,
    ) -> Result<u32> {
        let sub_id = self.subscribe(topic).await?.val();

        let mut handlers = self.sub_handlers.lock().await;
        handlers.insert(sub_id, handler);

        Ok(sub_id)
    }

    pub async fn remove_handler(&self, sub_id: u32) -> bool {
        self.sub_handlers.lock().await.remove(&sub_id).is_some()
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        let unsubscribe = unsubscribe_packet(self.next_packet_id(), topic)?;

        tracing::info!("Unsubscribing from topic '{topic}'");

        self.endpoint
            .register_packet_id(unsubscribe.packet_id())
            .await?;

        self.endpoint.send(unsubscribe).await?;

        Ok(())
    }

    pub async fn publish(&self, topic: &str, payload: String, opts: PublishOpts) -> Result<()> {
        tracing::debug!("Publishing to topic {topic}: {payload}");

        let publish = v5_0::Publish::builder()
            .topic_name(topic.to_string())?
            .payload(payload)
            .qos(opts.qos)
            .retain(opts.retain)
            .packet_id(self.next_packet_id())
            .build()?;

        if let Some(packet_id) = publish.packet_id() {
            self.endpoint.register_packet_id(packet_id).await?;
        }

        self.endpoint.send(publish).await?;

        Ok(())
    }
}

fn unsubscribe_packet(packet_id: u16, topic: &str) -> Result<v5_0::Unsubscribe> {
    Ok(v5_0::Unsubscribe::builder()
        .packet_id(packet_id)
        .entries(vec![topic])?
        .build()?)
}

#[derive(Debug, Clone)]
pub struct PublishEvent {
    pub sub_id: Option<SubscriptionIdentifier>,
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishEvent {
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOpts {
    pub qos: Qos,
    pub retain: bool,
}

impl PublishOpts {
    pub const fn discovery() -> Self {
        Self { qos: Qos::AtLeastOnce, retain: true }
    }

    pub const fn state() -> Self {
        Self { qos: Qos::AtLeastOnce, retain: false }
    }
}
