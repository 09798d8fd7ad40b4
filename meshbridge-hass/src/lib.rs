//! Home Assistant MQTT discovery.
//!
//! Translates the capabilities of every mesh entity into Home Assistant
//! discovery configs, publishes them once per change and retracts them when
//! they are no longer produced.

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod entry;
pub mod finalize;
pub mod mapper;
mod store;

#[cfg(test)]
mod testing;

pub use self::{
    config::DiscoveryConfig,
    discovery::Discovery,
    dispatch::{Dispatcher, Event, NetworkEvent},
    entry::{DiscoveryEntry, MockProperty},
    mapper::MapError,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Home Assistant discovery is not possible with `attribute` output")]
    AttributeOutput,
    #[error("discovery topic cannot be equal to the base topic (got `{0}`)")]
    DiscoveryTopicIsBaseTopic(String),
    #[error("meshbridge error: {0}")]
    Meshbridge(#[from] meshbridge::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("mapping error: {0}")]
    Map(#[from] MapError),
}
