#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod capability;
pub mod entity;
pub mod topic;

mod string;
pub use string::*;

pub use capability::{Access, Capability, CapabilityKind, Category};
pub use entity::{Entity, EntityKind, EntityOptions};
pub use topic::{DiscoveryTopic, Platform};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_serde() {
        assert_eq!(
            serde_json::to_string(&EntityId::from("0x00158d0001a2b3c4")).unwrap(),
            r#""0x00158d0001a2b3c4""#
        );

        assert_eq!(
            serde_json::from_str::<EntityId>(r#""12""#).unwrap(),
            EntityId::from("12")
        );
    }
}
