use meshbridge_common::{Capability, CapabilityKind, Platform, capability::Specific};
use serde_json::json;

use super::{MapError, missing};
use crate::entry::{DiscoveryEntry, value_template};

pub(super) fn map(lock: &Specific, endpoint: Option<&str>) -> Result<Vec<DiscoveryEntry>, MapError> {
    if endpoint.is_some() {
        return Err(MapError::Endpoint(CapabilityKind::Lock));
    }

    let state = lock
        .feature("state")
        .and_then(Capability::as_binary)
        .ok_or_else(|| missing(CapabilityKind::Lock, "state"))?;
    let property = state.info.property();

    let mut entry = DiscoveryEntry::new(
        Platform::Lock,
        "lock",
        json!({
            "name": null,
            "command_topic": true,
            "value_template": value_template(property),
        }),
    )
    .mock(property);

    // kept under their old object ids, renaming would orphan existing entities
    let legacy = match property {
        "keypad_lockout" => Some(("keypad_lock", "Keypad lock", "mdi:lock")),
        "child_lock" => Some(("child_lock", "Child lock", "mdi:account-lock")),
        _ => None,
    };

    match legacy {
        Some((object_id, name, icon)) => {
            entry.object_id = object_id.into();
            entry.set("name", name);
            entry.set("icon", icon);
            entry.set("state_topic", true);
            entry.set("command_topic_postfix", property);
            entry.set("payload_lock", state.value_on.clone());
            entry.set("payload_unlock", state.value_off.clone());
            entry.set("state_locked", state.value_on.clone());
            entry.set("state_unlocked", state.value_off.clone());
        }
        None => {
            entry.set("state_locked", "LOCK");
            entry.set("state_unlocked", "UNLOCK");
        }
    }

    Ok(vec![entry])
}
