use meshbridge_common::{Capability, CapabilityKind, Platform, capability::Specific};
use serde_json::json;

use super::{MapError, capitalize, humanize, missing, object_id};
use crate::entry::{DiscoveryEntry, value_template};

/// Switch properties that get their own entity instead of the primary switch.
const DISTINCT: [&str; 4] = ["valve_detection", "window_detection", "auto_lock", "away_mode"];

pub(super) fn map(switch: &Specific, endpoint: Option<&str>) -> Result<Vec<DiscoveryEntry>, MapError> {
    let state = switch
        .feature("state")
        .and_then(Capability::as_binary)
        .ok_or_else(|| missing(CapabilityKind::Switch, "state"))?;
    let property = state.info.property();

    let mut entry = DiscoveryEntry::new(
        Platform::Switch,
        object_id("switch", endpoint),
        json!({
            "name": endpoint.map(capitalize),
            "payload_on": state.value_on,
            "payload_off": state.value_off,
            "value_template": value_template(property),
            "command_topic": true,
        }),
    )
    .mock(property);
    entry.set_opt("command_topic_prefix", endpoint);

    if DISTINCT.contains(&property) {
        entry.object_id = property.to_owned();
        entry.set("name", humanize(property));
        entry.set("command_topic_postfix", property);
        entry.set("state_on", state.value_on.clone());
        entry.set("state_off", state.value_off.clone());

        if property == "window_detection" {
            entry.set("icon", "mdi:window-open-variant");
        }
    }

    Ok(vec![entry])
}
