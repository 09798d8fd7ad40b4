use meshbridge_common::{Capability, Platform};
use serde_json::json;

use super::display_name;
use crate::entry::{DiscoveryEntry, value_template};

pub(super) fn map(cap: &Capability, endpoint: Option<&str>) -> Vec<DiscoveryEntry> {
    let info = cap.info();
    let property = info.property();
    let settable_text = matches!(cap, Capability::Text(_)) && info.access.settable();

    let mut entries = Vec::new();

    if info.access.readable() {
        entries.push(
            DiscoveryEntry::new(
                Platform::Sensor,
                property,
                json!({
                    "name": display_name(info, endpoint),
                    "value_template": format!(
                        "{{{{ value_json.{property} | default('',True) | string | truncate(254, True, '', 0) }}}}"
                    ),
                    "enabled_by_default": !settable_text,
                }),
            )
            .mock(property),
        );
    }

    if settable_text {
        let readable = info.access.readable();
        let mut text = DiscoveryEntry::new(
            Platform::Text,
            property,
            json!({
                "name": display_name(info, endpoint),
                "state_topic": readable,
                "command_topic": true,
                "command_topic_postfix": property,
            }),
        );
        if readable {
            text.set("value_template", value_template(property));
        }
        text.set_opt("command_topic_prefix", endpoint);
        entries.push(text);
    }

    entries
}
