use meshbridge_common::{Platform, capability::Enumerated};
use serde_json::json;

use super::{display_name, lookup};
use crate::entry::{DiscoveryEntry, value_template};

pub(super) fn map(enumerated: &Enumerated, endpoint: Option<&str>) -> Vec<DiscoveryEntry> {
    let info = &enumerated.info;
    let property = info.property();
    let metadata = lookup::enumerated(&info.name);
    let readable = info.access.readable();
    let settable = info.access.settable();

    let mut entries = Vec::new();

    if readable {
        let mut sensor = DiscoveryEntry::new(
            Platform::Sensor,
            property,
            json!({
                "name": display_name(info, endpoint),
                "value_template": value_template(property),
                "enabled_by_default": !settable,
            }),
        )
        .mock(property);
        sensor.extend(metadata.clone());
        entries.push(sensor);
    }

    if settable {
        let options = enumerated.value_strings();

        let mut select = DiscoveryEntry::new(
            Platform::Select,
            property,
            json!({
                "name": display_name(info, endpoint),
                "state_topic": readable,
                "command_topic": true,
                "command_topic_postfix": property,
                "enabled_by_default": options.len() != 1,
            }),
        );
        if readable {
            select.set("value_template", value_template(property));
            select = select.mock(property);
        }
        select.set_opt("command_topic_prefix", endpoint);
        select.extend(metadata.clone());
        select.set("options", options.clone());
        entries.push(select);

        // a single value is an action, not a choice
        if let [value] = options.as_slice() {
            let mut button = DiscoveryEntry::new(
                Platform::Button,
                format!("{property}_{value}"),
                json!({
                    "name": format!("{} {value}", display_name(info, endpoint)),
                    "state_topic": false,
                    "command_topic": true,
                    "command_topic_postfix": property,
                    "payload_press": value,
                }),
            );
            button.set_opt("command_topic_prefix", endpoint);
            button.extend(metadata);
            entries.push(button);
        }
    }

    entries
}
