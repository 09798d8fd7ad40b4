use meshbridge_common::{
    Platform,
    capability::{Binary, value_to_string},
};
use serde_json::json;

use super::{display_name, lookup, object_id};
use crate::entry::{DiscoveryEntry, value_template};

pub(super) fn map(binary: &Binary, endpoint: Option<&str>) -> Vec<DiscoveryEntry> {
    let info = &binary.info;
    let property = info.property();

    let entry = if info.access.settable() {
        // the hub compares rendered strings, so booleans need an explicit rendering
        let template = if binary.value_on.is_boolean() {
            format!("{{% if value_json.{property} %}}true{{% else %}}false{{% endif %}}")
        } else {
            value_template(property)
        };

        let mut entry = DiscoveryEntry::new(
            Platform::Switch,
            object_id(&format!("switch_{}", info.name), endpoint),
            json!({
                "name": display_name(info, endpoint),
                "value_template": template,
                "payload_on": value_to_string(&binary.value_on),
                "payload_off": value_to_string(&binary.value_off),
                "command_topic": true,
                "command_topic_postfix": property,
            }),
        );
        entry.set_opt("command_topic_prefix", endpoint);
        entry
    } else {
        DiscoveryEntry::new(
            Platform::BinarySensor,
            object_id(&info.name, endpoint),
            json!({
                "name": display_name(info, endpoint),
                "value_template": value_template(property),
                "payload_on": binary.value_on,
                "payload_off": binary.value_off,
            }),
        )
    };

    let mut entry = entry.mock(property);
    entry.extend(lookup::binary(&info.name));

    vec![entry]
}
