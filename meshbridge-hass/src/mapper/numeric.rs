use meshbridge_common::{Platform, capability::Numeric};
use serde_json::json;

use super::{display_name, lookup, object_id};
use crate::entry::{DiscoveryEntry, value_template};

pub(super) fn map(numeric: &Numeric, endpoint: Option<&str>) -> Vec<DiscoveryEntry> {
    let info = &numeric.info;
    let property = info.property();
    let unit = numeric.unit.as_deref();
    let settable = info.access.settable();
    let object_id = object_id(&info.name, endpoint);

    let mut metadata = lookup::numeric(&info.name);
    if metadata.is_empty() {
        metadata = unit.map(lookup::numeric_unit).unwrap_or_default();
    }
    if matches!(unit, Some("Wh" | "kWh")) {
        metadata.insert("device_class".into(), "energy".into());
        metadata.insert("state_class".into(), "total_increasing".into());
    }

    let mut sensor = DiscoveryEntry::new(
        Platform::Sensor,
        object_id.clone(),
        json!({
            "name": display_name(info, endpoint),
            "value_template": value_template(property),
            "enabled_by_default": !settable,
        }),
    )
    .mock(property);
    sensor.set_opt("unit_of_measurement", unit);
    sensor.extend(metadata.clone());

    // a device class without a unit is rejected by the hub
    if unit.is_none() {
        sensor.remove("device_class");
    }
    if sensor.get_str("entity_category") == Some("config") {
        sensor.set("entity_category", "diagnostic");
    }

    let mut entries = vec![sensor];

    if settable {
        let mut number = DiscoveryEntry::new(
            Platform::Number,
            object_id,
            json!({
                "name": display_name(info, endpoint),
                "value_template": value_template(property),
                "command_topic": true,
                "command_topic_postfix": property,
            }),
        )
        .mock(property);
        number.set_opt("command_topic_prefix", endpoint);
        number.set_opt("unit_of_measurement", unit);
        number.set_opt("step", numeric.value_step.clone());
        number.set_opt("min", numeric.value_min.clone());
        number.set_opt("max", numeric.value_max.clone());
        number.extend(metadata);

        if number.get_str("device_class") != Some("temperature") {
            number.remove("device_class");
        }
        number.remove("state_class");

        entries.push(number);
    }

    entries
}
