use meshbridge_common::{
    Capability, CapabilityKind, Platform,
    capability::{Enumerated, Numeric, Specific},
};
use serde_json::json;

use super::{MapError, capitalize, display_name, missing, object_id};
use crate::entry::{DiscoveryEntry, value_template};

const SETPOINTS: [&str; 2] = ["occupied_heating_setpoint", "current_heating_setpoint"];

const RUNNING_STATE_TEMPLATE: &str = "{% set values = \
    {None:None,'idle':'idle','heat':'heating','cool':'cooling','fan_only':'fan'} %}";

pub(super) fn map(climate: &Specific, endpoint: Option<&str>) -> Result<Vec<DiscoveryEntry>, MapError> {
    let numeric = |name: &str| climate.feature(name).and_then(Capability::as_numeric);
    let enumerated = |name: &str| climate.feature(name).and_then(Capability::as_enum);

    let setpoint = SETPOINTS
        .iter()
        .find_map(|name| numeric(name))
        .ok_or_else(|| missing(CapabilityKind::Climate, "occupied_heating_setpoint"))?;
    let (Some(min), Some(max)) = (&setpoint.value_min, &setpoint.value_max) else {
        return Err(MapError::UnboundedSetpoint(setpoint.info.name.clone()));
    };

    let temperature = numeric("local_temperature")
        .ok_or_else(|| missing(CapabilityKind::Climate, "local_temperature"))?;

    let mut entry = DiscoveryEntry::new(
        Platform::Climate,
        object_id("climate", endpoint),
        json!({
            "name": endpoint.map(capitalize),
            "state_topic": false,
            "temperature_unit": "C",
            "min_temp": min.to_string(),
            "max_temp": max.to_string(),
            "current_temperature_topic": true,
            "current_temperature_template": value_template(temperature.info.property()),
        }),
    );
    entry.set_opt("temp_step", setpoint.value_step.clone());
    entry.set_opt("command_topic_prefix", endpoint);

    if let Some(mode) = enumerated("system_mode") {
        // `sleep` is valid for the device but unknown to the hub
        let modes = mode
            .values
            .iter()
            .filter(|value| value.as_str() != Some("sleep"))
            .cloned()
            .collect::<Vec<_>>();

        entry.set("modes", modes);
        entry.set("mode_state_topic", true);
        entry.set("mode_state_template", value_template(mode.info.property()));
        entry.set("mode_command_topic", "system_mode");
    }

    if let Some(running) = climate.feature("running_state") {
        let property = running.info().property();
        entry = entry.mock(property);
        entry.set("action_topic", true);
        entry.set(
            "action_template",
            format!("{RUNNING_STATE_TEMPLATE}{{{{ values[value_json.{property}] }}}}"),
        );
    }

    let heating = numeric("occupied_heating_setpoint");
    let cooling = numeric("occupied_cooling_setpoint");
    match (heating, cooling) {
        (Some(heating), Some(cooling)) => {
            entry.set("temperature_low_command_topic", heating.info.name.as_str());
            entry.set("temperature_low_state_template", value_template(heating.info.property()));
            entry.set("temperature_low_state_topic", true);
            entry.set("temperature_high_command_topic", cooling.info.name.as_str());
            entry.set("temperature_high_state_template", value_template(cooling.info.property()));
            entry.set("temperature_high_state_topic", true);
        }
        _ => {
            entry.set("temperature_command_topic", setpoint.info.name.as_str());
            entry.set("temperature_state_template", value_template(setpoint.info.property()));
            entry.set("temperature_state_topic", true);
        }
    }

    if let Some(fan_mode) = enumerated("fan_mode") {
        mode_options(&mut entry, "fan_mode", fan_mode);
    }
    if let Some(swing_mode) = enumerated("swing_mode") {
        mode_options(&mut entry, "swing_mode", swing_mode);
    }

    if let Some(preset) = enumerated("preset") {
        entry.set("preset_modes", preset.values.clone());
        entry.set("preset_mode_command_topic", "preset");
        entry.set("preset_mode_value_template", value_template(preset.info.property()));
        entry.set("preset_mode_state_topic", true);
    }

    let mut entries = Vec::new();

    if let Some(calibration) = numeric("local_temperature_calibration") {
        entries.push(calibration_number(calibration, endpoint));
    }

    if let Some(demand) = numeric("pi_heating_demand") {
        let mut sensor = DiscoveryEntry::new(
            Platform::Sensor,
            object_id(&demand.info.name, endpoint),
            json!({
                "name": display_name(&demand.info, endpoint),
                "value_template": value_template(demand.info.property()),
                "entity_category": "diagnostic",
                "icon": "mdi:radiator",
            }),
        )
        .mock(demand.info.property());
        sensor.set_opt("unit_of_measurement", demand.unit.as_deref());
        entries.push(sensor);
    }

    entries.push(entry);
    Ok(entries)
}

fn mode_options(entry: &mut DiscoveryEntry, key: &str, mode: &Enumerated) {
    entry.set(&format!("{key}s"), mode.values.clone());
    entry.set(&format!("{key}_command_topic"), key);
    entry.set(&format!("{key}_state_template"), value_template(mode.info.property()));
    entry.set(&format!("{key}_state_topic"), true);
}

fn calibration_number(calibration: &Numeric, endpoint: Option<&str>) -> DiscoveryEntry {
    let property = calibration.info.property();

    let mut number = DiscoveryEntry::new(
        Platform::Number,
        object_id(&calibration.info.name, endpoint),
        json!({
            "name": display_name(&calibration.info, endpoint),
            "value_template": value_template(property),
            "command_topic": true,
            "command_topic_postfix": property,
            "device_class": "temperature",
            "entity_category": "config",
            "icon": "mdi:math-compass",
        }),
    )
    .mock(property);

    number.set_opt("command_topic_prefix", endpoint);
    number.set_opt("unit_of_measurement", calibration.unit.as_deref());
    number.set_opt("min", calibration.value_min.clone());
    number.set_opt("max", calibration.value_max.clone());
    number.set_opt("step", calibration.value_step.clone());
    number
}
