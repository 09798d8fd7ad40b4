//! Hub metadata for well-known capability names.
//!
//! Each table returns the payload keys (device class, state class, entity
//! category, icon, enabled default) to merge into the entry of a capability
//! with that name. Unknown names yield an empty map.

use serde_json::{Map, Value, json};

use crate::entry::into_map;

pub(crate) fn numeric(name: &str) -> Map<String, Value> {
    into_map(match name {
        "ac_frequency" => json!({ "device_class": "frequency", "state_class": "measurement", "enabled_by_default": false, "entity_category": "diagnostic" }),
        "angle" => json!({ "icon": "mdi:angle-acute" }),
        "angle_axis" => json!({ "icon": "mdi:angle-acute" }),
        "aqi" => json!({ "device_class": "aqi", "state_class": "measurement" }),
        "battery" => json!({ "device_class": "battery", "entity_category": "diagnostic", "state_class": "measurement" }),
        "battery_voltage" => json!({ "device_class": "voltage", "entity_category": "diagnostic", "state_class": "measurement", "enabled_by_default": true }),
        "boost_heating_countdown" => json!({ "device_class": "duration" }),
        "brightness" => json!({ "icon": "mdi:brightness-5" }),
        "calibration" => json!({ "icon": "mdi:wrench-clock", "entity_category": "config" }),
        "co" => json!({ "device_class": "carbon_monoxide", "state_class": "measurement" }),
        "co2" => json!({ "device_class": "carbon_dioxide", "state_class": "measurement" }),
        "color_temp" => json!({ "entity_category": "config", "icon": "mdi:thermometer" }),
        "current" => json!({ "device_class": "current", "enabled_by_default": false, "entity_category": "diagnostic", "state_class": "measurement" }),
        "deadzone_temperature" => json!({ "entity_category": "config", "icon": "mdi:thermometer" }),
        "device_temperature" => json!({ "device_class": "temperature", "entity_category": "diagnostic", "state_class": "measurement" }),
        "distance" => json!({ "device_class": "distance", "state_class": "measurement" }),
        "duration" => json!({ "entity_category": "config", "icon": "mdi:timer" }),
        "eco2" => json!({ "device_class": "carbon_dioxide", "state_class": "measurement" }),
        "energy" => json!({ "device_class": "energy", "state_class": "total_increasing" }),
        "formaldehyd" => json!({ "state_class": "measurement" }),
        "gas_density" => json!({ "icon": "mdi:google-circles-communities", "state_class": "measurement" }),
        "humidity" => json!({ "device_class": "humidity", "state_class": "measurement" }),
        "illuminance" => json!({ "device_class": "illuminance", "state_class": "measurement" }),
        "illuminance_lux" => json!({ "device_class": "illuminance", "state_class": "measurement" }),
        "linkquality" => json!({ "enabled_by_default": false, "entity_category": "diagnostic", "icon": "mdi:signal", "state_class": "measurement" }),
        "local_temperature" => json!({ "device_class": "temperature", "state_class": "measurement" }),
        "max_temperature" => json!({ "entity_category": "config", "icon": "mdi:thermometer-high" }),
        "min_temperature" => json!({ "entity_category": "config", "icon": "mdi:thermometer-low" }),
        "moisture" => json!({ "device_class": "moisture", "state_class": "measurement" }),
        "occupancy_timeout" => json!({ "entity_category": "config", "icon": "mdi:timer" }),
        "pm10" => json!({ "device_class": "pm10", "state_class": "measurement" }),
        "pm25" => json!({ "device_class": "pm25", "state_class": "measurement" }),
        "position" => json!({ "icon": "mdi:valve", "state_class": "measurement" }),
        "power" => json!({ "device_class": "power", "entity_category": "diagnostic", "state_class": "measurement" }),
        "power_factor" => json!({ "device_class": "power_factor", "enabled_by_default": false, "entity_category": "diagnostic", "state_class": "measurement" }),
        "pressure" => json!({ "device_class": "atmospheric_pressure", "state_class": "measurement" }),
        "soil_moisture" => json!({ "device_class": "moisture", "state_class": "measurement" }),
        "temperature" => json!({ "device_class": "temperature", "state_class": "measurement" }),
        "transition" => json!({ "entity_category": "config", "icon": "mdi:transition" }),
        "voc" => json!({ "device_class": "volatile_organic_compounds", "state_class": "measurement" }),
        "voltage" => json!({ "device_class": "voltage", "enabled_by_default": false, "entity_category": "diagnostic", "state_class": "measurement" }),
        "x_axis" => json!({ "icon": "mdi:axis-x-arrow" }),
        "y_axis" => json!({ "icon": "mdi:axis-y-arrow" }),
        "z_axis" => json!({ "icon": "mdi:axis-z-arrow" }),
        _ => Value::Null,
    })
}

pub(crate) fn numeric_unit(unit: &str) -> Map<String, Value> {
    into_map(match unit {
        "°C" | "°F" => json!({ "device_class": "temperature", "state_class": "measurement" }),
        "W" | "kW" => json!({ "device_class": "power", "state_class": "measurement" }),
        "V" | "mV" => json!({ "device_class": "voltage", "state_class": "measurement" }),
        "A" | "mA" => json!({ "device_class": "current", "state_class": "measurement" }),
        "lx" => json!({ "device_class": "illuminance", "state_class": "measurement" }),
        "hPa" | "kPa" => json!({ "device_class": "pressure", "state_class": "measurement" }),
        _ => Value::Null,
    })
}

pub(crate) fn binary(name: &str) -> Map<String, Value> {
    into_map(match name {
        "alarm" => json!({ "device_class": "safety" }),
        "auto_lock" => json!({ "entity_category": "config", "icon": "mdi:key-chain" }),
        "away_mode" => json!({ "entity_category": "config", "icon": "mdi:airplane-takeoff" }),
        "battery_low" => json!({ "device_class": "battery", "entity_category": "diagnostic" }),
        "carbon_monoxide" => json!({ "device_class": "carbon_monoxide" }),
        "child_lock" => json!({ "entity_category": "config", "icon": "mdi:account-lock" }),
        "color_power_on_behavior" => json!({ "entity_category": "config", "icon": "mdi:palette" }),
        "consumer_connected" => json!({ "device_class": "plug" }),
        "contact" => json!({ "device_class": "door" }),
        "eco_mode" => json!({ "entity_category": "config", "icon": "mdi:leaf" }),
        "gas" => json!({ "device_class": "gas" }),
        "led_disabled_night" => json!({ "entity_category": "config", "icon": "mdi:led-off" }),
        "moving" => json!({ "device_class": "moving" }),
        "no_position_support" => json!({ "entity_category": "config", "icon": "mdi:minus-circle-outline" }),
        "occupancy" => json!({ "device_class": "occupancy" }),
        "power_outage_memory" => json!({ "entity_category": "config", "icon": "mdi:memory" }),
        "presence" => json!({ "device_class": "presence" }),
        "running" => json!({ "device_class": "running" }),
        "smoke" => json!({ "device_class": "smoke" }),
        "sos" => json!({ "device_class": "safety" }),
        "tamper" => json!({ "device_class": "tamper" }),
        "vibration" => json!({ "device_class": "vibration" }),
        "water_leak" => json!({ "device_class": "moisture" }),
        _ => Value::Null,
    })
}

pub(crate) fn enumerated(name: &str) -> Map<String, Value> {
    into_map(match name {
        "action" => json!({ "icon": "mdi:gesture-double-tap" }),
        "alarm_humidity" => json!({ "entity_category": "config", "icon": "mdi:water-percent-alert" }),
        "alarm_temperature" => json!({ "entity_category": "config", "icon": "mdi:thermometer-alert" }),
        "backlight_auto_dim" => json!({ "entity_category": "config", "icon": "mdi:brightness-auto" }),
        "backlight_mode" => json!({ "entity_category": "config", "icon": "mdi:lightbulb" }),
        "color_power_on_behavior" => json!({ "entity_category": "config", "icon": "mdi:palette" }),
        "device_mode" => json!({ "entity_category": "config", "icon": "mdi:tag" }),
        "effect" => json!({ "enabled_by_default": false, "icon": "mdi:palette" }),
        "force" => json!({ "entity_category": "config", "icon": "mdi:valve" }),
        "identify" => json!({ "device_class": "identify" }),
        "keep_time" => json!({ "entity_category": "config", "icon": "mdi:av-timer" }),
        "keypad_lockout" => json!({ "entity_category": "config", "icon": "mdi:lock" }),
        "melody" => json!({ "entity_category": "config", "icon": "mdi:music-note" }),
        "operation_mode" => json!({ "entity_category": "config", "icon": "mdi:tag" }),
        "power_on_behavior" => json!({ "entity_category": "config", "icon": "mdi:power-settings" }),
        "power_outage_memory" => json!({ "entity_category": "config", "icon": "mdi:power-settings" }),
        "sensitivity" => json!({ "entity_category": "config", "icon": "mdi:tune" }),
        "switch_type" => json!({ "entity_category": "config", "icon": "mdi:tune" }),
        "thermostat_unit" => json!({ "entity_category": "config", "icon": "mdi:thermometer" }),
        "volume" => json!({ "entity_category": "config", "icon": "mdi:volume-high" }),
        "week" => json!({ "entity_category": "config", "icon": "mdi:calendar-clock" }),
        _ => Value::Null,
    })
}
