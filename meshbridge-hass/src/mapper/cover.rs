use meshbridge_common::{
    CapabilityKind, Platform,
    capability::{Info, Specific, value_to_string},
};
use serde_json::{Value, json};

use super::{MapContext, MapError, capitalize, missing, object_id};
use crate::entry::{DiscoveryEntry, value_template};

const OPENING: [&str; 5] = ["opening", "open", "forward", "up", "rising"];
const CLOSING: [&str; 7] = ["closing", "close", "backward", "back", "reverse", "down", "declining"];
const STOPPED: [&str; 4] = ["stopped", "stop", "pause", "paused"];

pub(super) fn map(
    covers: &[&Specific],
    endpoint: Option<&str>,
    ctx: &MapContext<'_>,
) -> Result<Vec<DiscoveryEntry>, MapError> {
    let feature = |name: &str| covers.iter().find_map(|cover| cover.feature(name));

    let state = feature("state").ok_or_else(|| missing(CapabilityKind::Cover, "state"))?;
    let position = feature("position");
    let tilt = feature("tilt");

    let running = ctx
        .all
        .iter()
        .filter_map(|cap| cap.as_binary())
        .find(|cap| cap.info.name == "running");
    let motor_state = ctx
        .all
        .iter()
        .filter_map(|cap| cap.as_enum())
        .find(|cap| cap.info.name == "motor_state" || cap.info.name == "moving");

    let mut entry = DiscoveryEntry::new(
        Platform::Cover,
        object_id("cover", endpoint),
        json!({
            "name": endpoint.map(capitalize),
            "command_topic": true,
            "state_topic": true,
        }),
    )
    .mock(state.info().property());
    entry.set_opt("command_topic_prefix", endpoint);
    entry.set_opt("state_topic_postfix", endpoint);

    // direction inferred from the position while running
    if let Some(running) = running {
        let position = position.ok_or(MapError::RunningWithoutPosition)?;
        let running = running.info.property_without_endpoint();
        let position = position.info().property_without_endpoint();

        entry.set(
            "value_template",
            format!(
                "{{% if \"{running}\" in value_json and value_json.{running} %}} \
                 {{% if value_json.{position} > 0 %}} closing {{% else %}} opening {{% endif %}} \
                 {{% else %}} stopped {{% endif %}}"
            ),
        );
    } else if let Some(motor_state) = motor_state {
        let lookup = |vocabulary: &[&str]| {
            motor_state.values.iter().find(|value| {
                vocabulary.contains(&value_lowercase(value).as_str())
            })
        };

        if let (Some(opening), Some(closing), Some(stopped)) =
            (lookup(&OPENING), lookup(&CLOSING), lookup(&STOPPED))
        {
            let property = motor_state.info.property_without_endpoint();
            let stopped_text = value_to_string(stopped);

            entry.set("state_opening", opening.clone());
            entry.set("state_closing", closing.clone());
            entry.set("state_stopped", stopped.clone());
            entry.set(
                "value_template",
                format!(
                    "{{% if \"{property}\" in value_json and value_json.{property} %}} \
                     {{{{ value_json.{property} }}}} {{% else %}} {stopped_text} {{% endif %}}"
                ),
            );
        }
    }

    if entry.get("value_template").is_none() {
        entry.set("value_template", value_template(state.info().property_without_endpoint()));
        entry.set("state_open", "OPEN");
        entry.set("state_closed", "CLOSE");
        entry.set("state_stopped", "STOP");
    }

    if position.is_none() && tilt.is_none() {
        entry.set("optimistic", true);
    }

    if let Some(position) = position {
        let info = position.info();
        entry.set("position_topic", true);
        entry.set("position_template", value_template(info.property_without_endpoint()));
        entry.set("set_position_topic", true);
        entry.set("set_position_template", set_position_template(info));
    }

    if let Some(tilt) = tilt {
        if endpoint.is_some() {
            return Err(MapError::Endpoint(CapabilityKind::Cover));
        }

        entry.set("tilt_command_topic", "tilt");
        entry.set("tilt_status_topic", true);
        entry.set("tilt_status_template", value_template(tilt.info().property_without_endpoint()));
    }

    Ok(vec![entry])
}

fn set_position_template(position: &Info) -> String {
    format!("{{ \"{}\": {{{{ position }}}} }}", position.property())
}

fn value_lowercase(value: &Value) -> String {
    value_to_string(value).to_lowercase()
}
