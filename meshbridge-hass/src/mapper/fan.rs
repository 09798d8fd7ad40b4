use meshbridge_common::{Capability, CapabilityKind, Platform, capability::Specific};
use serde_json::json;

use super::{MapContext, MapError, missing};
use crate::entry::DiscoveryEntry;

const SPEEDS: [&str; 12] = ["low", "medium", "high", "1", "2", "3", "4", "5", "6", "7", "8", "9"];
const PRESETS: [&str; 3] = ["on", "auto", "smart"];

/// Model whose `on` mode is the top speed, not a preset. It always uses
/// this fixed scheme, whatever modes it reports.
const SPEED_ON_MODEL: &str = "99432";
const SPEED_ON_SPEEDS: [&str; 5] = ["off", "low", "medium", "high", "on"];

pub(super) fn map(fan: &Specific, ctx: &MapContext<'_>) -> Result<Vec<DiscoveryEntry>, MapError> {
    fan.feature("state").ok_or_else(|| missing(CapabilityKind::Fan, "state"))?;

    let mut entry = DiscoveryEntry::new(
        Platform::Fan,
        "fan",
        json!({
            "name": null,
            "state_topic": true,
            "state_value_template": "{{ value_json.fan_state }}",
            "command_topic": true,
            "command_topic_postfix": "fan_state",
        }),
    )
    .mock("fan_state");

    let Some(mode) = fan.feature("mode").and_then(Capability::as_enum) else {
        return Ok(vec![entry]);
    };
    let values = mode.value_strings();

    let (speeds, presets) = match ctx.definition.map(|definition| definition.model.as_str()) {
        Some(SPEED_ON_MODEL) => (SPEED_ON_SPEEDS.to_vec(), vec!["smart"]),
        _ => {
            if let Some(unknown) = values.iter().find(|value| {
                value.as_str() != "off"
                    && !SPEEDS.contains(&value.as_str())
                    && !PRESETS.contains(&value.as_str())
            }) {
                return Err(MapError::UnknownFanMode(unknown.clone()));
            }

            let listed = |mode: &&str| values.iter().any(|v| v == mode);
            let speeds = core::iter::once("off")
                .chain(SPEEDS.iter().copied().filter(listed))
                .collect::<Vec<_>>();
            (speeds, PRESETS.iter().copied().filter(listed).collect())
        }
    };

    let property = mode.info.property();

    let to_percentage = speeds
        .iter()
        .enumerate()
        .map(|(i, speed)| format!("'{speed}':{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let from_percentage = speeds
        .iter()
        .enumerate()
        .map(|(i, speed)| format!("{i}:'{speed}'"))
        .collect::<Vec<_>>()
        .join(", ");

    entry.set("percentage_state_topic", true);
    entry.set("percentage_command_topic", "fan_mode");
    entry.set(
        "percentage_value_template",
        format!("{{{{ {{{to_percentage}}}[value_json.{property}] | default('None') }}}}"),
    );
    entry.set(
        "percentage_command_template",
        format!("{{{{ {{{from_percentage}}}[value] | default('') }}}}"),
    );
    entry.set("speed_range_min", 1);
    entry.set("speed_range_max", speeds.len() - 1);

    if !presets.is_empty() {
        let list = presets.iter().map(|p| format!("'{p}'")).collect::<Vec<_>>().join(", ");

        entry.set("preset_mode_state_topic", true);
        entry.set("preset_mode_command_topic", "fan_mode");
        entry.set(
            "preset_mode_value_template",
            format!(
                "{{{{ value_json.{property} if value_json.{property} in [{list}] \
                 else 'None' | default('None') }}}}"
            ),
        );
        entry.set("preset_modes", presets);
    }

    Ok(vec![entry])
}
