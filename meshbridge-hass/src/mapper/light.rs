use std::cmp::Ordering;

use meshbridge_common::{Capability, CapabilityKind, Platform, capability::Specific};
use serde_json::{Number, Value, json};

use super::{MapContext, MapError, capitalize, missing, object_id};
use crate::entry::DiscoveryEntry;

pub(super) fn map(
    lights: &[&Specific],
    endpoint: Option<&str>,
    ctx: &MapContext<'_>,
) -> Result<Vec<DiscoveryEntry>, MapError> {
    let first = lights.first().ok_or(MapError::Empty)?;
    let state = first
        .feature("state")
        .ok_or_else(|| missing(CapabilityKind::Light, "state"))?;

    let has = |name: &str| lights.iter().any(|light| light.feature(name).is_some());
    let has_xy = has("color_xy");
    let has_hs = has("color_hs");
    let has_color_temp = has("color_temp");
    let has_brightness = has("brightness");

    // a single member listing hs before xy is enough to prefer hs
    let prefer_hs = lights.iter().any(|light| {
        matches!(
            (light.position("color_xy"), light.position("color_hs")),
            (Some(xy), Some(hs)) if hs < xy
        )
    });

    let mut color_modes = Vec::new();
    if has_xy && !prefer_hs {
        color_modes.push("xy");
    }
    if has_hs && (!has_xy || prefer_hs) {
        color_modes.push("hs");
    }
    if has_color_temp {
        color_modes.push("color_temp");
    }
    if color_modes.is_empty() {
        color_modes.push(if has_brightness { "brightness" } else { "onoff" });
    }

    let mut entry = DiscoveryEntry::new(
        Platform::Light,
        object_id("light", endpoint),
        json!({
            "name": endpoint.map(capitalize),
            "schema": "json",
            "command_topic": true,
            "brightness": has_brightness,
            "brightness_scale": 254,
            "supported_color_modes": color_modes,
        }),
    )
    .mock(state.info().property());

    entry.set_opt("command_topic_prefix", endpoint);
    entry.set_opt("state_topic_postfix", endpoint);

    if has_color_temp {
        let temps = lights
            .iter()
            .filter_map(|light| light.feature("color_temp").and_then(Capability::as_numeric))
            .collect::<Vec<_>>();

        let max = temps
            .iter()
            .filter_map(|t| t.value_max.clone())
            .min_by(compare);
        let min = temps
            .iter()
            .filter_map(|t| t.value_min.clone())
            .max_by(compare);

        entry.set_opt("max_mireds", max);
        entry.set_opt("min_mireds", min);
    }

    let mut effects: Vec<&Value> = Vec::new();
    for effect in ctx
        .all
        .iter()
        .filter_map(|cap| cap.as_enum())
        .filter(|cap| cap.info.name == "effect")
    {
        for value in &effect.values {
            if !effects.contains(&value) {
                effects.push(value);
            }
        }
    }
    if !effects.is_empty() {
        entry.set("effect", true);
        entry.set("effect_list", effects.into_iter().cloned().collect::<Vec<_>>());
    }

    Ok(vec![entry])
}

fn compare(a: &Number, b: &Number) -> Ordering {
    a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
}
