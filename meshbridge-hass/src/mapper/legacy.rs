//! Entries announced for models that predate the capability model.

use meshbridge_common::Platform;
use serde_json::json;

use crate::entry::DiscoveryEntry;

/// Models that used to report button presses through `click`.
const CLICK_MODELS: &[&str] = &[
    "WXKG01LM",
    "HS1EB/HS1EB-E",
    "ICZB-KPD14S",
    "TERNCY-SD01",
    "TERNCY-PP01",
    "ICZB-KPD18S",
    "E1766",
    "ZWallRemote0",
    "ptvo.switch",
    "2AJZ4KPKEY",
    "ZGRC-KEY-013",
    "HGZB-02S",
    "HGZB-045",
    "HGZB-1S",
    "AV2010/34",
    "IM6001-BTP01",
    "WXKG11LM",
    "WXKG03LM",
    "WXKG02LM_rev1",
    "WXKG02LM_rev2",
    "QBKG04LM",
    "QBKG03LM",
    "QBKG11LM",
    "QBKG21LM",
    "QBKG22LM",
    "WXKG12LM",
    "QBKG12LM",
    "E1743",
];

pub fn legacy_entry(model: &str) -> Option<DiscoveryEntry> {
    if CLICK_MODELS.contains(&model) {
        return Some(
            DiscoveryEntry::new(
                Platform::Sensor,
                "click",
                json!({
                    "name": "Click",
                    "icon": "mdi:toggle-switch",
                    "value_template": "{{ value_json.click }}",
                }),
            )
            .mock("click"),
        );
    }

    match model {
        "ICTC-G-1" => Some(
            DiscoveryEntry::new(
                Platform::Sensor,
                "brightness",
                json!({
                    "name": "Brightness",
                    "unit_of_measurement": "brightness",
                    "icon": "mdi:brightness-5",
                    "value_template": "{{ value_json.brightness }}",
                }),
            )
            .mock("brightness"),
        ),
        _ => None,
    }
}

pub fn is_legacy_click(entry: &DiscoveryEntry) -> bool {
    entry.platform == Platform::Sensor && entry.object_id == "click"
}
