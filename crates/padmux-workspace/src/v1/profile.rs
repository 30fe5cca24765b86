use ahash::AHashMap;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsV1 {
    pub version: u8,
    #[serde(default)]
    pub slots: Vec<SettingsV1Slot>,
    #[serde(default)]
    pub profiles: AHashMap<String, SettingsV1Profile>, // name -> profile
    #[serde(default)]
    pub assignments: Vec<SettingsV1Assignment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsV1Slot {
    pub index: usize,
    #[serde(default)]
    pub created: Option<bool>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub kind: Option<String>, // xbox360 | dualshock4 | generic
    #[serde(default)]
    pub macros: Vec<SettingsV1Macro>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsV1Profile {
    #[serde(default)]
    pub buttons: AHashMap<String, String>, // button -> descriptor
    #[serde(default)]
    pub axes: AHashMap<String, String>, // axis -> descriptor
    #[serde(default)]
    pub dpad_pov: Option<u8>,
    #[serde(default)]
    pub left_stick: Option<SettingsV1Shaping>,
    #[serde(default)]
    pub right_stick: Option<SettingsV1Shaping>,
    #[serde(default)]
    pub left_trigger: Option<SettingsV1Shaping>,
    #[serde(default)]
    pub right_trigger: Option<SettingsV1Shaping>,
    #[serde(default)]
    pub feedback: Option<SettingsV1Feedback>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsV1Shaping {
    #[serde(default)]
    pub dead_zone: Option<f32>,
    #[serde(default)]
    pub anti_dead_zone: Option<f32>,
    #[serde(default)]
    pub linear: Option<f32>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsV1Feedback {
    #[serde(default)]
    pub gain: Option<f32>,
    #[serde(default)]
    pub left_gain: Option<f32>,
    #[serde(default)]
    pub right_gain: Option<f32>,
    #[serde(default)]
    pub swap_motors: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsV1Assignment {
    pub device: String,
    #[serde(default)]
    pub vid: Option<u16>,
    #[serde(default)]
    pub pid: Option<u16>,
    pub slot: usize,
    pub profile: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsV1Macro {
    pub name: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub trigger: Option<String>, // button chord, e.g. "lb+a"
    #[serde(default)]
    pub raw_trigger: Option<SettingsV1RawTrigger>,
    #[serde(default)]
    pub mode: Option<String>, // on_press | on_release | while_held
    #[serde(default)]
    pub repeat: Option<SettingsV1Repeat>,
    #[serde(default)]
    pub repeat_delay_ms: Option<u64>,
    #[serde(default)]
    pub consume_trigger: Option<bool>,
    #[serde(default)]
    pub actions: Vec<SettingsV1Action>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsV1RawTrigger {
    pub device: String,
    pub buttons: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum SettingsV1Repeat {
    Count(u32),
    Mode(String), // until_release
}

/// One step of a macro. Exactly one of the action keys must be set.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsV1Action {
    #[serde(default)]
    pub press: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub key_press: Option<String>,
    #[serde(default)]
    pub key_release: Option<String>,
    #[serde(default)]
    pub delay: Option<u64>,
    #[serde(default)]
    pub axis: Option<String>,
    #[serde(default)]
    pub value: Option<i32>,
    #[serde(default)]
    pub ms: Option<u64>,
}
