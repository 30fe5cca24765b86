use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use padmux_control::KeyChord;
use padmux_gamepad::{Button, GamepadAxis, ProductKey};

use crate::descriptor::DescriptorSet;
use crate::settings::{
    ButtonChord, ControllerKind, FeedbackTuning, MacroAction, MacroDefinition,
    MacroTrigger, MappingProfile, RepeatPolicy, Settings, Shaping, SlotAssignment,
    SlotSettings, TriggerMode, MAX_SLOTS,
};

use super::combo::parse_terms_with_delim;
use super::profile::{
    SettingsV1, SettingsV1Action, SettingsV1Assignment, SettingsV1Feedback,
    SettingsV1Macro, SettingsV1Profile, SettingsV1Repeat, SettingsV1Shaping,
    SettingsV1Slot,
};
use super::Error;

impl SettingsV1 {
    pub fn to_settings(&self) -> Result<Settings, Error> {
        let mut profiles = AHashMap::new();
        for (name, raw) in &self.profiles {
            let profile = parse_profile(name, raw)?;
            profiles.insert(Box::<str>::from(name.as_str()), Arc::new(profile));
        }

        let mut slots: Vec<SlotSettings> = Vec::with_capacity(self.slots.len());
        for raw in &self.slots {
            if slots.iter().any(|s| s.index == raw.index) {
                return Err(Error::DuplicateSlot(raw.index));
            }
            slots.push(parse_slot(raw)?);
        }
        slots.sort_by_key(|s| s.index);

        let assignments = self
            .assignments
            .iter()
            .map(|a| parse_assignment(a, &profiles))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Settings {
            slots,
            profiles,
            assignments,
        })
    }
}

fn parse_slot(raw: &SettingsV1Slot) -> Result<SlotSettings, Error> {
    if raw.index >= MAX_SLOTS {
        return Err(Error::InvalidSlot(raw.index));
    }
    let kind = raw
        .kind
        .as_deref()
        .map(parse_kind)
        .transpose()?
        .unwrap_or_default();
    let macros = raw
        .macros
        .iter()
        .map(parse_macro)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SlotSettings {
        index: raw.index,
        created: raw.created.unwrap_or(true),
        enabled: raw.enabled.unwrap_or(true),
        kind,
        macros: Arc::from(macros),
    })
}

fn parse_kind(name: &str) -> Result<ControllerKind, Error> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "xbox360" | "xbox" | "x360" => ControllerKind::Xbox360,
        "dualshock4" | "ds4" => ControllerKind::DualShock4,
        "generic" | "joystick" => ControllerKind::Generic,
        _ => return Err(Error::InvalidKind(name.to_string())),
    })
}

fn parse_assignment(
    raw: &SettingsV1Assignment,
    profiles: &AHashMap<Box<str>, Arc<MappingProfile>>,
) -> Result<SlotAssignment, Error> {
    if raw.slot >= MAX_SLOTS {
        return Err(Error::InvalidSlot(raw.slot));
    }
    let profile = profiles
        .get(raw.profile.as_str())
        .cloned()
        .ok_or_else(|| Error::UnknownProfile(raw.profile.clone()))?;
    let product = match (raw.vid, raw.pid) {
        (Some(vid), Some(pid)) => Some(ProductKey::new(vid, pid)),
        _ => None,
    };
    Ok(SlotAssignment {
        device: raw.device.as_str().into(),
        product,
        slot: raw.slot,
        profile,
    })
}

fn parse_profile(name: &str, raw: &SettingsV1Profile) -> Result<MappingProfile, Error> {
    let mut buttons = Vec::with_capacity(raw.buttons.len());
    for (button, descriptor) in &raw.buttons {
        let button = parse_button_name(button)?;
        buttons.push((button, parse_descriptors(button_label(button), descriptor)?));
    }
    // Map iteration order is random; keep profiles comparable.
    buttons.sort_by_key(|(b, _)| padmux_bit_mask::Bitable::index(b));

    let mut axes = Vec::with_capacity(raw.axes.len());
    for (axis, descriptor) in &raw.axes {
        let axis = parse_axis_name(axis)?;
        axes.push((axis, parse_descriptors(axis_label(axis), descriptor)?));
    }
    axes.sort_by_key(|(a, _)| GamepadAxis::ALL.iter().position(|x| x == a));

    Ok(MappingProfile {
        name: name.into(),
        buttons,
        axes,
        dpad_pov: raw.dpad_pov,
        left_stick: parse_shaping(raw.left_stick),
        right_stick: parse_shaping(raw.right_stick),
        left_trigger: parse_shaping(raw.left_trigger),
        right_trigger: parse_shaping(raw.right_trigger),
        feedback: parse_feedback(raw.feedback),
    })
}

fn parse_descriptors(control: &str, input: &str) -> Result<DescriptorSet, Error> {
    input.parse().map_err(|source| Error::Descriptor {
        control: control.to_string(),
        source,
    })
}

fn percent(value: Option<f32>, default: f32) -> u8 {
    value.unwrap_or(default).clamp(0.0, 100.0).round() as u8
}

fn parse_shaping(raw: Option<SettingsV1Shaping>) -> Shaping {
    let raw = raw.unwrap_or_default();
    Shaping {
        dead_zone: percent(raw.dead_zone, 0.0),
        anti_dead_zone: percent(raw.anti_dead_zone, 0.0),
        linear: raw.linear.unwrap_or(0.0).clamp(-100.0, 100.0).round() as i8,
    }
}

fn parse_feedback(raw: Option<SettingsV1Feedback>) -> FeedbackTuning {
    let raw = raw.unwrap_or_default();
    FeedbackTuning {
        gain: percent(raw.gain, 100.0),
        left_gain: percent(raw.left_gain, 100.0),
        right_gain: percent(raw.right_gain, 100.0),
        swap_motors: raw.swap_motors.unwrap_or(false),
    }
}

/// Parse a button name into a `Button` enum.
fn parse_button_name(name: &str) -> Result<Button, Error> {
    Ok(match name.trim().to_ascii_lowercase().as_str() {
        "a" | "cross" => Button::A,
        "b" | "circle" => Button::B,
        "x" | "square" => Button::X,
        "y" | "triangle" => Button::Y,

        "back" | "select" | "share" => Button::Back,
        "guide" | "home" | "ps" => Button::Guide,
        "start" | "options" => Button::Start,

        "ls" | "left_stick" | "l3" => Button::LeftThumb,
        "rs" | "right_stick" | "r3" => Button::RightThumb,

        "lb" | "left_bumper" | "left_shoulder" | "l1" => Button::LeftShoulder,
        "rb" | "right_bumper" | "right_shoulder" | "r1" => Button::RightShoulder,

        "dpad_up" => Button::DPadUp,
        "dpad_down" => Button::DPadDown,
        "dpad_left" => Button::DPadLeft,
        "dpad_right" => Button::DPadRight,

        _ => return Err(Error::InvalidButton(name.to_string())),
    })
}

fn button_label(button: Button) -> &'static str {
    match button {
        Button::A => "a",
        Button::B => "b",
        Button::X => "x",
        Button::Y => "y",
        Button::Back => "back",
        Button::Guide => "guide",
        Button::Start => "start",
        Button::LeftThumb => "left_stick",
        Button::RightThumb => "right_stick",
        Button::LeftShoulder => "left_shoulder",
        Button::RightShoulder => "right_shoulder",
        Button::DPadUp => "dpad_up",
        Button::DPadDown => "dpad_down",
        Button::DPadLeft => "dpad_left",
        Button::DPadRight => "dpad_right",
    }
}

fn parse_axis_name(name: &str) -> Result<GamepadAxis, Error> {
    Ok(match name.trim().to_ascii_lowercase().as_str() {
        "lt" | "left_trigger" | "l2" => GamepadAxis::LeftTrigger,
        "rt" | "right_trigger" | "r2" => GamepadAxis::RightTrigger,
        "lx" | "left_x" => GamepadAxis::LeftX,
        "ly" | "left_y" => GamepadAxis::LeftY,
        "rx" | "right_x" => GamepadAxis::RightX,
        "ry" | "right_y" => GamepadAxis::RightY,
        _ => return Err(Error::InvalidAxis(name.to_string())),
    })
}

fn axis_label(axis: GamepadAxis) -> &'static str {
    match axis {
        GamepadAxis::LeftTrigger => "left_trigger",
        GamepadAxis::RightTrigger => "right_trigger",
        GamepadAxis::LeftX => "left_x",
        GamepadAxis::LeftY => "left_y",
        GamepadAxis::RightX => "right_x",
        GamepadAxis::RightY => "right_y",
    }
}

fn parse_chord(input: &str) -> Result<ButtonChord, Error> {
    let mut set = ButtonChord::empty();
    for term in parse_terms_with_delim(input, '+')
        .map_err(|e| Error::InvalidTrigger(format!("{input}: {e:?}")))?
    {
        set.insert(parse_button_name(term)?);
    }
    if set.is_empty() {
        Err(Error::InvalidTrigger(input.to_string()))
    } else {
        Ok(set)
    }
}

fn parse_keys(input: &str) -> Result<KeyChord, Error> {
    input
        .parse::<KeyChord>()
        .map_err(|e| Error::KeyParse(e.to_string()))
}

fn parse_macro(raw: &SettingsV1Macro) -> Result<MacroDefinition, Error> {
    let trigger = match (&raw.trigger, &raw.raw_trigger) {
        (Some(chord), None) => MacroTrigger::Buttons(parse_chord(chord)?),
        (None, Some(raw_trigger)) => MacroTrigger::Raw {
            device: raw_trigger.device.as_str().into(),
            buttons: raw_trigger.buttons.iter().copied().collect(),
        },
        (None, None) => MacroTrigger::Buttons(ButtonChord::empty()),
        (Some(_), Some(_)) => {
            return Err(Error::InvalidTrigger(format!(
                "{}: both trigger and raw_trigger set",
                raw.name
            )))
        }
    };

    let mode = match raw.mode.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("on_press" | "press") => TriggerMode::OnPress,
        Some("on_release" | "release") => TriggerMode::OnRelease,
        Some("while_held" | "hold") => TriggerMode::WhileHeld,
        Some(other) => return Err(Error::InvalidMode(other.to_string())),
    };

    let repeat = match &raw.repeat {
        None => RepeatPolicy::Count(1),
        Some(SettingsV1Repeat::Count(0)) => {
            return Err(Error::InvalidRepeat(format!("{}: count must be > 0", raw.name)))
        }
        Some(SettingsV1Repeat::Count(n)) => RepeatPolicy::Count(*n),
        Some(SettingsV1Repeat::Mode(mode)) if mode == "until_release" => {
            RepeatPolicy::UntilRelease
        }
        Some(SettingsV1Repeat::Mode(other)) => {
            return Err(Error::InvalidRepeat(other.clone()))
        }
    };

    let actions = raw
        .actions
        .iter()
        .map(|a| parse_action(a, &raw.name))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MacroDefinition {
        name: raw.name.as_str().into(),
        enabled: raw.enabled.unwrap_or(true),
        trigger,
        mode,
        actions,
        repeat,
        repeat_delay: Duration::from_millis(raw.repeat_delay_ms.unwrap_or(0)),
        consume_trigger: raw.consume_trigger.unwrap_or(false),
    })
}

fn parse_action(raw: &SettingsV1Action, macro_name: &str) -> Result<MacroAction, Error> {
    let invalid = |reason: &str| Error::InvalidAction(macro_name.to_string(), reason.to_string());
    let duration = Duration::from_millis(raw.ms.unwrap_or(0));

    let action = match (
        &raw.press,
        &raw.release,
        &raw.key_press,
        &raw.key_release,
        raw.delay,
        &raw.axis,
    ) {
        (Some(chord), None, None, None, None, None) => MacroAction::ButtonPress {
            buttons: parse_chord(chord)?,
            duration,
        },
        (None, Some(chord), None, None, None, None) => MacroAction::ButtonRelease {
            buttons: parse_chord(chord)?,
        },
        (None, None, Some(keys), None, None, None) => MacroAction::KeyPress {
            keys: parse_keys(keys)?,
            duration,
        },
        (None, None, None, Some(keys), None, None) => MacroAction::KeyRelease {
            keys: parse_keys(keys)?,
        },
        (None, None, None, None, Some(ms), None) => {
            MacroAction::Delay(Duration::from_millis(ms))
        }
        (None, None, None, None, None, Some(axis)) => MacroAction::AxisSet {
            axis: parse_axis_name(axis)?,
            value: raw.value.ok_or_else(|| invalid("axis without value"))?,
        },
        (None, None, None, None, None, None) => return Err(invalid("empty action")),
        _ => return Err(invalid("more than one action in a step")),
    };
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;

    fn parse(yaml: &str) -> Result<Settings, Error> {
        let raw: SettingsV1 = serde_yaml::from_str(yaml)?;
        raw.to_settings()
    }

    const SAMPLE: &str = r#"
version: 1
slots:
  - index: 1
    kind: ds4
  - index: 0
    macros:
      - name: turbo
        trigger: lb+a
        mode: while_held
        repeat: until_release
        repeat_delay_ms: 20
        consume_trigger: true
        actions:
          - press: a
            ms: 30
          - release: a
          - delay: 30
      - name: copy
        raw_trigger: { device: "pad#0", buttons: [8, 9] }
        actions:
          - key_press: ctrl+c
            ms: 10
          - axis: lt
            value: 255
profiles:
  pad:
    buttons:
      a: "Button 0"
      dpad_up: "pov 0 up | button 11"
    axes:
      left_x: "Axis 0"
      lt: "HAxis 2"
    left_stick: { dead_zone: 10, anti_dead_zone: 5.4, linear: -250 }
    feedback: { gain: 150, swap_motors: true }
assignments:
  - device: "pad#0"
    vid: 1118
    pid: 654
    slot: 0
    profile: pad
"#;

    #[test]
    fn sample_settings_parse() {
        let settings = parse(SAMPLE).unwrap();
        assert_eq!(settings.slots.len(), 2);
        assert_eq!(settings.slots[0].index, 0, "slots are sorted by index");
        assert_eq!(settings.slot(1).unwrap().kind, ControllerKind::DualShock4);

        let profile = &settings.profiles["pad"];
        assert_eq!(profile.buttons[0].0, Button::DPadUp);
        assert_eq!(
            profile.axes[0],
            (
                GamepadAxis::LeftTrigger,
                DescriptorSet::single(Descriptor::Axis {
                    index: 2,
                    inverted: false,
                    half: true
                })
            )
        );
        assert_eq!(
            profile.left_stick,
            Shaping {
                dead_zone: 10,
                anti_dead_zone: 5,
                linear: -100
            }
        );
        assert_eq!(profile.feedback.gain, 100);
        assert!(profile.feedback.swap_motors);

        let assignment = &settings.assignments[0];
        assert_eq!(assignment.product, Some(ProductKey::new(0x045e, 0x028e)));
        assert!(Arc::ptr_eq(&assignment.profile, profile));
    }

    #[test]
    fn macros_parse() {
        let settings = parse(SAMPLE).unwrap();
        let macros = &settings.slot(0).unwrap().macros;
        let turbo = &macros[0];
        assert_eq!(turbo.mode, TriggerMode::WhileHeld);
        assert_eq!(turbo.repeat, RepeatPolicy::UntilRelease);
        assert!(turbo.consume_trigger);
        assert_eq!(
            turbo.trigger,
            MacroTrigger::Buttons(ButtonChord::from_iter([Button::LeftShoulder, Button::A]))
        );
        assert_eq!(turbo.actions.len(), 3);
        assert_eq!(turbo.actions[2], MacroAction::Delay(Duration::from_millis(30)));

        let copy = &macros[1];
        assert_eq!(copy.repeat, RepeatPolicy::Count(1));
        assert!(matches!(
            &copy.trigger,
            MacroTrigger::Raw { device, buttons } if &**device == "pad#0" && buttons.as_slice() == [8, 9]
        ));
        assert!(matches!(
            copy.actions[1],
            MacroAction::AxisSet {
                axis: GamepadAxis::LeftTrigger,
                value: 255
            }
        ));
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let yaml = "version: 1\nassignments:\n  - { device: x, slot: 0, profile: nope }\n";
        assert!(matches!(parse(yaml), Err(Error::UnknownProfile(_))));
    }

    #[test]
    fn slot_out_of_range_is_rejected() {
        let yaml = "version: 1\nslots:\n  - index: 7\n";
        assert!(matches!(parse(yaml), Err(Error::InvalidSlot(7))));
    }

    #[test]
    fn duplicate_slot_is_rejected() {
        let yaml = "version: 1\nslots:\n  - index: 0\n  - index: 0\n";
        assert!(matches!(parse(yaml), Err(Error::DuplicateSlot(0))));
    }

    #[test]
    fn bad_descriptor_names_the_control() {
        let yaml = "version: 1\nprofiles:\n  p:\n    buttons:\n      a: \"knob 1\"\n";
        let err = parse(yaml).unwrap_err();
        assert!(err.to_string().starts_with("a: "), "{err}");
    }

    #[test]
    fn ambiguous_action_is_rejected() {
        let yaml = r#"
version: 1
slots:
  - index: 0
    macros:
      - name: m
        trigger: a
        actions:
          - { press: a, delay: 10 }
"#;
        assert!(matches!(parse(yaml), Err(Error::InvalidAction(_, _))));
    }

    #[test]
    fn zero_repeat_count_is_rejected() {
        let yaml = r#"
version: 1
slots:
  - index: 0
    macros:
      - { name: m, trigger: a, repeat: 0 }
"#;
        assert!(matches!(parse(yaml), Err(Error::InvalidRepeat(_))));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = "version: 1\nslots:\n  - index: 0\n    colour: red\n";
        assert!(matches!(parse(yaml), Err(Error::Yaml(_))));
    }
}
