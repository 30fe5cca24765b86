//! Raw device state to logical gamepad.
//!
//! Descriptors are parsed once when settings load. Mapping is a pure
//! function of the raw snapshot and the profile.

mod shaping;

use padmux_gamepad::{Button, GamepadAxis, LogicalGamepad, RawState, AXIS_CENTER};
use padmux_workspace::{Descriptor, DescriptorSet, MappingProfile, PovDirection, Shaping};
use thiserror::Error;

pub use shaping::{shape_thumb, shape_trigger};

/// Axis or slider reads as pressed above this value.
const PRESS_HIGH: u16 = 49151;
/// Inverted axis or slider reads as pressed below this value.
const PRESS_LOW: u16 = 16384;
/// Half of the 90° gap between hat directions, plus a diagonal.
const POV_TOLERANCE: i32 = 6750;
const FULL_CIRCLE: i32 = 36000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("{kind} {index} is not reported by the device")]
    MissingControl { kind: &'static str, index: u8 },
}

/// Map one device's raw snapshot through `profile`.
pub fn map_device(raw: &RawState, profile: &MappingProfile) -> Result<LogicalGamepad, MappingError> {
    let mut pad = LogicalGamepad::NEUTRAL;

    for (button, descriptors) in &profile.buttons {
        if any_pressed(raw, descriptors)? {
            pad.buttons.insert(*button);
        }
    }

    if let Some(index) = profile.dpad_pov {
        let hat = pov(raw, index)?;
        for direction in PovDirection::ALL {
            if pov_matches(hat, direction) {
                pad.buttons.insert(dpad_button(direction));
            }
        }
    }

    for (axis, descriptors) in &profile.axes {
        let value = if axis.is_trigger() {
            let value = trigger_value(raw, descriptors)?;
            shape_trigger(value, shaping_for(profile, *axis))
        } else {
            let value = thumb_value(raw, descriptors, axis.is_vertical())?;
            shape_thumb(value, shaping_for(profile, *axis))
        };
        pad.set_axis(*axis, value);
    }

    Ok(pad)
}

fn shaping_for(profile: &MappingProfile, axis: GamepadAxis) -> &Shaping {
    match axis {
        GamepadAxis::LeftTrigger => &profile.left_trigger,
        GamepadAxis::RightTrigger => &profile.right_trigger,
        GamepadAxis::LeftX | GamepadAxis::LeftY => &profile.left_stick,
        GamepadAxis::RightX | GamepadAxis::RightY => &profile.right_stick,
    }
}

fn dpad_button(direction: PovDirection) -> Button {
    match direction {
        PovDirection::Up => Button::DPadUp,
        PovDirection::Right => Button::DPadRight,
        PovDirection::Down => Button::DPadDown,
        PovDirection::Left => Button::DPadLeft,
    }
}

/// Whether a hat value lies within ±67.5° of `direction`.
pub fn pov_matches(hat: i32, direction: PovDirection) -> bool {
    if hat < 0 {
        return false;
    }
    let diff = (hat - direction.centidegrees()).rem_euclid(FULL_CIRCLE);
    diff.min(FULL_CIRCLE - diff) <= POV_TOLERANCE
}

/// Negate, mapping `i16::MIN` to `i16::MAX` instead of overflowing.
#[inline]
pub fn negate_thumb(value: i32) -> i32 {
    (-value).clamp(i32::from(i16::MIN), i32::from(i16::MAX))
}

fn any_pressed(raw: &RawState, descriptors: &DescriptorSet) -> Result<bool, MappingError> {
    for descriptor in descriptors {
        if pressed(raw, descriptor)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn pressed(raw: &RawState, descriptor: &Descriptor) -> Result<bool, MappingError> {
    Ok(match *descriptor {
        Descriptor::Button { index, inverted } => raw.button(usize::from(index)) != inverted,
        Descriptor::Axis { index, inverted, half } => {
            analog_pressed(unit(axis(raw, index)?, half), inverted)
        }
        Descriptor::Slider { index, inverted, half } => {
            analog_pressed(unit(slider(raw, index)?, half), inverted)
        }
        Descriptor::Pov { index, direction } => pov_matches(pov(raw, index)?, direction),
    })
}

#[inline]
fn analog_pressed(value: u16, inverted: bool) -> bool {
    if inverted {
        value < PRESS_LOW
    } else {
        value > PRESS_HIGH
    }
}

/// Unsigned control value, the upper half stretched to full range in half mode.
#[inline]
fn unit(value: u16, half: bool) -> u16 {
    if half {
        let upper = u32::from(value.saturating_sub(AXIS_CENTER));
        (upper * u32::from(u16::MAX) / u32::from(AXIS_CENTER - 1)).min(u32::from(u16::MAX)) as u16
    } else {
        value
    }
}

/// Trigger output in `0..=255`. Alternatives combine by maximum.
fn trigger_value(raw: &RawState, descriptors: &DescriptorSet) -> Result<i32, MappingError> {
    let mut best = 0;
    for descriptor in descriptors {
        let value = match *descriptor {
            Descriptor::Axis { index, inverted, half } => {
                scale_trigger(unit(axis(raw, index)?, half), inverted)
            }
            Descriptor::Slider { index, inverted, half } => {
                scale_trigger(unit(slider(raw, index)?, half), inverted)
            }
            Descriptor::Button { .. } | Descriptor::Pov { .. } => {
                if pressed(raw, descriptor)? {
                    i32::from(u8::MAX)
                } else {
                    0
                }
            }
        };
        best = best.max(value);
    }
    Ok(best)
}

#[inline]
fn scale_trigger(value: u16, inverted: bool) -> i32 {
    let value = if inverted { u16::MAX - value } else { value };
    (u32::from(value) * 255 / u32::from(u16::MAX)) as i32
}

/// Stick output in the `i16` range. Alternatives combine by magnitude.
fn thumb_value(
    raw: &RawState,
    descriptors: &DescriptorSet,
    vertical: bool,
) -> Result<i32, MappingError> {
    let mut best = 0;
    for descriptor in descriptors {
        let value = match *descriptor {
            Descriptor::Axis { index, inverted, half } => {
                recenter(axis(raw, index)?, inverted, half, vertical)
            }
            Descriptor::Slider { index, inverted, half } => {
                recenter(slider(raw, index)?, inverted, half, vertical)
            }
            Descriptor::Button { index, inverted } => {
                deflect(raw.button(usize::from(index)), inverted)
            }
            Descriptor::Pov { index, direction } => {
                deflect(pov_matches(pov(raw, index)?, direction), false)
            }
        };
        best = larger_magnitude(best, value);
    }
    Ok(best)
}

/// Full deflection for a digital control, toward negative when inverted.
#[inline]
fn deflect(on: bool, inverted: bool) -> i32 {
    match (on, inverted) {
        (false, _) => 0,
        (true, false) => i32::from(i16::MAX),
        (true, true) => i32::from(i16::MIN),
    }
}

fn recenter(value: u16, inverted: bool, half: bool, vertical: bool) -> i32 {
    let mut centred = if half {
        i32::from(value.saturating_sub(AXIS_CENTER))
    } else {
        i32::from(value) - i32::from(AXIS_CENTER)
    };
    // Devices report down as positive; the output convention is up.
    if vertical {
        centred = negate_thumb(centred);
    }
    if inverted {
        centred = negate_thumb(centred);
    }
    centred
}

/// Pick the value with the larger magnitude, the positive one on a tie.
#[inline]
pub fn larger_magnitude(a: i32, b: i32) -> i32 {
    if (b.abs(), b) > (a.abs(), a) {
        b
    } else {
        a
    }
}

fn axis(raw: &RawState, index: u8) -> Result<u16, MappingError> {
    raw.axis(usize::from(index))
        .ok_or(MappingError::MissingControl { kind: "axis", index })
}

fn slider(raw: &RawState, index: u8) -> Result<u16, MappingError> {
    raw.slider(usize::from(index))
        .ok_or(MappingError::MissingControl { kind: "slider", index })
}

fn pov(raw: &RawState, index: u8) -> Result<i32, MappingError> {
    raw.pov(usize::from(index))
        .ok_or(MappingError::MissingControl { kind: "pov", index })
}
