use std::ffi::CStr;

use ahash::AHashMap;
use sdl2::joystick::{HatState, Joystick};
use sdl2::{EventPump, JoystickSubsystem, Sdl};

use crate::backend::{DeviceBackend, DeviceInfo, FeedbackCaps, ProductKey};
use crate::raw::{RawState, MAX_AXES, MAX_BUTTONS, MAX_POVS, POV_CENTERED};
use crate::{Error, Result};

/// Rumble duration handed to SDL. SDL clamps it to its own maximum; the
/// caller refreshes long-running rumble before it expires.
const RUMBLE_DURATION_MS: u32 = u32::MAX;

/// An opened SDL joystick.
pub struct SdlDevice {
    joystick: Joystick,
}

/// SDL2-backed physical device backend.
///
/// SDL must live entirely within the thread that created it, so the backend
/// is built on the worker thread.
pub struct Sdl2Backend {
    _sdl: Sdl,
    joysticks: JoystickSubsystem,
    event_pump: EventPump,
    /// Instance id -> joystick index from the last enumeration.
    indices: AHashMap<Box<str>, u32>,
}

impl Sdl2Backend {
    pub fn new() -> Result<Self> {
        let sdl = sdl2::init().map_err(Error::BackendInit)?;
        let joysticks = sdl.joystick().map_err(Error::BackendInit)?;
        let event_pump = sdl.event_pump().map_err(Error::BackendInit)?;
        Ok(Self {
            _sdl: sdl,
            joysticks,
            event_pump,
            indices: AHashMap::new(),
        })
    }
}

impl DeviceBackend for Sdl2Backend {
    type Handle = SdlDevice;

    fn sync(&mut self) {
        self.event_pump.pump_events();
    }

    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>> {
        let count = self.joysticks.num_joysticks().map_err(Error::Enumerate)?;
        let mut seen: AHashMap<String, u32> = AHashMap::new();
        let mut devices = Vec::with_capacity(count as usize);
        self.indices.clear();

        for index in 0..count {
            let Ok(guid) = self.joysticks.device_guid(index) else {
                continue;
            };
            let name = self
                .joysticks
                .name_for_index(index)
                .unwrap_or_else(|_| format!("Joystick {index}"));
            let guid = guid.string();
            let path = device_path(index);
            let instance_id = instance_id(&guid, path.as_deref(), &mut seen);

            self.indices.insert(instance_id.clone(), index);
            devices.push(DeviceInfo {
                product: product_from_guid(&guid),
                path: path
                    .unwrap_or_else(|| format!("sdl/{guid}/{name}"))
                    .into(),
                name: name.into(),
                instance_id,
            });
        }
        Ok(devices)
    }

    fn open(&mut self, info: &DeviceInfo) -> Result<SdlDevice> {
        let index = *self
            .indices
            .get(&info.instance_id)
            .ok_or_else(|| Error::NotFound(info.instance_id.to_string()))?;
        let joystick = self.joysticks.open(index).map_err(|e| Error::Open {
            id: info.instance_id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(SdlDevice { joystick })
    }

    fn capabilities(&self, handle: &SdlDevice) -> FeedbackCaps {
        FeedbackCaps {
            rumble: handle.joystick.has_rumble(),
            haptic: false,
        }
    }

    fn read_state(&mut self, handle: &mut SdlDevice) -> Option<RawState> {
        let joystick = &handle.joystick;
        if !joystick.attached() {
            return None;
        }

        let mut state = RawState::default();
        let axes = (joystick.num_axes() as usize).min(MAX_AXES);
        for axis in 0..axes {
            let value = joystick.axis(axis as u32).ok()?;
            state.axes[axis] = (i32::from(value) + 32768) as u16;
        }
        let buttons = (joystick.num_buttons() as usize).min(MAX_BUTTONS);
        for button in 0..buttons {
            state.set_button(button, joystick.button(button as u32).ok()?);
        }
        let hats = (joystick.num_hats() as usize).min(MAX_POVS);
        for hat in 0..hats {
            state.povs[hat] = hat_centidegrees(joystick.hat(hat as u32).ok()?);
        }
        Some(state)
    }

    fn set_rumble(&mut self, handle: &mut SdlDevice, low: u16, high: u16) -> Result<()> {
        let duration = if low == 0 && high == 0 {
            0
        } else {
            RUMBLE_DURATION_MS
        };
        handle
            .joystick
            .set_rumble(low, high, duration)
            .map_err(|e| Error::Backend(e.to_string()))
    }

    fn close(&mut self, handle: SdlDevice) {
        drop(handle);
    }
}

/// OS path of a joystick by enumeration index, when SDL knows one.
fn device_path(index: u32) -> Option<String> {
    let index = i32::try_from(index).ok()?;
    // SAFETY: SDL is initialised by the backend and the index is in range.
    // The returned string is owned by SDL and copied before the next call.
    let raw = unsafe { sdl2::sys::SDL_JoystickPathForIndex(index) };
    if raw.is_null() {
        return None;
    }
    // SAFETY: non-null pointers from SDL are NUL-terminated.
    let path = unsafe { CStr::from_ptr(raw) }.to_string_lossy();
    (!path.is_empty()).then(|| path.into_owned())
}

/// Identical devices share a GUID. The device path keeps them apart when
/// available, otherwise the enumeration ordinal does.
fn instance_id(guid: &str, path: Option<&str>, seen: &mut AHashMap<String, u32>) -> Box<str> {
    if let Some(path) = path {
        return format!("{guid}@{path}").into();
    }
    let ordinal = seen.entry(guid.to_owned()).or_insert(0);
    let id = format!("{guid}#{ordinal}").into();
    *ordinal += 1;
    id
}

fn hat_centidegrees(hat: HatState) -> i32 {
    match hat {
        HatState::Centered => POV_CENTERED,
        HatState::Up => 0,
        HatState::RightUp => 4500,
        HatState::Right => 9000,
        HatState::RightDown => 13500,
        HatState::Down => 18000,
        HatState::LeftDown => 22500,
        HatState::Left => 27000,
        HatState::LeftUp => 31500,
    }
}

/// SDL GUIDs carry little-endian vendor and product ids at bytes 4 and 8.
fn product_from_guid(guid: &str) -> ProductKey {
    let byte = |i: usize| {
        guid.get(i * 2..i * 2 + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    ProductKey {
        vendor_id: u16::from_le_bytes([byte(4), byte(5)]),
        product_id: u16::from_le_bytes([byte(8), byte(9)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_is_read_from_usb_guid() {
        // Xbox 360 wired pad as reported by SDL on Linux.
        let key = product_from_guid("030000005e0400008e02000014010000");
        assert_eq!(key, ProductKey::new(0x045e, 0x028e));
    }

    #[test]
    fn malformed_guid_yields_zero_product() {
        assert!(product_from_guid("zz").is_zero());
    }

    #[test]
    fn identical_pads_keep_their_path_based_ids() {
        let guid = "030000005e0400008e02000014010000";
        let mut seen = AHashMap::new();
        let first = instance_id(guid, Some("/dev/input/event7"), &mut seen);
        let second = instance_id(guid, Some("/dev/input/event4"), &mut seen);
        assert_eq!(&*first, "030000005e0400008e02000014010000@/dev/input/event7");
        assert_ne!(first, second);

        // Enumeration order flips; the ids follow the devices.
        let mut seen = AHashMap::new();
        assert_eq!(instance_id(guid, Some("/dev/input/event4"), &mut seen), second);
        assert_eq!(instance_id(guid, Some("/dev/input/event7"), &mut seen), first);
    }

    #[test]
    fn pads_without_a_path_fall_back_to_ordinals() {
        let guid = "030000005e0400008e02000014010000";
        let mut seen = AHashMap::new();
        assert_eq!(&*instance_id(guid, None, &mut seen), "030000005e0400008e02000014010000#0");
        assert_eq!(&*instance_id(guid, None, &mut seen), "030000005e0400008e02000014010000#1");
        assert_eq!(&*instance_id("other", None, &mut seen), "other#0");
    }

    #[test]
    fn hats_convert_to_centidegrees() {
        assert_eq!(hat_centidegrees(HatState::Centered), POV_CENTERED);
        assert_eq!(hat_centidegrees(HatState::Right), 9000);
        assert_eq!(hat_centidegrees(HatState::LeftUp), 31500);
    }
}
