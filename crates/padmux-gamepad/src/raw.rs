pub const MAX_BUTTONS: usize = 128;
pub const MAX_AXES: usize = 8;
pub const MAX_SLIDERS: usize = 4;
pub const MAX_POVS: usize = 4;

/// Raw axis value of a centred control.
pub const AXIS_CENTER: u16 = 32768;

/// Hat value reported when no direction is held.
pub const POV_CENTERED: i32 = -1;

const BUTTON_WORDS: usize = MAX_BUTTONS / 64;

/// One raw snapshot of a physical device.
///
/// Axes and sliders are unsigned 16-bit. Hats are in centidegrees,
/// 0 = up and clockwise, [`POV_CENTERED`] when released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawState {
    buttons: [u64; BUTTON_WORDS],
    pub axes: [u16; MAX_AXES],
    pub sliders: [u16; MAX_SLIDERS],
    pub povs: [i32; MAX_POVS],
}

impl Default for RawState {
    fn default() -> Self {
        Self {
            buttons: [0; BUTTON_WORDS],
            axes: [AXIS_CENTER; MAX_AXES],
            sliders: [0; MAX_SLIDERS],
            povs: [POV_CENTERED; MAX_POVS],
        }
    }
}

/// A single control that changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDelta {
    Button { index: u16, pressed: bool },
    Axis { index: u8, value: u16 },
    Slider { index: u8, value: u16 },
    Pov { index: u8, value: i32 },
}

impl RawState {
    /// Out-of-range indices read as released.
    #[inline]
    pub fn button(&self, index: usize) -> bool {
        if index >= MAX_BUTTONS {
            return false;
        }
        self.buttons[index / 64] & (1u64 << (index % 64)) != 0
    }

    #[inline]
    pub fn set_button(&mut self, index: usize, pressed: bool) {
        if index >= MAX_BUTTONS {
            return;
        }
        let bit = 1u64 << (index % 64);
        if pressed {
            self.buttons[index / 64] |= bit;
        } else {
            self.buttons[index / 64] &= !bit;
        }
    }

    #[inline]
    pub fn axis(&self, index: usize) -> Option<u16> {
        self.axes.get(index).copied()
    }

    #[inline]
    pub fn slider(&self, index: usize) -> Option<u16> {
        self.sliders.get(index).copied()
    }

    #[inline]
    pub fn pov(&self, index: usize) -> Option<i32> {
        self.povs.get(index).copied()
    }

    pub fn pressed_count(&self) -> u32 {
        self.buttons.iter().map(|w| w.count_ones()).sum()
    }

    /// Append every control that differs from `previous` to `out`.
    pub fn diff_into(&self, previous: &RawState, out: &mut Vec<RawDelta>) {
        for (word, (now, before)) in self.buttons.iter().zip(previous.buttons).enumerate() {
            let mut changed = now ^ before;
            while changed != 0 {
                let bit = changed.trailing_zeros();
                changed &= changed - 1;
                out.push(RawDelta::Button {
                    index: (word * 64) as u16 + bit as u16,
                    pressed: now & (1u64 << bit) != 0,
                });
            }
        }
        for (i, (now, before)) in self.axes.iter().zip(previous.axes).enumerate() {
            if *now != before {
                out.push(RawDelta::Axis { index: i as u8, value: *now });
            }
        }
        for (i, (now, before)) in self.sliders.iter().zip(previous.sliders).enumerate() {
            if *now != before {
                out.push(RawDelta::Slider { index: i as u8, value: *now });
            }
        }
        for (i, (now, before)) in self.povs.iter().zip(previous.povs).enumerate() {
            if *now != before {
                out.push(RawDelta::Pov { index: i as u8, value: *now });
            }
        }
    }
}
