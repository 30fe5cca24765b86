use padmux_bit_derive::Bit;
use padmux_bit_mask::Bitmask;

/// Logical gamepad buttons.
///
/// Positions follow the XInput `wButtons` layout so the mask value can be
/// handed to virtual controllers without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Bit)]
pub enum Button {
    DPadUp = 0,
    DPadDown,
    DPadLeft,
    DPadRight,
    Start,
    Back,
    LeftThumb,
    RightThumb,
    LeftShoulder,
    RightShoulder,
    Guide,
    A = 12,
    B,
    X,
    Y,
}

/// Analog fields of a logical gamepad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GamepadAxis {
    LeftTrigger,
    RightTrigger,
    LeftX,
    LeftY,
    RightX,
    RightY,
}

impl GamepadAxis {
    pub const ALL: [GamepadAxis; 6] = [
        GamepadAxis::LeftTrigger,
        GamepadAxis::RightTrigger,
        GamepadAxis::LeftX,
        GamepadAxis::LeftY,
        GamepadAxis::RightX,
        GamepadAxis::RightY,
    ];

    #[inline]
    pub fn is_trigger(self) -> bool {
        matches!(self, GamepadAxis::LeftTrigger | GamepadAxis::RightTrigger)
    }

    /// Y axes of the sticks, whose output convention is positive = up.
    #[inline]
    pub fn is_vertical(self) -> bool {
        matches!(self, GamepadAxis::LeftY | GamepadAxis::RightY)
    }
}

/// Fixed-shape gamepad value shared by mapping, combination, macros and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LogicalGamepad {
    pub buttons: Bitmask<Button>,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

impl LogicalGamepad {
    pub const NEUTRAL: LogicalGamepad = LogicalGamepad {
        buttons: Bitmask::empty(),
        left_trigger: 0,
        right_trigger: 0,
        thumb_lx: 0,
        thumb_ly: 0,
        thumb_rx: 0,
        thumb_ry: 0,
    };

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }

    /// Button mask in XInput `wButtons` form.
    #[inline]
    pub fn xinput_buttons(&self) -> u16 {
        self.buttons.value() as u16
    }

    pub fn axis(&self, axis: GamepadAxis) -> i32 {
        match axis {
            GamepadAxis::LeftTrigger => i32::from(self.left_trigger),
            GamepadAxis::RightTrigger => i32::from(self.right_trigger),
            GamepadAxis::LeftX => i32::from(self.thumb_lx),
            GamepadAxis::LeftY => i32::from(self.thumb_ly),
            GamepadAxis::RightX => i32::from(self.thumb_rx),
            GamepadAxis::RightY => i32::from(self.thumb_ry),
        }
    }

    /// Write an analog field, clamping to the field's range.
    pub fn set_axis(&mut self, axis: GamepadAxis, value: i32) {
        let trigger = value.clamp(0, i32::from(u8::MAX)) as u8;
        let thumb = value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        match axis {
            GamepadAxis::LeftTrigger => self.left_trigger = trigger,
            GamepadAxis::RightTrigger => self.right_trigger = trigger,
            GamepadAxis::LeftX => self.thumb_lx = thumb,
            GamepadAxis::LeftY => self.thumb_ly = thumb,
            GamepadAxis::RightX => self.thumb_rx = thumb,
            GamepadAxis::RightY => self.thumb_ry = thumb,
        }
    }
}
