use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use padmux_bit_mask::Bitmask;
use padmux_control::KeyChord;
use padmux_gamepad::{Button, GamepadAxis, ProductKey};
use smallvec::SmallVec;

use crate::descriptor::DescriptorSet;

/// Number of virtual controller slots.
pub const MAX_SLOTS: usize = 4;

/// A chord of logical buttons.
pub type ButtonChord = Bitmask<Button>;

/// Emulated controller hardware a slot presents to games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControllerKind {
    #[default]
    Xbox360,
    DualShock4,
    Generic,
}

impl ControllerKind {
    pub const ALL: [ControllerKind; 3] = [
        ControllerKind::Xbox360,
        ControllerKind::DualShock4,
        ControllerKind::Generic,
    ];

    /// Vendor/product id the emulated hardware reports.
    pub const fn product(self) -> ProductKey {
        match self {
            ControllerKind::Xbox360 => ProductKey::new(0x045e, 0x028e),
            ControllerKind::DualShock4 => ProductKey::new(0x054c, 0x05c4),
            ControllerKind::Generic => ProductKey::new(0x1234, 0xbead),
        }
    }

    pub const fn index(self) -> usize {
        match self {
            ControllerKind::Xbox360 => 0,
            ControllerKind::DualShock4 => 1,
            ControllerKind::Generic => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ControllerKind::Xbox360 => "xbox360",
            ControllerKind::DualShock4 => "dualshock4",
            ControllerKind::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Dead-zone shaping parameters, all in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shaping {
    /// Inner dead zone, 0..=100.
    pub dead_zone: u8,
    /// Output floor once past the dead zone, 0..=100.
    pub anti_dead_zone: u8,
    /// Pull of the shaped response back toward the raw one, -100..=100.
    /// Negative values push it further out, 0 disables the blend.
    pub linear: i8,
}

impl Shaping {
    pub fn is_identity(&self) -> bool {
        self.dead_zone == 0 && self.anti_dead_zone == 0 && self.linear == 0
    }
}

/// Per-profile force-feedback tuning, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedbackTuning {
    pub gain: u8,
    pub left_gain: u8,
    pub right_gain: u8,
    pub swap_motors: bool,
}

impl Default for FeedbackTuning {
    fn default() -> Self {
        Self {
            gain: 100,
            left_gain: 100,
            right_gain: 100,
            swap_motors: false,
        }
    }
}

/// Descriptor rules turning one device's raw state into a logical gamepad.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappingProfile {
    pub name: Box<str>,
    pub buttons: Vec<(Button, DescriptorSet)>,
    pub axes: Vec<(GamepadAxis, DescriptorSet)>,
    /// Derive the whole d-pad from this hat, diagonals included.
    pub dpad_pov: Option<u8>,
    pub left_stick: Shaping,
    pub right_stick: Shaping,
    pub left_trigger: Shaping,
    pub right_trigger: Shaping,
    pub feedback: FeedbackTuning,
}

/// What starts a macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroTrigger {
    /// All buttons of the chord set in the combined slot state.
    Buttons(ButtonChord),
    /// All raw button indices pressed on one specific device.
    Raw {
        device: Box<str>,
        buttons: SmallVec<[u16; 4]>,
    },
}

impl MacroTrigger {
    pub fn is_empty(&self) -> bool {
        match self {
            MacroTrigger::Buttons(chord) => chord.is_empty(),
            MacroTrigger::Raw { buttons, .. } => buttons.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriggerMode {
    #[default]
    OnPress,
    OnRelease,
    WhileHeld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatPolicy {
    /// Run the sequence this many times. `Count(1)` runs it once.
    Count(u32),
    UntilRelease,
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        RepeatPolicy::Count(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroAction {
    ButtonPress {
        buttons: ButtonChord,
        duration: Duration,
    },
    ButtonRelease {
        buttons: ButtonChord,
    },
    KeyPress {
        keys: KeyChord,
        duration: Duration,
    },
    KeyRelease {
        keys: KeyChord,
    },
    Delay(Duration),
    AxisSet {
        axis: GamepadAxis,
        value: i32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDefinition {
    pub name: Box<str>,
    pub enabled: bool,
    pub trigger: MacroTrigger,
    pub mode: TriggerMode,
    pub actions: Vec<MacroAction>,
    pub repeat: RepeatPolicy,
    pub repeat_delay: Duration,
    pub consume_trigger: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotSettings {
    pub index: usize,
    pub created: bool,
    pub enabled: bool,
    pub kind: ControllerKind,
    pub macros: Arc<[MacroDefinition]>,
}

impl SlotSettings {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            created: true,
            enabled: true,
            kind: ControllerKind::default(),
            macros: Arc::from(Vec::new()),
        }
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.created && self.enabled
    }
}

/// Binds one physical device to one slot through a mapping profile.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotAssignment {
    pub device: Box<str>,
    /// Fallback identity for reconnects that change the instance id.
    pub product: Option<ProductKey>,
    pub slot: usize,
    pub profile: Arc<MappingProfile>,
}

/// Complete, validated settings snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    pub slots: Vec<SlotSettings>,
    pub profiles: AHashMap<Box<str>, Arc<MappingProfile>>,
    pub assignments: Vec<SlotAssignment>,
}

impl Settings {
    pub fn slot(&self, index: usize) -> Option<&SlotSettings> {
        self.slots.iter().find(|s| s.index == index)
    }

    pub fn assignments_for_slot(&self, slot: usize) -> impl Iterator<Item = &SlotAssignment> {
        self.assignments.iter().filter(move |a| a.slot == slot)
    }

    pub fn assignments_for_device<'a>(
        &'a self,
        device: &'a str,
    ) -> impl Iterator<Item = &'a SlotAssignment> + 'a {
        self.assignments.iter().filter(move |a| &*a.device == device)
    }
}
