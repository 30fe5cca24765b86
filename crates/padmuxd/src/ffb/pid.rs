//! Force-feedback effect packets of a programmable (PID style) device.
//!
//! Layout, little endian, first byte is the report id:
//!
//! | id     | report            | body                                         |
//! |--------|-------------------|----------------------------------------------|
//! | `0x01` | set effect        | block, type, duration ms (u16), gain, direction (u16 centidegrees) |
//! | `0x03` | set condition     | block, positive coefficient (i16), negative coefficient (i16) |
//! | `0x04` | set periodic      | block, magnitude (u16)                       |
//! | `0x05` | set constant      | block, magnitude (i16)                       |
//! | `0x06` | set ramp          | block, start (i16), end (i16)                |
//! | `0x0a` | effect operation  | block, operation, loop count                 |
//! | `0x0b` | block free        | block                                        |
//! | `0x0c` | device control    | control                                      |
//! | `0x0d` | device gain       | gain                                         |
//!
//! Magnitudes use the native `-10000..=10000` range, gains `0..=255`.

use thiserror::Error;

/// Effect blocks the device exposes, numbered from 1.
pub const MAX_EFFECTS: usize = 40;
/// Largest native magnitude.
pub const NATIVE_MAX: i32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("unknown report id {0:#04x}")]
    UnknownReport(u8),
    #[error("report {id:#04x} needs {expected} bytes, got {actual}")]
    Truncated { id: u8, expected: usize, actual: usize },
    #[error("effect block {0} out of range")]
    Block(u8),
    #[error("unknown effect type {0}")]
    EffectType(u8),
    #[error("unknown effect operation {0}")]
    Operation(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectType {
    Constant,
    Ramp,
    Square,
    Sine,
    Triangle,
    SawtoothUp,
    SawtoothDown,
    Spring,
    Damper,
    Inertia,
    Friction,
}

impl EffectType {
    fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            1 => EffectType::Constant,
            2 => EffectType::Ramp,
            3 => EffectType::Square,
            4 => EffectType::Sine,
            5 => EffectType::Triangle,
            6 => EffectType::SawtoothUp,
            7 => EffectType::SawtoothDown,
            8 => EffectType::Spring,
            9 => EffectType::Damper,
            10 => EffectType::Inertia,
            11 => EffectType::Friction,
            _ => return None,
        })
    }

    /// Condition effects have no direction and drive both motors equally.
    pub fn is_condition(self) -> bool {
        matches!(
            self,
            EffectType::Spring | EffectType::Damper | EffectType::Inertia | EffectType::Friction
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    /// Start this effect and stop every other one.
    Solo,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceControl {
    EnableActuators,
    DisableActuators,
    StopAll,
    Reset,
    Pause,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    SetEffect {
        block: u8,
        effect: EffectType,
        duration_ms: u16,
        gain: u8,
        direction: u16,
    },
    SetCondition {
        block: u8,
        positive: i16,
        negative: i16,
    },
    SetPeriodic {
        block: u8,
        magnitude: u16,
    },
    SetConstant {
        block: u8,
        magnitude: i16,
    },
    SetRamp {
        block: u8,
        start: i16,
        end: i16,
    },
    Operation {
        block: u8,
        operation: Operation,
        loop_count: u8,
    },
    BlockFree {
        block: u8,
    },
    DeviceControl(DeviceControl),
    DeviceGain(u8),
}

impl Packet {
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let (&id, body) = bytes.split_first().ok_or(PacketError::Empty)?;
        let need = |expected: usize| {
            if body.len() < expected {
                Err(PacketError::Truncated {
                    id,
                    expected: expected + 1,
                    actual: bytes.len(),
                })
            } else {
                Ok(())
            }
        };
        let u16_at = |at: usize| u16::from_le_bytes([body[at], body[at + 1]]);
        let i16_at = |at: usize| i16::from_le_bytes([body[at], body[at + 1]]);

        Ok(match id {
            0x01 => {
                need(7)?;
                Packet::SetEffect {
                    block: block(body[0])?,
                    effect: EffectType::from_id(body[1]).ok_or(PacketError::EffectType(body[1]))?,
                    duration_ms: u16_at(2),
                    gain: body[4],
                    direction: u16_at(5),
                }
            }
            0x03 => {
                need(5)?;
                Packet::SetCondition {
                    block: block(body[0])?,
                    positive: i16_at(1),
                    negative: i16_at(3),
                }
            }
            0x04 => {
                need(3)?;
                Packet::SetPeriodic {
                    block: block(body[0])?,
                    magnitude: u16_at(1),
                }
            }
            0x05 => {
                need(3)?;
                Packet::SetConstant {
                    block: block(body[0])?,
                    magnitude: i16_at(1),
                }
            }
            0x06 => {
                need(5)?;
                Packet::SetRamp {
                    block: block(body[0])?,
                    start: i16_at(1),
                    end: i16_at(3),
                }
            }
            0x0a => {
                need(3)?;
                let operation = match body[1] {
                    1 => Operation::Start,
                    2 => Operation::Solo,
                    3 => Operation::Stop,
                    other => return Err(PacketError::Operation(other)),
                };
                Packet::Operation {
                    block: block(body[0])?,
                    operation,
                    loop_count: body[2],
                }
            }
            0x0b => {
                need(1)?;
                Packet::BlockFree {
                    block: block(body[0])?,
                }
            }
            0x0c => {
                need(1)?;
                let control = match body[0] {
                    1 => DeviceControl::EnableActuators,
                    2 => DeviceControl::DisableActuators,
                    3 => DeviceControl::StopAll,
                    4 => DeviceControl::Reset,
                    5 => DeviceControl::Pause,
                    6 => DeviceControl::Continue,
                    other => return Err(PacketError::Operation(other)),
                };
                Packet::DeviceControl(control)
            }
            0x0d => {
                need(1)?;
                Packet::DeviceGain(body[0])
            }
            other => return Err(PacketError::UnknownReport(other)),
        })
    }
}

fn block(value: u8) -> Result<u8, PacketError> {
    if value == 0 || usize::from(value) > MAX_EFFECTS {
        Err(PacketError::Block(value))
    } else {
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Effect {
    effect: Option<EffectType>,
    magnitude: i32,
    gain: u8,
    direction: u16,
    running: bool,
}

/// Accumulated effect state of one programmable device.
#[derive(Debug, Clone)]
pub struct EffectState {
    effects: [Effect; MAX_EFFECTS],
    device_gain: u8,
    actuators: bool,
}

impl Default for EffectState {
    fn default() -> Self {
        Self {
            effects: [Effect::default(); MAX_EFFECTS],
            device_gain: u8::MAX,
            actuators: true,
        }
    }
}

impl EffectState {
    /// Fold one packet in. Returns whether the motor output may have changed.
    pub fn apply(&mut self, packet: &Packet) -> bool {
        match *packet {
            Packet::SetEffect {
                block,
                effect,
                gain,
                direction,
                ..
            } => {
                let slot = self.effect_mut(block);
                slot.effect = Some(effect);
                slot.gain = gain;
                slot.direction = direction;
                slot.running
            }
            Packet::SetCondition {
                block,
                positive,
                negative,
            } => self.set_magnitude(block, magnitude(positive).max(magnitude(negative))),
            Packet::SetPeriodic { block, magnitude } => {
                self.set_magnitude(block, i32::from(magnitude).min(NATIVE_MAX))
            }
            Packet::SetConstant { block, magnitude: m } => self.set_magnitude(block, magnitude(m)),
            Packet::SetRamp { block, start, end } => {
                self.set_magnitude(block, magnitude(start).max(magnitude(end)))
            }
            Packet::Operation {
                block, operation, ..
            } => {
                match operation {
                    Operation::Start => self.effect_mut(block).running = true,
                    Operation::Solo => {
                        for effect in &mut self.effects {
                            effect.running = false;
                        }
                        self.effect_mut(block).running = true;
                    }
                    Operation::Stop => self.effect_mut(block).running = false,
                }
                true
            }
            Packet::BlockFree { block } => {
                let slot = self.effect_mut(block);
                let was_running = slot.running;
                *slot = Effect::default();
                was_running
            }
            Packet::DeviceControl(control) => match control {
                DeviceControl::StopAll => {
                    for effect in &mut self.effects {
                        effect.running = false;
                    }
                    true
                }
                DeviceControl::Reset => {
                    *self = Self::default();
                    true
                }
                DeviceControl::EnableActuators => {
                    self.actuators = true;
                    true
                }
                DeviceControl::DisableActuators => {
                    self.actuators = false;
                    true
                }
                DeviceControl::Pause | DeviceControl::Continue => false,
            },
            Packet::DeviceGain(gain) => {
                self.device_gain = gain;
                true
            }
        }
    }

    fn effect_mut(&mut self, block: u8) -> &mut Effect {
        let index = usize::from(block.max(1)) - 1;
        &mut self.effects[index.min(MAX_EFFECTS - 1)]
    }

    fn set_magnitude(&mut self, block: u8, magnitude: i32) -> bool {
        let slot = self.effect_mut(block);
        slot.magnitude = magnitude;
        slot.running
    }

    /// Aggregate `(left, right)` motor intensities of the running effects.
    pub fn motors(&self) -> (u16, u16) {
        if !self.actuators {
            return (0, 0);
        }
        let mut left = 0.0f32;
        let mut right = 0.0f32;
        for effect in self.effects.iter().filter(|e| e.running) {
            let Some(kind) = effect.effect else {
                continue;
            };
            let strength = effect.magnitude as f32 * f32::from(effect.gain) / 255.0;
            if kind.is_condition() {
                left += strength;
                right += strength;
                continue;
            }
            let angle = (f32::from(effect.direction) / 100.0).to_radians();
            let (sin, cos) = angle.sin_cos();
            let forward = cos.abs();
            right += strength * (forward + sin.max(0.0)).min(1.0);
            left += strength * (forward + (-sin).max(0.0)).min(1.0);
        }
        let scale = f32::from(self.device_gain) / 255.0;
        (to_motor(left * scale), to_motor(right * scale))
    }
}

#[inline]
fn magnitude(value: i16) -> i32 {
    i32::from(value).abs().min(NATIVE_MAX)
}

#[inline]
fn to_motor(native: f32) -> u16 {
    (native / NATIVE_MAX as f32 * f32::from(u16::MAX))
        .round()
        .clamp(0.0, f32::from(u16::MAX)) as u16
}
