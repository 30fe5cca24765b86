//! Force feedback from virtual controllers back to physical motors.
//!
//! Virtual controller callbacks run on backend threads. They only send
//! [`FeedbackMessage`]s; the worker drains them once per cycle and owns
//! every piece of feedback state.
//!
//! Every sink carries the generation of the pad it was issued to. Messages
//! from a pad that has since been destroyed are dropped.

pub mod pid;

use std::time::{Duration, Instant};

use ahash::AHashMap;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use padmux_gamepad::DeviceBackend;
use padmux_workspace::{FeedbackTuning, Settings, MAX_SLOTS};
use smallvec::SmallVec;

use crate::registry::Device;
use pid::{EffectState, Packet, PacketError};

/// Motors of a device are re-sent at least this often while spinning.
const RUMBLE_REFRESH: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackMessage {
    /// Latest motor values written by a game.
    Motors {
        slot: usize,
        generation: u32,
        left: u16,
        right: u16,
    },
    /// Raw effect report for a programmable device.
    Packet {
        slot: usize,
        generation: u32,
        data: SmallVec<[u8; 16]>,
    },
}

/// Sending half handed to a virtual controller for one slot.
#[derive(Debug, Clone)]
pub struct FeedbackSink {
    slot: usize,
    generation: u32,
    tx: Sender<FeedbackMessage>,
}

impl FeedbackSink {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn motors(&self, left: u16, right: u16) {
        let _ = self.tx.send(FeedbackMessage::Motors {
            slot: self.slot,
            generation: self.generation,
            left,
            right,
        });
    }

    pub fn packet(&self, data: &[u8]) {
        let _ = self.tx.send(FeedbackMessage::Packet {
            slot: self.slot,
            generation: self.generation,
            data: SmallVec::from_slice(data),
        });
    }
}

/// Test vibration overriding a slot's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRumble {
    /// Only this device receives it; others assigned to the slot skip it.
    pub device: Option<Box<str>>,
    pub left: u16,
    pub right: u16,
}

#[derive(Debug, Default)]
struct SlotFeedback {
    /// Generation of the live pad's sink, `None` while the slot has no pad.
    open: Option<u32>,
    issued: u32,
    motors: (u16, u16),
    effects: EffectState,
    /// `effects.motors()` as of the last packet that could change it.
    effect_motors: (u16, u16),
    test: Option<TestRumble>,
}

impl SlotFeedback {
    fn accepts(&self, generation: u32) -> bool {
        self.open == Some(generation)
    }

    fn vibration(&self) -> (u16, u16) {
        if let Some(test) = &self.test {
            return (test.left, test.right);
        }
        let effects = self.effect_motors;
        (self.motors.0.max(effects.0), self.motors.1.max(effects.1))
    }
}

#[derive(Debug, Clone, Copy)]
struct Applied {
    motors: (u16, u16),
    at: Instant,
}

/// Error applying feedback to a physical device.
#[derive(Debug, thiserror::Error)]
#[error("rumble on {device}: {source}")]
pub struct ApplyError {
    pub device: Box<str>,
    #[source]
    pub source: padmux_gamepad::Error,
}

pub struct FeedbackRouter {
    tx: Sender<FeedbackMessage>,
    rx: Receiver<FeedbackMessage>,
    slots: [SlotFeedback; MAX_SLOTS],
    applied: AHashMap<Box<str>, Applied>,
}

impl Default for FeedbackRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackRouter {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            slots: Default::default(),
            applied: AHashMap::new(),
        }
    }

    /// Open a slot for a new pad and hand out its sink. Sinks issued
    /// earlier for the slot stop being heard.
    pub fn sink(&mut self, slot: usize) -> FeedbackSink {
        let generation = match self.slots.get_mut(slot) {
            Some(state) => {
                state.issued = state.issued.wrapping_add(1);
                state.open = Some(state.issued);
                state.issued
            }
            None => 0,
        };
        FeedbackSink {
            slot,
            generation,
            tx: self.tx.clone(),
        }
    }

    /// Fold every pending message into slot state.
    pub fn drain(&mut self) -> Vec<(usize, PacketError)> {
        let mut errors = Vec::new();
        loop {
            let message = match self.rx.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            match message {
                FeedbackMessage::Motors {
                    slot,
                    generation,
                    left,
                    right,
                } => {
                    if let Some(state) = self.slots.get_mut(slot) {
                        if state.accepts(generation) {
                            state.motors = (left, right);
                        }
                    }
                }
                FeedbackMessage::Packet {
                    slot,
                    generation,
                    data,
                } => {
                    let Some(state) = self.slots.get_mut(slot) else {
                        continue;
                    };
                    if !state.accepts(generation) {
                        continue;
                    }
                    match Packet::decode(&data) {
                        Ok(packet) => {
                            if state.effects.apply(&packet) {
                                state.effect_motors = state.effects.motors();
                            }
                        }
                        Err(e) => errors.push((slot, e)),
                    }
                }
            }
        }
        errors
    }

    /// Current motor pair of a slot.
    pub fn vibration(&self, slot: usize) -> (u16, u16) {
        self.slots.get(slot).map_or((0, 0), SlotFeedback::vibration)
    }

    /// Zero a slot whose virtual controller went away and stop listening
    /// to its sink.
    pub fn clear_slot(&mut self, slot: usize) {
        if let Some(state) = self.slots.get_mut(slot) {
            state.open = None;
            state.motors = (0, 0);
            state.effects = EffectState::default();
            state.effect_motors = (0, 0);
        }
    }

    pub fn set_test(&mut self, slot: usize, test: TestRumble) {
        if let Some(state) = self.slots.get_mut(slot) {
            state.test = Some(test);
        }
    }

    pub fn clear_test(&mut self, slot: usize) {
        if let Some(state) = self.slots.get_mut(slot) {
            state.test = None;
        }
    }

    /// Forget what was last sent to a device that went offline.
    pub fn forget(&mut self, device: &str) {
        self.applied.remove(device);
    }

    /// Motor pair a device should play: the per-channel maximum over every
    /// slot it is assigned to, tuned by the first assignment's profile.
    pub fn resolve(&self, answers_to: impl Fn(&str) -> bool, settings: &Settings) -> (u16, u16) {
        let mut pair = (0u16, 0u16);
        let mut tuning: Option<FeedbackTuning> = None;
        for assignment in settings.assignments.iter().filter(|a| answers_to(&a.device)) {
            let Some(state) = self.slots.get(assignment.slot) else {
                continue;
            };
            if let Some(TestRumble {
                device: Some(target),
                ..
            }) = &state.test
            {
                if !answers_to(target) {
                    continue;
                }
            }
            let (left, right) = state.vibration();
            pair = (pair.0.max(left), pair.1.max(right));
            tuning.get_or_insert(assignment.profile.feedback);
        }
        tune(pair, &tuning.unwrap_or_default())
    }

    /// Drive one device's motors. Sends only when the pair changed, or
    /// periodically while it is non-zero.
    pub fn apply<B: DeviceBackend>(
        &mut self,
        backend: &mut B,
        device: &mut Device<B::Handle>,
        settings: &Settings,
        now: Instant,
    ) -> Result<(), ApplyError> {
        if !device.caps().any() {
            return Ok(());
        }
        let motors = self.resolve(|id| device.answers_to(id), settings);
        let previous = self.applied.get(device.id()).copied();
        let due = match previous {
            None => motors != (0, 0),
            Some(applied) => {
                applied.motors != motors
                    || (motors != (0, 0)
                        && now.saturating_duration_since(applied.at) >= RUMBLE_REFRESH)
            }
        };
        if !due {
            return Ok(());
        }
        let Some(handle) = device.handle_mut() else {
            return Ok(());
        };
        let result = backend.set_rumble(handle, motors.0, motors.1);
        // Recorded even on failure so a broken motor is not retried every cycle.
        self.applied
            .insert(device.id().into(), Applied { motors, at: now });
        result.map_err(|source| ApplyError {
            device: device.id().into(),
            source,
        })
    }
}

/// Apply gain, per-motor gain and swap, each clamped to 0..=100 %.
pub fn tune((left, right): (u16, u16), tuning: &FeedbackTuning) -> (u16, u16) {
    let pct = |v: u8| f32::from(v.min(100)) / 100.0;
    let gain = pct(tuning.gain);
    let scale = |v: u16, g: f32| (f32::from(v) * gain * g).round().min(f32::from(u16::MAX)) as u16;
    let left = scale(left, pct(tuning.left_gain));
    let right = scale(right, pct(tuning.right_gain));
    if tuning.swap_motors {
        (right, left)
    } else {
        (left, right)
    }
}
