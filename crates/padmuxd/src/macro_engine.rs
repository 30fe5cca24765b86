use std::sync::Arc;
use std::time::Instant;

use padmux_control::{KeyChord, KeySink};
use padmux_gamepad::{GamepadAxis, LogicalGamepad, RawState};
use padmux_workspace::{
    ButtonChord, MacroAction, MacroDefinition, MacroTrigger, RepeatPolicy, TriggerMode,
    MAX_SLOTS,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MacroError {
    #[error("macro \"{name}\": {source}")]
    Keys {
        name: Box<str>,
        #[source]
        source: padmux_control::Error,
    },
}

/// Raw snapshots of online devices, for macros triggered by raw buttons.
pub trait RawLookup {
    fn raw_state(&self, device: &str) -> Option<&RawState>;
}

impl<H> RawLookup for crate::registry::Registry<H> {
    fn raw_state(&self, device: &str) -> Option<&RawState> {
        crate::registry::Registry::raw_state(self, device)
    }
}

/// Execution state of one macro.
#[derive(Debug, Default)]
struct Runtime {
    running: bool,
    step: usize,
    /// When the current step was entered. `None` until its first tick.
    step_started: Option<Instant>,
    /// Passes left after the current one.
    remaining: u32,
    /// Inter-repeat pause.
    resume_at: Option<Instant>,
    previous_level: bool,
    held: ButtonChord,
    axes: [Option<i32>; GamepadAxis::ALL.len()],
    /// Chord of a `KeyPress` step still down.
    keys_down: Option<KeyChord>,
}

impl Runtime {
    fn start(&mut self, repeat: RepeatPolicy) {
        self.running = true;
        self.step = 0;
        self.step_started = None;
        self.resume_at = None;
        self.remaining = match repeat {
            RepeatPolicy::Count(n) => n.saturating_sub(1),
            RepeatPolicy::UntilRelease => 0,
        };
    }

    /// Return to idle, releasing anything the macro holds.
    fn stop(&mut self, keys: &mut dyn KeySink) {
        self.running = false;
        self.step = 0;
        self.step_started = None;
        self.resume_at = None;
        self.clear_outputs(keys);
    }

    fn clear_outputs(&mut self, keys: &mut dyn KeySink) {
        self.held = ButtonChord::empty();
        self.axes = [None; GamepadAxis::ALL.len()];
        if let Some(chord) = self.keys_down.take() {
            let _ = chord.release(keys);
        }
    }

    fn apply(&self, state: &mut LogicalGamepad) {
        state.buttons = state.buttons.union(self.held);
        for (axis, value) in GamepadAxis::ALL.iter().zip(self.axes) {
            if let Some(value) = value {
                state.set_axis(*axis, value);
            }
        }
    }

    /// Run the current step. Returns once at most one action completed.
    fn tick(
        &mut self,
        definition: &MacroDefinition,
        level: bool,
        keys: &mut dyn KeySink,
        now: Instant,
    ) -> Result<(), padmux_control::Error> {
        if let Some(resume_at) = self.resume_at {
            if now < resume_at {
                return Ok(());
            }
            self.resume_at = None;
        }

        let Some(action) = definition.actions.get(self.step) else {
            self.finish_pass(definition, level, keys, now);
            return Ok(());
        };

        let entering = self.step_started.is_none();
        let started = *self.step_started.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);

        let done = match action {
            MacroAction::ButtonPress { buttons, duration } => {
                if entering {
                    self.held = self.held.union(*buttons);
                }
                elapsed >= *duration
            }
            MacroAction::ButtonRelease { buttons } => {
                self.held = self.held.without(*buttons);
                true
            }
            MacroAction::KeyPress { keys: chord, duration } => {
                if entering {
                    self.keys_down = Some(chord.clone());
                    chord.press(keys)?;
                }
                if elapsed >= *duration {
                    self.keys_down = None;
                    chord.release(keys)?;
                    true
                } else {
                    false
                }
            }
            MacroAction::KeyRelease { keys: chord } => {
                if self.keys_down.as_ref() == Some(chord) {
                    self.keys_down = None;
                }
                chord.release(keys)?;
                true
            }
            MacroAction::Delay(duration) => elapsed >= *duration,
            MacroAction::AxisSet { axis, value } => {
                if let Some(i) = GamepadAxis::ALL.iter().position(|a| a == axis) {
                    self.axes[i] = Some(*value);
                }
                true
            }
        };

        if done {
            self.step += 1;
            self.step_started = None;
            if self.step >= definition.actions.len() {
                self.finish_pass(definition, level, keys, now);
            }
        }
        Ok(())
    }

    fn finish_pass(
        &mut self,
        definition: &MacroDefinition,
        level: bool,
        keys: &mut dyn KeySink,
        now: Instant,
    ) {
        let again = match definition.repeat {
            RepeatPolicy::Count(_) => self.remaining > 0,
            RepeatPolicy::UntilRelease => level,
        };
        if !again {
            // Outputs stay until the caller has applied this cycle's frame.
            self.running = false;
            self.step = 0;
            self.step_started = None;
            if let Some(chord) = self.keys_down.take() {
                let _ = chord.release(keys);
            }
            return;
        }
        self.remaining = self.remaining.saturating_sub(1);
        self.step = 0;
        self.step_started = None;
        if !definition.repeat_delay.is_zero() {
            self.resume_at = Some(now + definition.repeat_delay);
        }
    }
}

#[derive(Default)]
struct SlotMacros {
    source: Option<Arc<[MacroDefinition]>>,
    runtimes: Vec<Runtime>,
}

impl SlotMacros {
    fn sync(&mut self, macros: &Arc<[MacroDefinition]>, keys: &mut dyn KeySink) {
        if self.source.as_ref().is_some_and(|s| Arc::ptr_eq(s, macros)) {
            return;
        }
        self.reset(keys);
        self.runtimes = macros.iter().map(|_| Runtime::default()).collect();
        self.source = Some(Arc::clone(macros));
    }

    fn reset(&mut self, keys: &mut dyn KeySink) {
        for runtime in &mut self.runtimes {
            runtime.stop(keys);
        }
        self.runtimes.clear();
        self.source = None;
    }
}

/// Per-slot macro state machines.
#[derive(Default)]
pub struct MacroEngine {
    slots: [SlotMacros; MAX_SLOTS],
}

impl MacroEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the slot's macros against its combined state and write
    /// their outputs into `state`.
    ///
    /// On error the failing macro is stopped and `state` is left as it was.
    pub fn evaluate(
        &mut self,
        slot: usize,
        macros: &Arc<[MacroDefinition]>,
        state: &mut LogicalGamepad,
        raw: &dyn RawLookup,
        keys: &mut dyn KeySink,
        now: Instant,
    ) -> Result<(), MacroError> {
        let Some(slot_macros) = self.slots.get_mut(slot) else {
            return Ok(());
        };
        slot_macros.sync(macros, keys);

        let input = *state;
        let mut output = input;
        for (definition, runtime) in macros.iter().zip(slot_macros.runtimes.iter_mut()) {
            if !definition.enabled || definition.trigger.is_empty() {
                if runtime.running {
                    runtime.stop(keys);
                }
                runtime.previous_level = false;
                continue;
            }

            let level = trigger_level(&definition.trigger, &input, raw);
            let rising = level && !runtime.previous_level;
            let falling = !level && runtime.previous_level;
            runtime.previous_level = level;

            match definition.mode {
                TriggerMode::OnPress if rising && !runtime.running => {
                    runtime.start(definition.repeat);
                }
                TriggerMode::OnRelease if falling && !runtime.running => {
                    runtime.start(definition.repeat);
                }
                TriggerMode::WhileHeld => {
                    if level && !runtime.running {
                        runtime.start(definition.repeat);
                    } else if falling
                        && runtime.running
                        && definition.repeat == RepeatPolicy::UntilRelease
                    {
                        runtime.stop(keys);
                    }
                }
                _ => {}
            }

            if !runtime.running {
                continue;
            }
            if let Err(source) = runtime.tick(definition, level, keys, now) {
                runtime.stop(keys);
                return Err(MacroError::Keys {
                    name: definition.name.clone(),
                    source,
                });
            }

            if runtime.running && definition.consume_trigger && level {
                if let MacroTrigger::Buttons(chord) = &definition.trigger {
                    output.buttons = output.buttons.without(*chord);
                }
            }
            runtime.apply(&mut output);
            if !runtime.running {
                runtime.clear_outputs(keys);
            }
        }

        *state = output;
        Ok(())
    }

    /// Stop every macro of a slot and release what it holds.
    pub fn reset_slot(&mut self, slot: usize, keys: &mut dyn KeySink) {
        if let Some(slot_macros) = self.slots.get_mut(slot) {
            slot_macros.reset(keys);
        }
    }

    pub fn reset_all(&mut self, keys: &mut dyn KeySink) {
        for slot_macros in &mut self.slots {
            slot_macros.reset(keys);
        }
    }

    /// Whether any macro of the slot is executing.
    pub fn is_running(&self, slot: usize) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|s| s.runtimes.iter().any(|r| r.running))
    }
}

fn trigger_level(trigger: &MacroTrigger, state: &LogicalGamepad, raw: &dyn RawLookup) -> bool {
    match trigger {
        MacroTrigger::Buttons(chord) => chord.is_subset(&state.buttons),
        MacroTrigger::Raw { device, buttons } => raw.raw_state(device).is_some_and(|raw| {
            buttons.iter().all(|index| raw.button(usize::from(*index)))
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ahash::AHashMap;
    use padmux_control::Key;
    use padmux_gamepad::Button;
    use smallvec::smallvec;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<(bool, Key)>,
        fail: bool,
    }

    impl KeySink for Recorder {
        fn key_down(&mut self, key: Key) -> padmux_control::Result<()> {
            if self.fail {
                return Err(padmux_control::Error::Input("denied".into()));
            }
            self.events.push((true, key));
            Ok(())
        }

        fn key_up(&mut self, key: Key) -> padmux_control::Result<()> {
            self.events.push((false, key));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Raw(AHashMap<Box<str>, RawState>);

    impl RawLookup for Raw {
        fn raw_state(&self, device: &str) -> Option<&RawState> {
            self.0.get(device)
        }
    }

    const MS: Duration = Duration::from_millis(1);

    fn definition(trigger: &[Button], mode: TriggerMode, actions: Vec<MacroAction>) -> MacroDefinition {
        MacroDefinition {
            name: "test".into(),
            enabled: true,
            trigger: MacroTrigger::Buttons(ButtonChord::new(trigger)),
            mode,
            actions,
            repeat: RepeatPolicy::Count(1),
            repeat_delay: Duration::ZERO,
            consume_trigger: false,
        }
    }

    fn pressed(buttons: &[Button]) -> LogicalGamepad {
        LogicalGamepad {
            buttons: ButtonChord::new(buttons),
            ..LogicalGamepad::NEUTRAL
        }
    }

    struct Harness {
        engine: MacroEngine,
        macros: Arc<[MacroDefinition]>,
        keys: Recorder,
        raw: Raw,
        start: Instant,
    }

    impl Harness {
        fn new(macros: Vec<MacroDefinition>) -> Self {
            Self {
                engine: MacroEngine::new(),
                macros: macros.into(),
                keys: Recorder::default(),
                raw: Raw::default(),
                start: Instant::now(),
            }
        }

        fn step(&mut self, input: LogicalGamepad, at_ms: u64) -> LogicalGamepad {
            let mut state = input;
            self.engine
                .evaluate(
                    0,
                    &self.macros,
                    &mut state,
                    &self.raw,
                    &mut self.keys,
                    self.start + MS * at_ms as u32,
                )
                .unwrap();
            state
        }
    }

    #[test]
    fn on_press_starts_once_per_edge() {
        let actions = vec![MacroAction::KeyPress {
            keys: KeyChord::from_key(Key::F1),
            duration: Duration::ZERO,
        }];
        let mut h = Harness::new(vec![definition(&[Button::A, Button::B], TriggerMode::OnPress, actions)]);

        h.step(pressed(&[Button::A]), 0);
        assert!(h.keys.events.is_empty());

        for t in 1..10 {
            h.step(pressed(&[Button::A, Button::B]), t);
        }
        assert_eq!(h.keys.events, vec![(true, Key::F1), (false, Key::F1)]);

        h.step(pressed(&[]), 10);
        h.step(pressed(&[Button::A, Button::B]), 11);
        assert_eq!(h.keys.events.len(), 4);
    }

    #[test]
    fn on_release_starts_on_falling_edge() {
        let actions = vec![MacroAction::AxisSet {
            axis: GamepadAxis::RightTrigger,
            value: 255,
        }];
        let mut h = Harness::new(vec![definition(&[Button::X], TriggerMode::OnRelease, actions)]);
        let out = h.step(pressed(&[Button::X]), 0);
        assert_eq!(out.right_trigger, 0);
        let out = h.step(pressed(&[]), 1);
        assert_eq!(out.right_trigger, 255);
        assert!(!h.engine.is_running(0));
        let out = h.step(pressed(&[]), 2);
        assert_eq!(out.right_trigger, 0);
    }

    #[test]
    fn button_press_holds_for_duration() {
        let actions = vec![
            MacroAction::ButtonPress {
                buttons: ButtonChord::new(&[Button::Y]),
                duration: MS * 5,
            },
            MacroAction::ButtonRelease {
                buttons: ButtonChord::new(&[Button::Y]),
            },
        ];
        let mut h = Harness::new(vec![definition(&[Button::Back], TriggerMode::OnPress, actions)]);

        let out = h.step(pressed(&[Button::Back]), 0);
        assert!(out.buttons.contains(Button::Y));
        let out = h.step(pressed(&[Button::Back]), 3);
        assert!(out.buttons.contains(Button::Y));
        // Duration elapsed: press step completes, release runs next cycle.
        let out = h.step(pressed(&[Button::Back]), 5);
        assert!(out.buttons.contains(Button::Y));
        let out = h.step(pressed(&[Button::Back]), 6);
        assert!(!out.buttons.contains(Button::Y));
        assert!(!h.engine.is_running(0));
    }

    #[test]
    fn multi_key_press_releases_in_reverse() {
        let chord: KeyChord = "ctrl+shift+s".parse().unwrap();
        let actions = vec![MacroAction::KeyPress {
            keys: chord,
            duration: MS * 2,
        }];
        let mut h = Harness::new(vec![definition(&[Button::Guide], TriggerMode::OnPress, actions)]);
        h.step(pressed(&[Button::Guide]), 0);
        assert_eq!(h.keys.events.len(), 3);
        h.step(pressed(&[Button::Guide]), 1);
        assert_eq!(h.keys.events.len(), 3);
        h.step(pressed(&[Button::Guide]), 2);
        assert_eq!(
            h.keys.events,
            vec![
                (true, Key::Control),
                (true, Key::Shift),
                (true, Key::Unicode('s')),
                (false, Key::Unicode('s')),
                (false, Key::Shift),
                (false, Key::Control),
            ]
        );
    }

    #[test]
    fn while_held_until_release_stops_on_falling_edge() {
        let mut rapid = definition(
            &[Button::RightShoulder],
            TriggerMode::WhileHeld,
            vec![
                MacroAction::ButtonPress {
                    buttons: ButtonChord::new(&[Button::A]),
                    duration: MS * 10,
                },
                MacroAction::ButtonRelease {
                    buttons: ButtonChord::new(&[Button::A]),
                },
            ],
        );
        rapid.repeat = RepeatPolicy::UntilRelease;
        let mut h = Harness::new(vec![rapid]);

        let out = h.step(pressed(&[Button::RightShoulder]), 0);
        assert!(out.buttons.contains(Button::A));
        let out = h.step(pressed(&[]), 1);
        assert!(!out.buttons.contains(Button::A));
        assert!(!h.engine.is_running(0));
    }

    #[test]
    fn fixed_count_repeats_with_delay() {
        let mut def = definition(
            &[Button::Start],
            TriggerMode::OnPress,
            vec![MacroAction::KeyPress {
                keys: KeyChord::from_key(Key::Space),
                duration: Duration::ZERO,
            }],
        );
        def.repeat = RepeatPolicy::Count(3);
        def.repeat_delay = MS * 10;
        let mut h = Harness::new(vec![def]);

        h.step(pressed(&[Button::Start]), 0);
        assert_eq!(h.keys.events.len(), 2);
        h.step(pressed(&[]), 5);
        assert_eq!(h.keys.events.len(), 2);
        h.step(pressed(&[]), 10);
        assert_eq!(h.keys.events.len(), 4);
        h.step(pressed(&[]), 20);
        assert_eq!(h.keys.events.len(), 6);
        assert!(!h.engine.is_running(0));
        h.step(pressed(&[]), 40);
        assert_eq!(h.keys.events.len(), 6);
    }

    #[test]
    fn consume_trigger_hides_trigger_buttons() {
        let mut def = definition(
            &[Button::LeftThumb],
            TriggerMode::OnPress,
            vec![MacroAction::Delay(MS * 50)],
        );
        def.consume_trigger = true;
        let mut h = Harness::new(vec![def]);
        let out = h.step(pressed(&[Button::LeftThumb, Button::B]), 0);
        assert!(!out.buttons.contains(Button::LeftThumb));
        assert!(out.buttons.contains(Button::B));
    }

    #[test]
    fn raw_trigger_reads_referenced_device() {
        let def = MacroDefinition {
            trigger: MacroTrigger::Raw {
                device: "stick".into(),
                buttons: smallvec![2, 70],
            },
            ..definition(
                &[],
                TriggerMode::OnPress,
                vec![MacroAction::AxisSet {
                    axis: GamepadAxis::LeftX,
                    value: -1000,
                }],
            )
        };
        let mut h = Harness::new(vec![def]);
        let mut raw = RawState::default();
        raw.set_button(2, true);
        h.raw.0.insert("stick".into(), raw);
        h.step(pressed(&[]), 0);
        assert!(!h.engine.is_running(0));

        raw.set_button(70, true);
        h.raw.0.insert("stick".into(), raw);
        let out = h.step(pressed(&[]), 1);
        // AxisSet completes immediately and the single pass ends.
        assert_eq!(out.thumb_lx, -1000);
        assert!(!h.engine.is_running(0));
    }

    #[test]
    fn key_failure_is_reported_and_macro_stopped() {
        let actions = vec![MacroAction::KeyPress {
            keys: KeyChord::from_key(Key::F5),
            duration: MS,
        }];
        let mut h = Harness::new(vec![definition(&[Button::A], TriggerMode::OnPress, actions)]);
        h.keys.fail = true;
        let mut state = pressed(&[Button::A]);
        let result = h
            .engine
            .evaluate(0, &h.macros, &mut state, &h.raw, &mut h.keys, h.start);
        assert!(matches!(result, Err(MacroError::Keys { .. })));
        assert!(!h.engine.is_running(0));
        assert_eq!(state, pressed(&[Button::A]));
    }

    #[test]
    fn new_macro_list_resets_runtimes() {
        let actions = vec![MacroAction::Delay(MS * 100)];
        let mut h = Harness::new(vec![definition(&[Button::A], TriggerMode::OnPress, actions.clone())]);
        h.step(pressed(&[Button::A]), 0);
        assert!(h.engine.is_running(0));

        h.macros = vec![definition(&[Button::A], TriggerMode::OnPress, actions)].into();
        h.step(pressed(&[Button::A]), 1);
        // Fresh runtime sees the held chord as a new rising edge.
        assert!(h.engine.is_running(0));
        h.engine.reset_slot(0, &mut h.keys);
        assert!(!h.engine.is_running(0));
    }
}
