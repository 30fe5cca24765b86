use padmux_gamepad::LogicalGamepad;
use padmux_workspace::{ControllerKind, MAX_SLOTS};

use super::{VirtualBackend, VirtualError, VirtualPad};
use crate::ffb::FeedbackRouter;
use crate::registry::VirtualCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Cycles a pad survives with all of its devices offline.
    pub grace_cycles: u32,
    /// Cycles to wait after a failed creation.
    pub cooldown_cycles: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grace_cycles: 5000,
            cooldown_cycles: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotPhase {
    #[default]
    Absent,
    /// Creation failed; retried once `remaining` reaches zero.
    Cooldown { remaining: u32 },
    Live,
    /// Live, but every assigned device has been offline for `inactive` cycles.
    Grace { inactive: u32 },
}

/// What configuration and the registry ask of one slot this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotDemand {
    /// Created and enabled in settings.
    pub enabled: bool,
    /// At least one device is assigned.
    pub assigned: bool,
    /// At least one assigned device is online.
    pub online: bool,
    pub kind: ControllerKind,
}

impl SlotDemand {
    pub fn is_active(&self) -> bool {
        self.enabled && self.assigned && self.online
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    Disabled,
    Unassigned,
    GraceExpired,
    KindChanged,
    Shutdown,
}

impl std::fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DestroyReason::Disabled => "slot disabled",
            DestroyReason::Unassigned => "no devices assigned",
            DestroyReason::GraceExpired => "devices stayed offline",
            DestroyReason::KindChanged => "controller kind changed",
            DestroyReason::Shutdown => "shutting down",
        })
    }
}

#[derive(Debug)]
pub enum LifecycleEvent {
    Created {
        slot: usize,
        kind: ControllerKind,
    },
    Destroyed {
        slot: usize,
        kind: ControllerKind,
        reason: DestroyReason,
    },
    CreateFailed {
        slot: usize,
        error: VirtualError,
    },
    /// Creation of `kind` is disabled for the rest of the session.
    BackendUnavailable {
        kind: ControllerKind,
        error: VirtualError,
    },
    DisconnectFailed {
        slot: usize,
        error: VirtualError,
    },
}

#[derive(Default)]
struct Slot {
    phase: SlotPhase,
    pad: Option<Box<dyn VirtualPad>>,
    /// Kind whose creation failed, for resetting the cooldown on a change.
    failed_kind: ControllerKind,
}

/// Creates, keeps and destroys one virtual controller per slot.
pub struct LifecycleManager<V> {
    backend: V,
    slots: [Slot; MAX_SLOTS],
    counts: VirtualCounts,
    unavailable: [bool; ControllerKind::ALL.len()],
    config: LifecycleConfig,
}

impl<V: VirtualBackend> LifecycleManager<V> {
    pub fn new(backend: V, config: LifecycleConfig) -> Self {
        Self {
            backend,
            slots: Default::default(),
            counts: VirtualCounts::default(),
            unavailable: [false; ControllerKind::ALL.len()],
            config,
        }
    }

    /// Live virtual controllers per kind, for the self filter.
    pub fn counts(&self) -> &VirtualCounts {
        &self.counts
    }

    pub fn phase(&self, slot: usize) -> SlotPhase {
        self.slots.get(slot).map(|s| s.phase).unwrap_or_default()
    }

    pub fn is_live(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| s.pad.is_some())
    }

    pub fn is_unavailable(&self, kind: ControllerKind) -> bool {
        self.unavailable[kind.index()]
    }

    /// Advance every slot's state machine by one cycle, in slot order.
    pub fn update(
        &mut self,
        demands: &[SlotDemand; MAX_SLOTS],
        router: &mut FeedbackRouter,
        events: &mut Vec<LifecycleEvent>,
    ) {
        for (index, demand) in demands.iter().enumerate() {
            self.update_slot(index, demand, router, events);
        }
    }

    fn update_slot(
        &mut self,
        index: usize,
        demand: &SlotDemand,
        router: &mut FeedbackRouter,
        events: &mut Vec<LifecycleEvent>,
    ) {
        if let Some(kind) = self.slots[index].pad.as_ref().map(|p| p.kind()) {
            if !demand.enabled {
                self.destroy(index, DestroyReason::Disabled, router, events);
                return;
            }
            if !demand.assigned {
                self.destroy(index, DestroyReason::Unassigned, router, events);
                return;
            }
            if demand.kind != kind {
                self.destroy(index, DestroyReason::KindChanged, router, events);
            } else if !demand.online {
                let inactive = match self.slots[index].phase {
                    SlotPhase::Grace { inactive } => inactive + 1,
                    _ => 1,
                };
                if inactive >= self.config.grace_cycles {
                    self.destroy(index, DestroyReason::GraceExpired, router, events);
                } else {
                    self.slots[index].phase = SlotPhase::Grace { inactive };
                }
                return;
            } else {
                self.slots[index].phase = SlotPhase::Live;
                return;
            }
        }

        let slot = &mut self.slots[index];
        if let SlotPhase::Cooldown { remaining } = slot.phase {
            if demand.kind == slot.failed_kind && remaining > 1 {
                slot.phase = SlotPhase::Cooldown {
                    remaining: remaining - 1,
                };
                return;
            }
            slot.phase = SlotPhase::Absent;
        }

        if demand.is_active() && !self.unavailable[demand.kind.index()] {
            self.create(index, demand.kind, router, events);
        }
    }

    fn create(
        &mut self,
        index: usize,
        kind: ControllerKind,
        router: &mut FeedbackRouter,
        events: &mut Vec<LifecycleEvent>,
    ) {
        // Counted before the device can show up in enumeration.
        self.counts.increment(kind);
        let result = self.backend.create(kind).and_then(|mut pad| {
            pad.register_feedback(router.sink(index))?;
            pad.connect()?;
            Ok(pad)
        });

        let slot = &mut self.slots[index];
        match result {
            Ok(pad) => {
                slot.pad = Some(pad);
                slot.phase = SlotPhase::Live;
                events.push(LifecycleEvent::Created { slot: index, kind });
            }
            Err(error @ VirtualError::Unavailable { .. }) => {
                router.clear_slot(index);
                self.counts.decrement(kind);
                self.unavailable[kind.index()] = true;
                slot.phase = SlotPhase::Absent;
                events.push(LifecycleEvent::BackendUnavailable { kind, error });
            }
            Err(error) => {
                router.clear_slot(index);
                self.counts.decrement(kind);
                slot.phase = SlotPhase::Cooldown {
                    remaining: self.config.cooldown_cycles,
                };
                slot.failed_kind = kind;
                events.push(LifecycleEvent::CreateFailed { slot: index, error });
            }
        }
    }

    /// Tear down a slot's pad. The live count drops even if disconnect fails.
    fn destroy(
        &mut self,
        index: usize,
        reason: DestroyReason,
        router: &mut FeedbackRouter,
        events: &mut Vec<LifecycleEvent>,
    ) {
        let slot = &mut self.slots[index];
        slot.phase = SlotPhase::Absent;
        let Some(mut pad) = slot.pad.take() else {
            return;
        };
        let kind = pad.kind();
        if let Err(error) = pad.disconnect() {
            events.push(LifecycleEvent::DisconnectFailed { slot: index, error });
        }
        drop(pad);
        self.counts.decrement(kind);
        router.clear_slot(index);
        events.push(LifecycleEvent::Destroyed {
            slot: index,
            kind,
            reason,
        });
    }

    /// Hand `state` to the slot's pad. `Ok(false)` when no pad is live.
    pub fn submit(&mut self, slot: usize, state: &LogicalGamepad) -> Result<bool, VirtualError> {
        match self.slots.get_mut(slot).and_then(|s| s.pad.as_mut()) {
            Some(pad) => pad.submit(state).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn shutdown(&mut self, router: &mut FeedbackRouter, events: &mut Vec<LifecycleEvent>) {
        for index in 0..MAX_SLOTS {
            self.destroy(index, DestroyReason::Shutdown, router, events);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::ffb::FeedbackSink;

    #[derive(Default)]
    struct Log {
        created: usize,
        connected: usize,
        disconnected: usize,
        submitted: usize,
        fail_create: bool,
        unavailable: bool,
        fail_disconnect: bool,
    }

    struct FakePad {
        kind: ControllerKind,
        log: Rc<RefCell<Log>>,
    }

    impl VirtualPad for FakePad {
        fn kind(&self) -> ControllerKind {
            self.kind
        }

        fn register_feedback(&mut self, _sink: FeedbackSink) -> Result<(), VirtualError> {
            Ok(())
        }

        fn connect(&mut self) -> Result<(), VirtualError> {
            self.log.borrow_mut().connected += 1;
            Ok(())
        }

        fn submit(&mut self, _state: &LogicalGamepad) -> Result<(), VirtualError> {
            self.log.borrow_mut().submitted += 1;
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), VirtualError> {
            let mut log = self.log.borrow_mut();
            log.disconnected += 1;
            if log.fail_disconnect {
                return Err(VirtualError::Io("gone".into()));
            }
            Ok(())
        }
    }

    struct FakeBackend(Rc<RefCell<Log>>);

    impl VirtualBackend for FakeBackend {
        fn create(&mut self, kind: ControllerKind) -> Result<Box<dyn VirtualPad>, VirtualError> {
            let mut log = self.0.borrow_mut();
            if log.unavailable {
                return Err(VirtualError::Unavailable {
                    kind,
                    reason: "no driver".into(),
                });
            }
            if log.fail_create {
                return Err(VirtualError::Create {
                    kind,
                    reason: "busy".into(),
                });
            }
            log.created += 1;
            Ok(Box::new(FakePad {
                kind,
                log: Rc::clone(&self.0),
            }))
        }
    }

    struct Harness {
        manager: LifecycleManager<FakeBackend>,
        router: FeedbackRouter,
        log: Rc<RefCell<Log>>,
        events: Vec<LifecycleEvent>,
    }

    impl Harness {
        fn new(grace_cycles: u32, cooldown_cycles: u32) -> Self {
            let log = Rc::new(RefCell::new(Log::default()));
            Self {
                manager: LifecycleManager::new(
                    FakeBackend(Rc::clone(&log)),
                    LifecycleConfig {
                        grace_cycles,
                        cooldown_cycles,
                    },
                ),
                router: FeedbackRouter::new(),
                log,
                events: Vec::new(),
            }
        }

        fn cycle(&mut self, slot0: SlotDemand) {
            let mut demands = [SlotDemand::default(); MAX_SLOTS];
            demands[0] = slot0;
            self.manager.update(&demands, &mut self.router, &mut self.events);
            self.manager
                .submit(0, &LogicalGamepad::NEUTRAL)
                .unwrap();
        }
    }

    fn active(kind: ControllerKind) -> SlotDemand {
        SlotDemand {
            enabled: true,
            assigned: true,
            online: true,
            kind,
        }
    }

    fn offline(kind: ControllerKind) -> SlotDemand {
        SlotDemand {
            online: false,
            ..active(kind)
        }
    }

    const XBOX: ControllerKind = ControllerKind::Xbox360;

    #[test]
    fn creates_when_active_and_counts_it() {
        let mut h = Harness::new(10, 10);
        h.cycle(SlotDemand::default());
        assert!(!h.manager.is_live(0));

        h.cycle(active(XBOX));
        assert!(h.manager.is_live(0));
        assert_eq!(h.manager.counts().get(XBOX), 1);
        assert_eq!(h.log.borrow().connected, 1);
        assert_eq!(h.log.borrow().submitted, 1);
    }

    #[test]
    fn grace_keeps_pad_then_destroys() {
        let threshold = 5;
        let mut h = Harness::new(threshold, 10);
        h.cycle(active(XBOX));
        let before = h.log.borrow().submitted;

        for n in 1..threshold {
            h.cycle(offline(XBOX));
            assert!(h.manager.is_live(0), "destroyed after {n} offline cycles");
            assert_eq!(h.manager.phase(0), SlotPhase::Grace { inactive: n });
        }
        assert_eq!(h.log.borrow().submitted - before, threshold as usize - 1);

        h.cycle(offline(XBOX));
        assert!(!h.manager.is_live(0));
        assert_eq!(h.manager.counts().get(XBOX), 0);
    }

    #[test]
    fn device_back_during_grace_resets_inactivity() {
        let mut h = Harness::new(3, 10);
        h.cycle(active(XBOX));
        h.cycle(offline(XBOX));
        h.cycle(offline(XBOX));
        h.cycle(active(XBOX));
        assert_eq!(h.manager.phase(0), SlotPhase::Live);
        h.cycle(offline(XBOX));
        h.cycle(offline(XBOX));
        assert!(h.manager.is_live(0));
        assert_eq!(h.log.borrow().created, 1);
    }

    #[test]
    fn unassign_and_disable_destroy_immediately() {
        let mut h = Harness::new(1000, 10);
        h.cycle(active(XBOX));
        h.router.sink(0).motors(5, 5);
        h.router.drain();
        h.cycle(SlotDemand {
            assigned: false,
            ..active(XBOX)
        });
        assert!(!h.manager.is_live(0));
        assert_eq!(h.router.vibration(0), (0, 0));

        h.cycle(active(XBOX));
        h.cycle(SlotDemand {
            enabled: false,
            ..active(XBOX)
        });
        assert!(!h.manager.is_live(0));
        assert_eq!(h.log.borrow().disconnected, 2);
    }

    #[test]
    fn kind_change_recreates_in_the_same_cycle() {
        let mut h = Harness::new(1000, 10);
        h.cycle(active(XBOX));
        h.cycle(active(ControllerKind::DualShock4));
        assert!(h.manager.is_live(0));
        assert_eq!(h.log.borrow().created, 2);
        assert_eq!(h.manager.counts().get(XBOX), 0);
        assert_eq!(h.manager.counts().get(ControllerKind::DualShock4), 1);
    }

    #[test]
    fn failed_creation_waits_for_cooldown() {
        let mut h = Harness::new(1000, 3);
        h.log.borrow_mut().fail_create = true;
        h.cycle(active(XBOX));
        assert!(matches!(h.events.last(), Some(LifecycleEvent::CreateFailed { .. })));
        assert_eq!(h.manager.counts().get(XBOX), 0);

        h.log.borrow_mut().fail_create = false;
        h.cycle(active(XBOX));
        h.cycle(active(XBOX));
        assert!(!h.manager.is_live(0));
        h.cycle(active(XBOX));
        assert!(h.manager.is_live(0));
    }

    #[test]
    fn kind_change_resets_cooldown() {
        let mut h = Harness::new(1000, 100);
        h.log.borrow_mut().fail_create = true;
        h.cycle(active(XBOX));
        h.log.borrow_mut().fail_create = false;
        h.cycle(active(ControllerKind::Generic));
        assert!(h.manager.is_live(0));
    }

    #[test]
    fn unavailable_backend_is_reported_once() {
        let mut h = Harness::new(1000, 1);
        h.log.borrow_mut().unavailable = true;
        for _ in 0..10 {
            h.cycle(active(XBOX));
        }
        let reports = h
            .events
            .iter()
            .filter(|e| matches!(e, LifecycleEvent::BackendUnavailable { .. }))
            .count();
        assert_eq!(reports, 1);
        assert!(h.manager.is_unavailable(XBOX));
        assert_eq!(h.manager.counts().get(XBOX), 0);
    }

    #[test]
    fn failed_disconnect_still_decrements() {
        let mut h = Harness::new(1000, 1);
        h.log.borrow_mut().fail_disconnect = true;
        h.cycle(active(XBOX));
        h.manager.shutdown(&mut h.router, &mut h.events);
        assert_eq!(h.manager.counts().total(), 0);
        assert!(h
            .events
            .iter()
            .any(|e| matches!(e, LifecycleEvent::DisconnectFailed { .. })));
    }
}
