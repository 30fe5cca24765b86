use std::time::{Duration, Instant};

use ahash::AHashSet;
use padmux_control::KeySink;
use padmux_gamepad::{DeviceBackend, LogicalGamepad, RawState};
use padmux_workspace::{ControllerKind, Settings, SlotAssignment, MAX_SLOTS};

use super::{EngineCommand, EngineConfig, EngineEvent};
use crate::combine::combine_slot;
use crate::ffb::{FeedbackRouter, TestRumble};
use crate::macro_engine::MacroEngine;
use crate::mapping::map_device;
use crate::publish::Shared;
use crate::registry::{Device, Registry};
use crate::virtual_pad::{LifecycleEvent, LifecycleManager, SlotDemand, VirtualBackend};
use crate::{print_debug, print_error, print_info, print_warning};

/// Message of the last failure reported for a slot, so a failure repeating
/// every cycle is reported once.
#[derive(Debug, Default)]
struct Reported(Option<String>);

impl Reported {
    fn fail(&mut self, message: String) -> Option<String> {
        if self.0.as_deref() == Some(message.as_str()) {
            return None;
        }
        self.0 = Some(message.clone());
        Some(message)
    }

    fn clear(&mut self) {
        self.0 = None;
    }
}

/// Every stage of one cycle, owned by the worker thread.
pub struct Pipeline<B: DeviceBackend, V, K> {
    devices: B,
    registry: Registry<B::Handle>,
    lifecycle: LifecycleManager<V>,
    router: FeedbackRouter,
    macros: MacroEngine,
    keys: K,
    refresh_interval: Duration,
    last_refresh: Option<Instant>,
    force_refresh: bool,
    mapping_errors: [Reported; MAX_SLOTS],
    macro_errors: [Reported; MAX_SLOTS],
    submit_errors: [Reported; MAX_SLOTS],
    /// Product fallbacks already announced, as `(configured id, device id)`.
    substitutes: AHashSet<(Box<str>, Box<str>)>,
    mapped: Vec<LogicalGamepad>,
    lifecycle_events: Vec<LifecycleEvent>,
    events: Vec<EngineEvent>,
}

impl<B, V, K> Pipeline<B, V, K>
where
    B: DeviceBackend,
    V: VirtualBackend,
    K: KeySink,
{
    pub fn new(devices: B, virtuals: V, keys: K, config: &EngineConfig) -> Self {
        Self {
            devices,
            registry: Registry::new(),
            lifecycle: LifecycleManager::new(virtuals, config.lifecycle()),
            router: FeedbackRouter::new(),
            macros: MacroEngine::new(),
            keys,
            refresh_interval: config.refresh_interval,
            last_refresh: None,
            force_refresh: false,
            mapping_errors: Default::default(),
            macro_errors: Default::default(),
            submit_errors: Default::default(),
            substitutes: AHashSet::new(),
            mapped: Vec::with_capacity(4),
            lifecycle_events: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Registry<B::Handle> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &LifecycleManager<V> {
        &self.lifecycle
    }

    pub fn router(&self) -> &FeedbackRouter {
        &self.router
    }

    pub fn macros(&self) -> &MacroEngine {
        &self.macros
    }

    /// Events raised since the last call.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::TestRumble {
                slot,
                device,
                left,
                right,
            } => self.router.set_test(slot, TestRumble { device, left, right }),
            EngineCommand::StopTestRumble { slot } => self.router.clear_test(slot),
            EngineCommand::RefreshDevices => self.force_refresh = true,
        }
    }

    /// Run one full cycle and publish its results.
    pub fn run_cycle(&mut self, now: Instant, settings: &Settings, shared: &Shared) {
        self.devices.sync();
        for (slot, e) in self.router.drain() {
            print_debug!("slot {slot}: dropped feedback packet: {e}");
        }

        let due = self.force_refresh
            || self
                .last_refresh
                .map_or(true, |at| now.saturating_duration_since(at) >= self.refresh_interval);
        if due {
            self.refresh_devices(now, shared);
        }
        self.refresh_states(now, settings, shared);

        let mut demands = [SlotDemand::default(); MAX_SLOTS];
        let mut combined = [LogicalGamepad::NEUTRAL; MAX_SLOTS];
        for slot in 0..MAX_SLOTS {
            let (state, demand) = self.evaluate_slot(slot, now, settings);
            combined[slot] = state;
            demands[slot] = demand;
        }

        self.lifecycle
            .update(&demands, &mut self.router, &mut self.lifecycle_events);
        for event in self.lifecycle_events.drain(..) {
            report_lifecycle(event, &mut self.events);
        }

        for (slot, state) in combined.iter().enumerate() {
            let submitted = match self.lifecycle.submit(slot, state) {
                Ok(true) => {
                    self.submit_errors[slot].clear();
                    Some(*state)
                }
                Ok(false) => None,
                Err(e) => {
                    if let Some(message) = self.submit_errors[slot].fail(e.to_string()) {
                        print_warning!("slot {slot}: submit failed: {message}");
                        self.events.push(EngineEvent::warning(
                            format!("slot {slot}: failed to submit state"),
                            Some(message),
                        ));
                    }
                    None
                }
            };
            shared.publish_slot(slot, *state, submitted);
        }
    }

    fn refresh_devices(&mut self, now: Instant, shared: &Shared) {
        self.force_refresh = false;
        self.last_refresh = Some(now);

        let report = match self
            .registry
            .refresh_devices(&mut self.devices, self.lifecycle.counts())
        {
            Ok(report) => report,
            Err(e) => {
                print_error!("device enumeration failed: {e}");
                self.events.push(EngineEvent::error(
                    "device enumeration failed",
                    Some(e.to_string()),
                ));
                return;
            }
        };

        for id in &report.went_offline {
            self.router.forget(id);
            print_info!("device disconnected: {id}");
        }
        for id in &report.opened {
            print_info!("device connected: {id}");
        }
        for (id, reason) in &report.filtered {
            print_debug!("ignoring {id}: {reason}");
        }
        for e in &report.failures {
            print_warning!("{e}");
            self.events
                .push(EngineEvent::warning("failed to open device", Some(e.to_string())));
        }
        for (from, to) in report.migrated {
            print_info!("device {from} reconnected as {to}");
            self.events.push(EngineEvent::DeviceMigrated { from, to });
        }
        if report.changed {
            shared.publish_devices(self.registry.summaries());
            self.events.push(EngineEvent::DevicesChanged);
        }
    }

    fn refresh_states(&mut self, now: Instant, settings: &Settings, shared: &Shared) {
        let router = &mut self.router;
        let mut failures = Vec::new();
        let gone = self.registry.refresh_states(&mut self.devices, |backend, device| {
            if let Err(e) = router.apply(backend, device, settings, now) {
                failures.push(e);
            }
        });

        for e in failures {
            print_warning!("{e}");
        }
        if gone.is_empty() {
            return;
        }
        for id in &gone {
            self.router.forget(id);
            print_info!("device went offline: {id}");
        }
        shared.publish_devices(self.registry.summaries());
        self.events.push(EngineEvent::DevicesChanged);
    }

    /// Map, combine and run macros for one slot.
    fn evaluate_slot(
        &mut self,
        slot: usize,
        now: Instant,
        settings: &Settings,
    ) -> (LogicalGamepad, SlotDemand) {
        let slot_settings = settings.slot(slot);
        let mut demand = SlotDemand {
            enabled: slot_settings.is_some_and(|s| s.is_on()),
            assigned: false,
            online: false,
            kind: slot_settings.map_or(ControllerKind::default(), |s| s.kind),
        };

        self.mapped.clear();
        let mut failure = None;
        for assignment in settings.assignments_for_slot(slot) {
            demand.assigned = true;
            let Some(raw) = self.assigned_state(assignment, settings) else {
                continue;
            };
            demand.online = true;
            match map_device(raw, &assignment.profile) {
                Ok(state) => self.mapped.push(state),
                Err(e) => {
                    failure = Some(format!("{}: {e}", assignment.device));
                    break;
                }
            }
        }

        if let Some(message) = failure {
            if let Some(message) = self.mapping_errors[slot].fail(message) {
                print_error!("slot {slot}: mapping failed: {message}");
                self.events.push(EngineEvent::error(
                    format!("slot {slot}: mapping failed"),
                    Some(message),
                ));
            }
            return (LogicalGamepad::NEUTRAL, demand);
        }
        self.mapping_errors[slot].clear();
        let mut state = combine_slot(&self.mapped);

        match slot_settings.filter(|s| s.is_on()) {
            Some(slot_settings) => {
                let result = self.macros.evaluate(
                    slot,
                    &slot_settings.macros,
                    &mut state,
                    &self.registry,
                    &mut self.keys,
                    now,
                );
                match result {
                    Ok(()) => self.macro_errors[slot].clear(),
                    Err(e) => {
                        if let Some(message) = self.macro_errors[slot].fail(e.to_string()) {
                            print_error!("slot {slot}: {message}");
                            self.events.push(EngineEvent::error(
                                format!("slot {slot}: macro failed"),
                                Some(message),
                            ));
                        }
                    }
                }
            }
            None => self.macros.reset_slot(slot, &mut self.keys),
        }
        (state, demand)
    }

    /// Latest snapshot of the device an assignment names.
    ///
    /// An assignment whose device was never seen falls back to an online
    /// device of the same product that no assignment names.
    fn assigned_state(
        &mut self,
        assignment: &SlotAssignment,
        settings: &Settings,
    ) -> Option<&RawState> {
        if self.registry.device(&assignment.device).is_some() {
            return self.registry.raw_state(&assignment.device);
        }
        let product = assignment.product.filter(|p| !p.is_zero())?;
        let device = self.registry.iter().find(|d| {
            d.is_online()
                && d.product() == product
                && !settings
                    .assignments
                    .iter()
                    .any(|other| d.answers_to(&other.device))
        })?;
        let pair = (assignment.device.clone(), Box::<str>::from(device.id()));
        if self.substitutes.insert(pair.clone()) {
            print_info!("device {} stands in for {}", pair.1, pair.0);
            self.events.push(EngineEvent::DeviceMigrated {
                from: pair.0,
                to: pair.1,
            });
        }
        device.current()
    }

    /// Release keys, stop feedback, destroy every virtual controller and
    /// close every device.
    pub fn shutdown(&mut self) {
        self.macros.reset_all(&mut self.keys);
        for slot in 0..MAX_SLOTS {
            self.router.clear_test(slot);
        }
        self.lifecycle
            .shutdown(&mut self.router, &mut self.lifecycle_events);
        for event in self.lifecycle_events.drain(..) {
            report_lifecycle(event, &mut self.events);
        }
        self.registry.shutdown(&mut self.devices);
    }
}

impl<B: DeviceBackend, V, K> Pipeline<B, V, K> {
    /// Tracked device by the id settings use for it.
    pub fn device(&self, id: &str) -> Option<&Device<B::Handle>> {
        self.registry.device(id)
    }
}

fn report_lifecycle(event: LifecycleEvent, events: &mut Vec<EngineEvent>) {
    match event {
        LifecycleEvent::Created { slot, kind } => {
            print_info!("slot {slot}: {kind} controller connected");
        }
        LifecycleEvent::Destroyed { slot, kind, reason } => {
            print_info!("slot {slot}: {kind} controller removed, {reason}");
        }
        LifecycleEvent::CreateFailed { slot, error } => {
            print_warning!("slot {slot}: {error}");
            events.push(EngineEvent::warning(
                format!("slot {slot}: failed to create virtual controller"),
                Some(error.to_string()),
            ));
        }
        LifecycleEvent::BackendUnavailable { kind, error } => {
            print_error!("{error}");
            events.push(EngineEvent::error(
                format!("{kind} controllers are disabled for this session"),
                Some(error.to_string()),
            ));
        }
        LifecycleEvent::DisconnectFailed { slot, error } => {
            print_warning!("slot {slot}: {error}");
            events.push(EngineEvent::warning(
                format!("slot {slot}: failed to disconnect virtual controller"),
                Some(error.to_string()),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_failure_is_reported_once() {
        let mut reported = Reported::default();
        assert_eq!(reported.fail("boom".into()).as_deref(), Some("boom"));
        assert_eq!(reported.fail("boom".into()), None);
        assert_eq!(reported.fail("other".into()).as_deref(), Some("other"));
        reported.clear();
        assert!(reported.fail("other".into()).is_some());
    }
}
