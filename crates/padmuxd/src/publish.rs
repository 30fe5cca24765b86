use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use padmux_gamepad::{LogicalGamepad, ProductKey, RawState};
use padmux_workspace::{Settings, MAX_SLOTS};

/// Whole-value handoff cell. Readers get the previous or the next value,
/// never a mix of both.
#[derive(Debug, Default)]
pub struct Snapshot<T> {
    value: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(Arc::new(value)),
        }
    }

    pub fn store(&self, value: T) {
        self.store_arc(Arc::new(value));
    }

    pub fn store_arc(&self, value: Arc<T>) {
        match self.value.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    pub fn load(&self) -> Arc<T> {
        match self.value.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

/// Physical device as shown to the surrounding application.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub id: Box<str>,
    pub name: Box<str>,
    pub product: ProductKey,
    pub online: bool,
    pub rumble: bool,
    pub state: Arc<Snapshot<RawState>>,
}

/// State the worker publishes for readers on other threads.
pub struct Shared {
    pub settings: Snapshot<Settings>,
    combined: [Snapshot<LogicalGamepad>; MAX_SLOTS],
    submitted: [Snapshot<Option<LogicalGamepad>>; MAX_SLOTS],
    devices: Mutex<Vec<DeviceSummary>>,
    frequency: AtomicU64,
}

impl Shared {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Snapshot::new(settings),
            combined: std::array::from_fn(|_| Snapshot::default()),
            submitted: std::array::from_fn(|_| Snapshot::default()),
            devices: Mutex::new(Vec::new()),
            frequency: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Combined gamepad of a slot, neutral for unknown slots.
    pub fn combined(&self, slot: usize) -> LogicalGamepad {
        self.combined
            .get(slot)
            .map(|s| *s.load())
            .unwrap_or_default()
    }

    /// Last state handed to the slot's virtual controller, if one is live.
    pub fn submitted(&self, slot: usize) -> Option<LogicalGamepad> {
        self.submitted.get(slot).and_then(|s| *s.load())
    }

    pub fn devices(&self) -> Vec<DeviceSummary> {
        match self.devices.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Measured cycle rate in Hz.
    pub fn frequency(&self) -> f64 {
        f64::from_bits(self.frequency.load(Ordering::Relaxed))
    }

    pub(crate) fn publish_slot(
        &self,
        slot: usize,
        combined: LogicalGamepad,
        submitted: Option<LogicalGamepad>,
    ) {
        if let Some(cell) = self.combined.get(slot) {
            cell.store(combined);
        }
        if let Some(cell) = self.submitted.get(slot) {
            cell.store(submitted);
        }
    }

    pub(crate) fn publish_devices(&self, devices: Vec<DeviceSummary>) {
        match self.devices.lock() {
            Ok(mut guard) => *guard = devices,
            Err(poisoned) => *poisoned.into_inner() = devices,
        }
    }

    pub(crate) fn publish_frequency(&self, hz: f64) {
        self.frequency.store(hz.to_bits(), Ordering::Relaxed);
    }
}
