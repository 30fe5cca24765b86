mod filter;

use std::sync::Arc;

use ahash::AHashSet;
use padmux_gamepad::{
    DeviceBackend, DeviceInfo, FeedbackCaps, ProductKey, RawDelta, RawState,
};
use smallvec::SmallVec;

use crate::publish::{DeviceSummary, Snapshot};

pub use filter::{FilterReason, SelfFilter, VirtualCounts};

/// A tracked physical device.
pub struct Device<H> {
    id: Box<str>,
    /// Instance ids this device answered to before a fallback migration.
    aliases: SmallVec<[Box<str>; 1]>,
    info: DeviceInfo,
    online: bool,
    handle: Option<H>,
    caps: FeedbackCaps,
    current: Option<RawState>,
    previous: Option<RawState>,
    deltas: Vec<RawDelta>,
    published: Arc<Snapshot<RawState>>,
}

impl<H> Device<H> {
    fn new(info: DeviceInfo) -> Self {
        Self {
            id: info.instance_id.clone(),
            aliases: SmallVec::new(),
            info,
            online: false,
            handle: None,
            caps: FeedbackCaps::default(),
            current: None,
            previous: None,
            deltas: Vec::new(),
            published: Arc::new(Snapshot::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn product(&self) -> ProductKey {
        self.info.product
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn caps(&self) -> FeedbackCaps {
        self.caps
    }

    /// Latest snapshot, `None` while offline or before the first read.
    pub fn current(&self) -> Option<&RawState> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&RawState> {
        self.previous.as_ref()
    }

    /// Controls changed by the last read.
    pub fn deltas(&self) -> &[RawDelta] {
        &self.deltas
    }

    /// Whether settings naming `id` refer to this device.
    pub fn answers_to(&self, id: &str) -> bool {
        &*self.id == id || self.aliases.iter().any(|alias| &**alias == id)
    }

    pub(crate) fn handle_mut(&mut self) -> Option<&mut H> {
        self.handle.as_mut()
    }

    fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id.clone(),
            name: self.info.name.clone(),
            product: self.info.product,
            online: self.online,
            rumble: self.caps.any(),
            state: Arc::clone(&self.published),
        }
    }

    /// Becomes online holding `handle`. Only reachable from the open path.
    fn attach(&mut self, info: DeviceInfo, handle: H, caps: FeedbackCaps) {
        debug_assert!(self.handle.is_none());
        self.info = info;
        self.handle = Some(handle);
        self.caps = caps;
        self.online = true;
        self.current = None;
        self.previous = None;
        self.deltas.clear();
    }

    /// Stop rumble and close the handle. Safe to call more than once.
    fn detach<B: DeviceBackend<Handle = H>>(&mut self, backend: &mut B) {
        if let Some(mut handle) = self.handle.take() {
            if self.caps.any() {
                let _ = backend.set_rumble(&mut handle, 0, 0);
            }
            backend.close(handle);
        }
        self.online = false;
        self.current = None;
        self.deltas.clear();
    }
}

/// Outcome of one enumeration pass.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// The tracked set or any online flag changed.
    pub changed: bool,
    /// `(old id, new id)` pairs resolved through the product fallback.
    pub migrated: Vec<(Box<str>, Box<str>)>,
    pub went_offline: Vec<Box<str>>,
    pub opened: Vec<Box<str>>,
    /// Devices rejected by the self filter that were not rejected last pass.
    pub filtered: Vec<(Box<str>, FilterReason)>,
    pub failures: Vec<padmux_gamepad::Error>,
}

/// Set of known physical devices and their online lifecycle.
pub struct Registry<H> {
    devices: Vec<Device<H>>,
    filtered: AHashSet<Box<str>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            filtered: AHashSet::new(),
        }
    }
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device<H>> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device that settings refer to as `id`.
    pub fn device(&self, id: &str) -> Option<&Device<H>> {
        self.devices.iter().find(|d| d.answers_to(id))
    }

    pub(crate) fn device_mut(&mut self, id: &str) -> Option<&mut Device<H>> {
        self.devices.iter_mut().find(|d| d.answers_to(id))
    }

    /// Latest snapshot of an online device.
    pub fn raw_state(&self, id: &str) -> Option<&RawState> {
        self.device(id)
            .filter(|d| d.online)
            .and_then(Device::current)
    }

    pub fn summaries(&self) -> Vec<DeviceSummary> {
        self.devices.iter().map(Device::summary).collect()
    }

    /// Enumerate the backend, open new devices and retire vanished ones.
    pub fn refresh_devices<B>(
        &mut self,
        backend: &mut B,
        counts: &VirtualCounts,
    ) -> Result<RefreshReport, padmux_gamepad::Error>
    where
        B: DeviceBackend<Handle = H>,
    {
        let infos = backend.enumerate()?;
        let mut report = RefreshReport::default();

        let present: AHashSet<&str> = infos.iter().map(|i| &*i.instance_id).collect();
        for device in self.devices.iter_mut().filter(|d| d.online) {
            if !present.contains(&*device.id) {
                device.detach(backend);
                report.went_offline.push(device.id.clone());
                report.changed = true;
            }
        }

        let mut filter = SelfFilter::new(counts);
        let mut filtered = AHashSet::new();
        for info in infos.iter() {
            if self
                .devices
                .iter()
                .any(|d| d.online && *d.id == *info.instance_id)
            {
                continue;
            }
            if let Some(reason) = filter.check(info) {
                if !self.filtered.contains(&info.instance_id) {
                    report.filtered.push((info.instance_id.clone(), reason));
                }
                filtered.insert(info.instance_id.clone());
                continue;
            }

            let handle = match backend.open(info) {
                Ok(handle) => handle,
                Err(e) => {
                    report.failures.push(e);
                    continue;
                }
            };
            let caps = backend.capabilities(&handle);

            let index = match self.resolve(info, &present) {
                Resolved::Exact(index) => index,
                Resolved::Fallback(index) => {
                    let device = &mut self.devices[index];
                    let old = std::mem::replace(&mut device.id, info.instance_id.clone());
                    report.migrated.push((old.clone(), device.id.clone()));
                    device.aliases.push(old);
                    index
                }
                Resolved::New => {
                    self.devices.push(Device::new(info.clone()));
                    self.devices.len() - 1
                }
            };
            self.devices[index].attach(info.clone(), handle, caps);
            report.opened.push(info.instance_id.clone());
            report.changed = true;
        }
        self.filtered = filtered;

        Ok(report)
    }

    fn resolve(&self, info: &DeviceInfo, present: &AHashSet<&str>) -> Resolved {
        if let Some(index) = self.devices.iter().position(|d| d.answers_to(&info.instance_id)) {
            // An alias of a device that is online again under its new id.
            if self.devices[index].online {
                return Resolved::New;
            }
            return Resolved::Exact(index);
        }
        if info.product.is_zero() {
            return Resolved::New;
        }
        self.devices
            .iter()
            .position(|d| {
                !d.online && d.info.product == info.product && !present.contains(&*d.id)
            })
            .map_or(Resolved::New, Resolved::Fallback)
    }

    /// Read a fresh snapshot from every online device.
    ///
    /// `on_read` runs after each successful read, with the device still
    /// borrowed, so force feedback can be applied through its handle.
    /// Returns the ids of devices that went offline.
    pub fn refresh_states<B, F>(&mut self, backend: &mut B, mut on_read: F) -> Vec<Box<str>>
    where
        B: DeviceBackend<Handle = H>,
        F: FnMut(&mut B, &mut Device<H>),
    {
        let mut gone = Vec::new();
        for device in self.devices.iter_mut().filter(|d| d.online) {
            device.previous = device.current.take();
            let state = match device.handle.as_mut() {
                Some(handle) => backend.read_state(handle),
                None => None,
            };
            let Some(state) = state else {
                device.detach(backend);
                gone.push(device.id.clone());
                continue;
            };

            device.current = Some(state);
            device.published.store(state);
            device.deltas.clear();
            if let Some(previous) = device.previous.as_ref() {
                state.diff_into(previous, &mut device.deltas);
            }
            on_read(backend, device);
        }
        gone
    }

    /// Release every handle, stopping rumble first.
    pub fn shutdown<B: DeviceBackend<Handle = H>>(&mut self, backend: &mut B) {
        for device in &mut self.devices {
            device.detach(backend);
        }
    }
}

enum Resolved {
    Exact(usize),
    Fallback(usize),
    New,
}

#[cfg(test)]
mod tests {
    use ahash::AHashMap;
    use padmux_gamepad::{Error, Result};
    use padmux_workspace::ControllerKind;

    use super::*;

    #[derive(Default)]
    struct Fake {
        devices: Vec<DeviceInfo>,
        states: AHashMap<Box<str>, RawState>,
        unreadable: AHashSet<Box<str>>,
        closed: Vec<Box<str>>,
        rumbles: Vec<(Box<str>, u16, u16)>,
        fail_open: bool,
    }

    impl Fake {
        fn plug(&mut self, id: &str, product: ProductKey) {
            self.devices.push(DeviceInfo {
                instance_id: id.into(),
                product,
                name: format!("pad {id}").into(),
                path: format!("usb/{id}").into(),
            });
        }

        fn unplug(&mut self, id: &str) {
            self.devices.retain(|d| &*d.instance_id != id);
        }
    }

    impl DeviceBackend for Fake {
        type Handle = Box<str>;

        fn enumerate(&mut self) -> Result<Vec<DeviceInfo>> {
            Ok(self.devices.clone())
        }

        fn open(&mut self, info: &DeviceInfo) -> Result<Box<str>> {
            if self.fail_open {
                return Err(Error::Open {
                    id: info.instance_id.to_string(),
                    reason: "busy".into(),
                });
            }
            Ok(info.instance_id.clone())
        }

        fn capabilities(&self, _handle: &Box<str>) -> FeedbackCaps {
            FeedbackCaps {
                rumble: true,
                haptic: false,
            }
        }

        fn read_state(&mut self, handle: &mut Box<str>) -> Option<RawState> {
            if self.unreadable.contains(handle) {
                return None;
            }
            Some(self.states.get(handle).copied().unwrap_or_default())
        }

        fn set_rumble(&mut self, handle: &mut Box<str>, low: u16, high: u16) -> Result<()> {
            self.rumbles.push((handle.clone(), low, high));
            Ok(())
        }

        fn close(&mut self, handle: Box<str>) {
            self.closed.push(handle);
        }
    }

    const PRODUCT: ProductKey = ProductKey::new(0x046d, 0xc216);

    #[test]
    fn opens_new_devices_once() {
        let mut backend = Fake::default();
        backend.plug("a", PRODUCT);
        let mut registry = Registry::new();
        let counts = VirtualCounts::default();

        let report = registry.refresh_devices(&mut backend, &counts).unwrap();
        assert!(report.changed);
        assert_eq!(report.opened.len(), 1);

        let report = registry.refresh_devices(&mut backend, &counts).unwrap();
        assert!(!report.changed);
        assert_eq!(registry.len(), 1);
        assert!(registry.device("a").unwrap().is_online());
    }

    #[test]
    fn vanished_device_is_closed_exactly_once() {
        let mut backend = Fake::default();
        backend.plug("a", PRODUCT);
        let mut registry = Registry::new();
        let counts = VirtualCounts::default();
        registry.refresh_devices(&mut backend, &counts).unwrap();

        backend.unplug("a");
        let report = registry.refresh_devices(&mut backend, &counts).unwrap();
        assert_eq!(report.went_offline, vec![Box::<str>::from("a")]);
        registry.refresh_devices(&mut backend, &counts).unwrap();
        registry.shutdown(&mut backend);

        assert_eq!(backend.closed, vec![Box::<str>::from("a")]);
        assert_eq!(backend.rumbles, vec![(Box::<str>::from("a"), 0, 0)]);
        assert!(!registry.device("a").unwrap().is_online());
    }

    #[test]
    fn failed_read_marks_offline() {
        let mut backend = Fake::default();
        backend.plug("a", PRODUCT);
        let mut registry = Registry::new();
        registry
            .refresh_devices(&mut backend, &VirtualCounts::default())
            .unwrap();

        backend.unreadable.insert("a".into());
        let gone = registry.refresh_states(&mut backend, |_, _| {});
        assert_eq!(gone.len(), 1);
        assert!(registry.raw_state("a").is_none());

        // Still listed by the backend, so the next enumeration reopens it.
        backend.unreadable.clear();
        let report = registry
            .refresh_devices(&mut backend, &VirtualCounts::default())
            .unwrap();
        assert_eq!(report.opened.len(), 1);
        assert_eq!(backend.closed.len(), 1);
    }

    #[test]
    fn reconnect_with_new_instance_id_migrates() {
        let mut backend = Fake::default();
        backend.plug("bt-1", PRODUCT);
        let mut registry = Registry::new();
        let counts = VirtualCounts::default();
        registry.refresh_devices(&mut backend, &counts).unwrap();

        backend.unplug("bt-1");
        registry.refresh_devices(&mut backend, &counts).unwrap();
        backend.plug("bt-2", PRODUCT);
        let report = registry.refresh_devices(&mut backend, &counts).unwrap();

        assert_eq!(
            report.migrated,
            vec![(Box::<str>::from("bt-1"), Box::<str>::from("bt-2"))]
        );
        assert_eq!(registry.len(), 1);
        let device = registry.device("bt-1").unwrap();
        assert_eq!(device.id(), "bt-2");
        assert!(device.is_online());
    }

    #[test]
    fn deltas_track_previous_snapshot() {
        let mut backend = Fake::default();
        backend.plug("a", PRODUCT);
        let mut registry = Registry::new();
        registry
            .refresh_devices(&mut backend, &VirtualCounts::default())
            .unwrap();

        registry.refresh_states(&mut backend, |_, _| {});
        assert!(registry.device("a").unwrap().deltas().is_empty());

        let mut state = RawState::default();
        state.set_button(0, true);
        backend.states.insert("a".into(), state);
        let mut seen = 0;
        registry.refresh_states(&mut backend, |_, device| seen += device.deltas().len());
        assert_eq!(seen, 1);
        assert_eq!(
            registry.device("a").unwrap().deltas(),
            &[RawDelta::Button { index: 0, pressed: true }]
        );
    }

    #[test]
    fn own_virtual_controllers_are_not_opened() {
        let mut backend = Fake::default();
        let kind = ControllerKind::Xbox360;
        backend.plug("virtual", kind.product());
        backend.plug("real", kind.product());
        let mut counts = VirtualCounts::default();
        counts.increment(kind);

        let mut registry = Registry::new();
        let report = registry.refresh_devices(&mut backend, &counts).unwrap();
        assert_eq!(report.filtered.len(), 1);
        assert_eq!(report.opened, vec![Box::<str>::from("real")]);

        let report = registry.refresh_devices(&mut backend, &counts).unwrap();
        assert!(report.filtered.is_empty());
    }

    #[test]
    fn open_failures_are_reported_not_tracked() {
        let mut backend = Fake {
            fail_open: true,
            ..Fake::default()
        };
        backend.plug("a", PRODUCT);
        let mut registry = Registry::new();
        let report = registry
            .refresh_devices(&mut backend, &VirtualCounts::default())
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(registry.is_empty());
    }
}
