//! In-memory backends for driving the engine without hardware.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use padmux_control::NullSink;
use padmux_gamepad::{
    DeviceBackend, DeviceInfo, FeedbackCaps, LogicalGamepad, ProductKey, RawState,
};
use padmux_workspace::{parse_settings, ControllerKind, Settings};
use padmuxd::engine::{EngineConfig, Pipeline};
use padmuxd::ffb::FeedbackSink;
use padmuxd::publish::Shared;
use padmuxd::virtual_pad::{VirtualBackend, VirtualError, VirtualPad};

pub const PAD_PRODUCT: ProductKey = ProductKey::new(0x1111, 0x2222);

pub struct FakeDevice {
    pub info: DeviceInfo,
    pub state: RawState,
    pub attached: bool,
    pub rumble: bool,
}

#[derive(Default)]
pub struct DeviceBus {
    pub devices: Vec<FakeDevice>,
    pub opened: Vec<Box<str>>,
    pub closed: Vec<Box<str>>,
    pub rumble: Vec<(Box<str>, u16, u16)>,
    pub fail_init: bool,
}

/// Physical devices that tests plug, unplug and press.
#[derive(Clone, Default)]
pub struct FakeDevices(pub Arc<Mutex<DeviceBus>>);

pub struct FakeHandle {
    id: Box<str>,
}

impl FakeDevices {
    pub fn bus(&self) -> MutexGuard<'_, DeviceBus> {
        self.0.lock().unwrap()
    }

    pub fn plug(&self, id: &str, product: ProductKey) {
        self.plug_named(id, product, "USB Gamepad");
    }

    pub fn plug_named(&self, id: &str, product: ProductKey, name: &str) {
        let mut bus = self.bus();
        bus.devices.retain(|d| &*d.info.instance_id != id);
        bus.devices.push(FakeDevice {
            info: DeviceInfo {
                instance_id: id.into(),
                product,
                name: name.into(),
                path: format!("usb/{id}").into(),
            },
            state: RawState::default(),
            attached: true,
            rumble: true,
        });
    }

    pub fn unplug(&self, id: &str) {
        self.bus().devices.retain(|d| &*d.info.instance_id != id);
    }

    pub fn set_button(&self, id: &str, index: usize, pressed: bool) {
        if let Some(device) = self.bus().devices.iter_mut().find(|d| &*d.info.instance_id == id) {
            device.state.set_button(index, pressed);
        }
    }

    pub fn set_axis(&self, id: &str, index: usize, value: u16) {
        if let Some(device) = self.bus().devices.iter_mut().find(|d| &*d.info.instance_id == id) {
            device.state.axes[index] = value;
        }
    }

    pub fn times_closed(&self, id: &str) -> usize {
        self.bus().closed.iter().filter(|c| &***c == id).count()
    }

    pub fn times_opened(&self, id: &str) -> usize {
        self.bus().opened.iter().filter(|c| &***c == id).count()
    }
}

impl DeviceBackend for FakeDevices {
    type Handle = FakeHandle;

    fn enumerate(&mut self) -> padmux_gamepad::Result<Vec<DeviceInfo>> {
        Ok(self.bus().devices.iter().map(|d| d.info.clone()).collect())
    }

    fn open(&mut self, info: &DeviceInfo) -> padmux_gamepad::Result<FakeHandle> {
        let mut bus = self.bus();
        if !bus.devices.iter().any(|d| d.info.instance_id == info.instance_id) {
            return Err(padmux_gamepad::Error::NotFound(info.instance_id.to_string()));
        }
        bus.opened.push(info.instance_id.clone());
        Ok(FakeHandle {
            id: info.instance_id.clone(),
        })
    }

    fn capabilities(&self, handle: &FakeHandle) -> FeedbackCaps {
        let rumble = self
            .bus()
            .devices
            .iter()
            .any(|d| d.info.instance_id == handle.id && d.rumble);
        FeedbackCaps {
            rumble,
            haptic: false,
        }
    }

    fn read_state(&mut self, handle: &mut FakeHandle) -> Option<RawState> {
        self.bus()
            .devices
            .iter()
            .find(|d| d.info.instance_id == handle.id && d.attached)
            .map(|d| d.state)
    }

    fn set_rumble(&mut self, handle: &mut FakeHandle, low: u16, high: u16) -> padmux_gamepad::Result<()> {
        self.bus().rumble.push((handle.id.clone(), low, high));
        Ok(())
    }

    fn close(&mut self, handle: FakeHandle) {
        self.bus().closed.push(handle.id);
    }
}

#[derive(Default)]
pub struct PadBus {
    pub created: Vec<ControllerKind>,
    pub live: usize,
    pub disconnected: usize,
    /// `(slot, state)` per submission.
    pub submitted: Vec<(usize, LogicalGamepad)>,
    pub sinks: Vec<FeedbackSink>,
    pub unavailable: bool,
}

/// Virtual controller driver recording what it is asked to do.
#[derive(Clone, Default)]
pub struct FakeVirtuals(pub Arc<Mutex<PadBus>>);

impl FakeVirtuals {
    pub fn bus(&self) -> MutexGuard<'_, PadBus> {
        self.0.lock().unwrap()
    }

    pub fn submissions(&self, slot: usize) -> usize {
        self.bus().submitted.iter().filter(|(s, _)| *s == slot).count()
    }

    pub fn last_submitted(&self, slot: usize) -> Option<LogicalGamepad> {
        self.bus()
            .submitted
            .iter()
            .rev()
            .find(|(s, _)| *s == slot)
            .map(|(_, state)| *state)
    }
}

struct FakePad {
    kind: ControllerKind,
    slot: Option<usize>,
    bus: Arc<Mutex<PadBus>>,
}

impl VirtualPad for FakePad {
    fn kind(&self) -> ControllerKind {
        self.kind
    }

    fn register_feedback(&mut self, sink: FeedbackSink) -> Result<(), VirtualError> {
        self.slot = Some(sink.slot());
        self.bus.lock().unwrap().sinks.push(sink);
        Ok(())
    }

    fn connect(&mut self) -> Result<(), VirtualError> {
        self.bus.lock().unwrap().live += 1;
        Ok(())
    }

    fn submit(&mut self, state: &LogicalGamepad) -> Result<(), VirtualError> {
        let slot = self.slot.unwrap_or(usize::MAX);
        self.bus.lock().unwrap().submitted.push((slot, *state));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), VirtualError> {
        let mut bus = self.bus.lock().unwrap();
        bus.live -= 1;
        bus.disconnected += 1;
        Ok(())
    }
}

impl VirtualBackend for FakeVirtuals {
    fn create(&mut self, kind: ControllerKind) -> Result<Box<dyn VirtualPad>, VirtualError> {
        let mut bus = self.bus();
        if bus.unavailable {
            return Err(VirtualError::Unavailable {
                kind,
                reason: "driver not installed".into(),
            });
        }
        bus.created.push(kind);
        Ok(Box::new(FakePad {
            kind,
            slot: None,
            bus: Arc::clone(&self.0),
        }))
    }
}

pub const SETTINGS: &str = r#"
version: 1
slots:
  - index: 0
    kind: xbox360
    macros:
      - name: tap-x
        trigger: y
        mode: on_press
        actions:
          - press: x
            ms: 5
  - index: 1
    kind: xbox360
profiles:
  pad:
    buttons:
      a: "Button 0"
      y: "Button 3"
    axes:
      left_x: "Axis 0"
assignments:
  - device: "pad-a"
    slot: 0
    profile: pad
  - device: "pad-x"
    slot: 1
    profile: pad
  - device: "pad-y"
    slot: 1
    profile: pad
"#;

pub fn settings() -> Settings {
    parse_settings(SETTINGS).unwrap()
}

pub fn config(grace_cycles: u32) -> EngineConfig {
    EngineConfig {
        grace_cycles,
        cooldown_cycles: 10,
        ..EngineConfig::default()
    }
}

/// A pipeline over fake backends, ticking one millisecond per cycle.
pub struct Rig {
    pub devices: FakeDevices,
    pub virtuals: FakeVirtuals,
    pub pipeline: Pipeline<FakeDevices, FakeVirtuals, NullSink>,
    pub shared: Shared,
    pub settings: Settings,
    pub now: Instant,
}

impl Rig {
    pub fn new(settings: Settings, config: EngineConfig) -> Self {
        let devices = FakeDevices::default();
        let virtuals = FakeVirtuals::default();
        let pipeline = Pipeline::new(devices.clone(), virtuals.clone(), NullSink, &config);
        Self {
            devices,
            virtuals,
            pipeline,
            shared: Shared::new(settings.clone()),
            settings,
            now: Instant::now(),
        }
    }

    pub fn cycle(&mut self) {
        self.pipeline.run_cycle(self.now, &self.settings, &self.shared);
        self.now += Duration::from_millis(1);
    }

    pub fn cycles(&mut self, n: usize) {
        for _ in 0..n {
            self.cycle();
        }
    }
}
