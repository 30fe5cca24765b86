use std::io;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use evdev::uinput::VirtualDevice;
use evdev::{
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, EventSummary, EventType, FFEffectCode,
    FFEffectKind, InputEvent, InputId, KeyCode, UInputCode, UinputAbsSetup,
};
use padmux_gamepad::{Button, LogicalGamepad};
use padmux_workspace::ControllerKind;

use super::{VirtualBackend, VirtualError, VirtualPad};
use crate::ffb::FeedbackSink;
use crate::print_debug;

const BUTTONS: [(Button, KeyCode); 11] = [
    (Button::A, KeyCode::BTN_SOUTH),
    (Button::B, KeyCode::BTN_EAST),
    (Button::X, KeyCode::BTN_NORTH),
    (Button::Y, KeyCode::BTN_WEST),
    (Button::LeftShoulder, KeyCode::BTN_TL),
    (Button::RightShoulder, KeyCode::BTN_TR),
    (Button::Back, KeyCode::BTN_SELECT),
    (Button::Start, KeyCode::BTN_START),
    (Button::Guide, KeyCode::BTN_MODE),
    (Button::LeftThumb, KeyCode::BTN_THUMBL),
    (Button::RightThumb, KeyCode::BTN_THUMBR),
];

/// Effects a game may keep uploaded at once.
const FF_EFFECTS_MAX: u32 = 16;
/// Pause between polls of the force feedback queue.
const FF_POLL: Duration = Duration::from_millis(2);

fn device_name(kind: ControllerKind) -> &'static str {
    // The "padmux" marker keeps these out of physical enumeration.
    match kind {
        ControllerKind::Xbox360 => "padmux Xbox 360 Controller",
        ControllerKind::DualShock4 => "padmux Wireless Controller",
        ControllerKind::Generic => "padmux Gamepad",
    }
}

/// Virtual controllers through `/dev/uinput`.
#[derive(Debug, Default)]
pub struct UinputBackend;

impl UinputBackend {
    pub fn new() -> Self {
        Self
    }
}

impl VirtualBackend for UinputBackend {
    fn create(&mut self, kind: ControllerKind) -> Result<Box<dyn VirtualPad>, VirtualError> {
        Ok(Box::new(UinputPad {
            kind,
            device: None,
            last: None,
            feedback: None,
            reader: None,
        }))
    }
}

/// Rumble effects a game uploaded to one pad, and which of them play.
#[derive(Debug, Default)]
struct RumbleEffects {
    uploaded: AHashMap<i16, (u16, u16)>,
    playing: AHashSet<i16>,
}

impl RumbleEffects {
    /// Store an effect. Kinds other than rumble are kept silent.
    fn upload(&mut self, id: i16, kind: &FFEffectKind) {
        let motors = match kind {
            FFEffectKind::Rumble {
                strong_magnitude,
                weak_magnitude,
            } => (*strong_magnitude, *weak_magnitude),
            _ => (0, 0),
        };
        self.uploaded.insert(id, motors);
    }

    fn erase(&mut self, id: i16) {
        self.uploaded.remove(&id);
        self.playing.remove(&id);
    }

    fn play(&mut self, id: i16, on: bool) {
        if on && self.uploaded.contains_key(&id) {
            self.playing.insert(id);
        } else {
            self.playing.remove(&id);
        }
    }

    /// Strong and weak motor, each the maximum over playing effects.
    fn motors(&self) -> (u16, u16) {
        self.playing
            .iter()
            .filter_map(|id| self.uploaded.get(id))
            .fold((0, 0), |acc, m| (acc.0.max(m.0), acc.1.max(m.1)))
    }
}

/// Thread answering the kernel's force feedback requests for one pad.
struct FeedbackReader {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl FeedbackReader {
    fn spawn(device: Arc<Mutex<VirtualDevice>>, sink: FeedbackSink) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("padmux-uinput-ff-{}", sink.slot()))
            .spawn(move || read_feedback(&device, &sink, &flag))?;
        Ok(Self { stop, handle })
    }

    fn join(self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.handle.join();
    }
}

fn read_feedback(device: &Mutex<VirtualDevice>, sink: &FeedbackSink, stop: &AtomicBool) {
    let mut effects = RumbleEffects::default();
    let mut pending = Vec::new();
    while !stop.load(Ordering::Acquire) {
        let Ok(mut device) = device.lock() else {
            return;
        };
        match device.fetch_events() {
            Ok(events) => pending.extend(events),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                print_debug!("slot {}: force feedback reader stopped: {e}", sink.slot());
                return;
            }
        }

        let before = effects.motors();
        for event in pending.drain(..) {
            if let Err(e) = handle_feedback(&mut device, &mut effects, event) {
                print_debug!("slot {}: force feedback request failed: {e}", sink.slot());
            }
        }
        drop(device);

        let after = effects.motors();
        if after != before {
            sink.motors(after.0, after.1);
        }
        thread::sleep(FF_POLL);
    }
}

fn handle_feedback(
    device: &mut VirtualDevice,
    effects: &mut RumbleEffects,
    event: InputEvent,
) -> io::Result<()> {
    match event.destructure() {
        EventSummary::UInput(event, UInputCode::UI_FF_UPLOAD, _) => {
            // The upload completes when `upload` drops.
            let upload = device.process_ff_upload(event)?;
            effects.upload(upload.effect_id(), &upload.effect().kind);
        }
        EventSummary::UInput(event, UInputCode::UI_FF_ERASE, _) => {
            let erase = device.process_ff_erase(event)?;
            effects.erase(erase.effect_id() as i16);
        }
        EventSummary::ForceFeedback(_, FFEffectCode(id), value) => {
            effects.play(id as i16, value > 0);
        }
        _ => {}
    }
    Ok(())
}

/// Reads on the uinput node must not block `submit`.
fn set_nonblocking(device: &VirtualDevice) -> io::Result<()> {
    let fd = device.as_raw_fd();
    // SAFETY: `fd` belongs to `device`, which is borrowed for both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

struct UinputPad {
    kind: ControllerKind,
    device: Option<Arc<Mutex<VirtualDevice>>>,
    last: Option<LogicalGamepad>,
    feedback: Option<FeedbackSink>,
    reader: Option<FeedbackReader>,
}

impl UinputPad {
    fn build(&self) -> io::Result<VirtualDevice> {
        let stick = AbsInfo::new(0, i32::from(i16::MIN), i32::from(i16::MAX), 16, 128, 0);
        let trigger = AbsInfo::new(0, 0, 255, 0, 0, 0);
        let hat = AbsInfo::new(0, -1, 1, 0, 0, 0);
        let product = self.kind.product();

        let mut keys = AttributeSet::<KeyCode>::new();
        for (_, code) in BUTTONS {
            keys.insert(code);
        }
        let mut ff = AttributeSet::<FFEffectCode>::new();
        ff.insert(FFEffectCode::FF_RUMBLE);

        VirtualDevice::builder()?
            .name(device_name(self.kind))
            .input_id(InputId::new(
                BusType::BUS_USB,
                product.vendor_id,
                product.product_id,
                0x0110,
            ))
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, stick))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, stick))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_RX, stick))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_RY, stick))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Z, trigger))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_RZ, trigger))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_HAT0X, hat))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_HAT0Y, hat))?
            .with_keys(&keys)?
            .with_ff(&ff)?
            .with_ff_effects_max(FF_EFFECTS_MAX)
            .build()
    }

    fn map_error(&self, e: io::Error) -> VirtualError {
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                VirtualError::Unavailable {
                    kind: self.kind,
                    reason: format!("/dev/uinput: {e}"),
                }
            }
            _ => VirtualError::Create {
                kind: self.kind,
                reason: e.to_string(),
            },
        }
    }
}

impl VirtualPad for UinputPad {
    fn kind(&self) -> ControllerKind {
        self.kind
    }

    fn register_feedback(&mut self, sink: FeedbackSink) -> Result<(), VirtualError> {
        self.feedback = Some(sink);
        Ok(())
    }

    fn connect(&mut self) -> Result<(), VirtualError> {
        if self.device.is_some() {
            return Ok(());
        }
        let device = self.build().map_err(|e| self.map_error(e))?;
        set_nonblocking(&device).map_err(|e| VirtualError::Io(e.to_string()))?;
        let device = Arc::new(Mutex::new(device));
        if let Some(sink) = &self.feedback {
            let reader = FeedbackReader::spawn(Arc::clone(&device), sink.clone())
                .map_err(|e| VirtualError::Io(e.to_string()))?;
            self.reader = Some(reader);
        }
        self.device = Some(device);
        Ok(())
    }

    fn submit(&mut self, state: &LogicalGamepad) -> Result<(), VirtualError> {
        let Some(device) = self.device.as_ref() else {
            return Err(VirtualError::Io("not connected".into()));
        };
        let previous = self.last.unwrap_or_default();
        if self.last.is_some() && previous == *state {
            return Ok(());
        }

        let mut events = Vec::with_capacity(8);
        for (button, code) in BUTTONS {
            let now = state.buttons.contains(button);
            if self.last.is_none() || previous.buttons.contains(button) != now {
                events.push(InputEvent::new(EventType::KEY.0, code.0, i32::from(now)));
            }
        }
        let abs = [
            (AbsoluteAxisCode::ABS_X, i32::from(state.thumb_lx), i32::from(previous.thumb_lx)),
            // evdev reports down as positive.
            (AbsoluteAxisCode::ABS_Y, flip(state.thumb_ly), flip(previous.thumb_ly)),
            (AbsoluteAxisCode::ABS_RX, i32::from(state.thumb_rx), i32::from(previous.thumb_rx)),
            (AbsoluteAxisCode::ABS_RY, flip(state.thumb_ry), flip(previous.thumb_ry)),
            (AbsoluteAxisCode::ABS_Z, i32::from(state.left_trigger), i32::from(previous.left_trigger)),
            (AbsoluteAxisCode::ABS_RZ, i32::from(state.right_trigger), i32::from(previous.right_trigger)),
            (AbsoluteAxisCode::ABS_HAT0X, hat_x(state), hat_x(&previous)),
            (AbsoluteAxisCode::ABS_HAT0Y, hat_y(state), hat_y(&previous)),
        ];
        for (code, now, before) in abs {
            if self.last.is_none() || now != before {
                events.push(InputEvent::new(EventType::ABSOLUTE.0, code.0, now));
            }
        }

        device
            .lock()
            .map_err(|_| VirtualError::Io("device lock poisoned".into()))?
            .emit(&events)
            .map_err(|e| VirtualError::Io(e.to_string()))?;
        self.last = Some(*state);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), VirtualError> {
        if let Some(reader) = self.reader.take() {
            reader.join();
        }
        // Dropping the device destroys the node.
        self.device = None;
        self.last = None;
        if let Some(sink) = &self.feedback {
            sink.motors(0, 0);
        }
        Ok(())
    }
}

#[inline]
fn flip(value: i16) -> i32 {
    (-i32::from(value)).min(i32::from(i16::MAX))
}

fn hat_x(state: &LogicalGamepad) -> i32 {
    i32::from(state.buttons.contains(Button::DPadRight))
        - i32::from(state.buttons.contains(Button::DPadLeft))
}

fn hat_y(state: &LogicalGamepad) -> i32 {
    i32::from(state.buttons.contains(Button::DPadDown))
        - i32::from(state.buttons.contains(Button::DPadUp))
}
