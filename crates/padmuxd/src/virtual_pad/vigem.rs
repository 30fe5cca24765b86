use std::sync::Arc;
use std::thread::JoinHandle;

use padmux_gamepad::LogicalGamepad;
use padmux_workspace::ControllerKind;
use vigem_client::{Client, TargetId, XButtons, XGamepad, Xbox360Wired};

use super::{VirtualBackend, VirtualError, VirtualPad};
use crate::ffb::FeedbackSink;

/// Virtual controllers through the ViGEmBus driver.
pub struct VigemBackend {
    client: Result<Arc<Client>, String>,
}

impl VigemBackend {
    pub fn new() -> Self {
        Self {
            client: Client::connect()
                .map(Arc::new)
                .map_err(|e| e.to_string()),
        }
    }
}

impl VirtualBackend for VigemBackend {
    fn create(&mut self, kind: ControllerKind) -> Result<Box<dyn VirtualPad>, VirtualError> {
        let client = self.client.as_ref().map_err(|reason| VirtualError::Unavailable {
            kind,
            reason: reason.clone(),
        })?;
        match kind {
            ControllerKind::Xbox360 => Ok(Box::new(VigemXbox {
                target: Xbox360Wired::new(Arc::clone(client), TargetId::XBOX360_WIRED),
                feedback: None,
                notifier: None,
            })),
            ControllerKind::DualShock4 | ControllerKind::Generic => {
                Err(VirtualError::Unavailable {
                    kind,
                    reason: "ViGEm backend emulates Xbox 360 controllers only".into(),
                })
            }
        }
    }
}

struct VigemXbox {
    target: Xbox360Wired<Arc<Client>>,
    feedback: Option<FeedbackSink>,
    notifier: Option<JoinHandle<()>>,
}

fn create_error(e: vigem_client::Error) -> VirtualError {
    match e {
        vigem_client::Error::BusNotFound => VirtualError::Unavailable {
            kind: ControllerKind::Xbox360,
            reason: e.to_string(),
        },
        other => VirtualError::Create {
            kind: ControllerKind::Xbox360,
            reason: other.to_string(),
        },
    }
}

impl VirtualPad for VigemXbox {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Xbox360
    }

    fn register_feedback(&mut self, sink: FeedbackSink) -> Result<(), VirtualError> {
        self.feedback = Some(sink);
        Ok(())
    }

    fn connect(&mut self) -> Result<(), VirtualError> {
        self.target.plugin().map_err(create_error)?;
        self.target.wait_ready().map_err(create_error)?;

        if let Some(sink) = self.feedback.clone() {
            let request = self.target.request_notification().map_err(create_error)?;
            self.notifier = Some(request.spawn_thread(move |_, notification| {
                // Motor bytes scaled to the full u16 range.
                sink.motors(
                    u16::from(notification.large_motor) * 257,
                    u16::from(notification.small_motor) * 257,
                );
            }));
        }
        Ok(())
    }

    fn submit(&mut self, state: &LogicalGamepad) -> Result<(), VirtualError> {
        let report = XGamepad {
            buttons: XButtons {
                raw: state.xinput_buttons(),
            },
            left_trigger: state.left_trigger,
            right_trigger: state.right_trigger,
            thumb_lx: state.thumb_lx,
            thumb_ly: state.thumb_ly,
            thumb_rx: state.thumb_rx,
            thumb_ry: state.thumb_ry,
        };
        self.target
            .update(&report)
            .map_err(|e| VirtualError::Io(e.to_string()))
    }

    fn disconnect(&mut self) -> Result<(), VirtualError> {
        let result = self
            .target
            .unplug()
            .map_err(|e| VirtualError::Io(e.to_string()));
        // The notification thread exits once the target is gone.
        if let Some(notifier) = self.notifier.take() {
            let _ = notifier.join();
        }
        result
    }
}
