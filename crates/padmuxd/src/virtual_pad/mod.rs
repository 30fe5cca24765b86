mod lifecycle;
#[cfg(target_os = "linux")]
mod uinput;
#[cfg(target_os = "windows")]
mod vigem;

use padmux_gamepad::LogicalGamepad;
use padmux_workspace::ControllerKind;
use thiserror::Error;

use crate::ffb::FeedbackSink;

pub use lifecycle::{
    DestroyReason, LifecycleConfig, LifecycleEvent, LifecycleManager, SlotDemand, SlotPhase,
};
#[cfg(target_os = "linux")]
pub use uinput::UinputBackend;
#[cfg(target_os = "windows")]
pub use vigem::VigemBackend;

#[derive(Debug, Error)]
pub enum VirtualError {
    /// The driver or device node is missing. Retrying will not help.
    #[error("{kind} controllers are unavailable: {reason}")]
    Unavailable {
        kind: ControllerKind,
        reason: String,
    },
    #[error("failed to create {kind} controller: {reason}")]
    Create {
        kind: ControllerKind,
        reason: String,
    },
    #[error("virtual controller i/o: {0}")]
    Io(String),
}

/// One live emulated controller.
pub trait VirtualPad {
    fn kind(&self) -> ControllerKind;

    /// Route game-written feedback for this pad into `sink`.
    fn register_feedback(&mut self, sink: FeedbackSink) -> Result<(), VirtualError>;

    /// Plug the controller in and wait until it is ready for reports.
    fn connect(&mut self) -> Result<(), VirtualError>;

    fn submit(&mut self, state: &LogicalGamepad) -> Result<(), VirtualError>;

    fn disconnect(&mut self) -> Result<(), VirtualError>;
}

/// Factory of virtual controllers.
pub trait VirtualBackend {
    fn create(&mut self, kind: ControllerKind) -> Result<Box<dyn VirtualPad>, VirtualError>;
}

impl<V: VirtualBackend + ?Sized> VirtualBackend for Box<V> {
    fn create(&mut self, kind: ControllerKind) -> Result<Box<dyn VirtualPad>, VirtualError> {
        (**self).create(kind)
    }
}

/// Backend for platforms without a virtual controller driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl VirtualBackend for UnsupportedBackend {
    fn create(&mut self, kind: ControllerKind) -> Result<Box<dyn VirtualPad>, VirtualError> {
        Err(VirtualError::Unavailable {
            kind,
            reason: "no virtual controller driver on this platform".into(),
        })
    }
}

/// Virtual controller backend of the running platform.
///
/// A missing driver is not an error here; it surfaces as
/// [`VirtualError::Unavailable`] on the first creation attempt.
pub fn platform_backend() -> Box<dyn VirtualBackend> {
    #[cfg(target_os = "linux")]
    {
        Box::new(UinputBackend::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(VigemBackend::new())
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Box::new(UnsupportedBackend)
    }
}
