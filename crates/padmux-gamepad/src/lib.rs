mod backend;
mod raw;
#[cfg(feature = "sdl2-backend")]
mod sdl;
mod types;

use thiserror::Error;

pub use crate::backend::{DeviceBackend, DeviceInfo, FeedbackCaps, ProductKey};
pub use crate::raw::{
    RawDelta, RawState, AXIS_CENTER, MAX_AXES, MAX_BUTTONS, MAX_POVS, MAX_SLIDERS,
    POV_CENTERED,
};
#[cfg(feature = "sdl2-backend")]
pub use crate::sdl::{Sdl2Backend, SdlDevice};
pub use crate::types::{Button, GamepadAxis, LogicalGamepad};

/// Error type for physical device operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to initialize the backend library or one of its subsystems.
    #[error("Backend init failed: {0}")]
    BackendInit(String),
    /// Device enumeration failed as a whole.
    #[error("Enumeration failed: {0}")]
    Enumerate(String),
    /// The device is no longer present in the backend.
    #[error("Device not found: {0}")]
    NotFound(String),
    /// Opening a device failed.
    #[error("Open failed for {id}: {reason}")]
    Open { id: String, reason: String },
    /// Operation is not supported on the current device/backend.
    #[error("Operation unsupported")]
    Unsupported,
    /// A generic backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Convenient result alias for device operations.
pub type Result<T> = std::result::Result<T, Error>;
