use crate::{RawState, Result};

/// Vendor/product pair. Used as a fallback identity when a device comes back
/// with a different instance id (e.g. Bluetooth re-pairing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProductKey {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl ProductKey {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.vendor_id == 0 && self.product_id == 0
    }
}

impl std::fmt::Display for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Force-feedback capabilities reported by an opened device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedbackCaps {
    pub rumble: bool,
    pub haptic: bool,
}

impl FeedbackCaps {
    #[inline]
    pub fn any(&self) -> bool {
        self.rumble || self.haptic
    }
}

/// Device meta information as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub instance_id: Box<str>,
    pub product: ProductKey,
    pub name: Box<str>,
    pub path: Box<str>,
}

/// Capability set of a physical input backend.
///
/// Implementations are driven from a single thread and need not be `Send`.
pub trait DeviceBackend {
    type Handle;

    /// Pump the backend once per cycle before states are read.
    fn sync(&mut self) {}

    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>>;

    fn open(&mut self, info: &DeviceInfo) -> Result<Self::Handle>;

    fn capabilities(&self, handle: &Self::Handle) -> FeedbackCaps;

    /// `None` means the device is gone or the handle is no longer valid.
    fn read_state(&mut self, handle: &mut Self::Handle) -> Option<RawState>;

    /// Motor intensities in the full `u16` range.
    fn set_rumble(&mut self, handle: &mut Self::Handle, low: u16, high: u16) -> Result<()>;

    /// Release the handle. Consumes it, so a handle is closed at most once.
    fn close(&mut self, handle: Self::Handle);
}
