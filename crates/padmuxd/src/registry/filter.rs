use padmux_gamepad::DeviceInfo;
use padmux_workspace::ControllerKind;

/// Substrings that mark a device as one of our own virtual controllers.
const PATH_MARKERS: [&str; 2] = ["padmux", "vigem"];

/// Number of live virtual controllers per kind.
///
/// Owned by the lifecycle manager. The registry only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualCounts([usize; ControllerKind::ALL.len()]);

impl VirtualCounts {
    pub fn get(&self, kind: ControllerKind) -> usize {
        self.0[kind.index()]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub(crate) fn increment(&mut self, kind: ControllerKind) {
        self.0[kind.index()] += 1;
    }

    pub(crate) fn decrement(&mut self, kind: ControllerKind) {
        let count = &mut self.0[kind.index()];
        *count = count.saturating_sub(1);
    }
}

/// Why a device was taken for one of our own virtual controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    PathMarker,
    ZeroProduct,
    Emulated(ControllerKind),
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::PathMarker => f.write_str("path marker"),
            FilterReason::ZeroProduct => f.write_str("zero vendor/product"),
            FilterReason::Emulated(kind) => write!(f, "emulated {kind} id"),
        }
    }
}

/// Self-detection filter for one enumeration pass.
///
/// Each kind may swallow at most as many devices as there are live virtual
/// controllers of that kind. Any extra device with the same id is real.
pub struct SelfFilter<'a> {
    counts: &'a VirtualCounts,
    budget: [usize; ControllerKind::ALL.len()],
}

impl<'a> SelfFilter<'a> {
    pub fn new(counts: &'a VirtualCounts) -> Self {
        Self {
            counts,
            budget: counts.0,
        }
    }

    pub fn check(&mut self, info: &DeviceInfo) -> Option<FilterReason> {
        if has_marker(&info.path) || has_marker(&info.name) {
            return Some(FilterReason::PathMarker);
        }
        if info.product.is_zero() {
            return (self.counts.total() > 0).then_some(FilterReason::ZeroProduct);
        }
        let kind = ControllerKind::ALL
            .into_iter()
            .find(|kind| kind.product() == info.product)?;
        let budget = &mut self.budget[kind.index()];
        if *budget == 0 {
            return None;
        }
        *budget -= 1;
        Some(FilterReason::Emulated(kind))
    }
}

fn has_marker(value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    PATH_MARKERS.iter().any(|marker| value.contains(marker))
}
