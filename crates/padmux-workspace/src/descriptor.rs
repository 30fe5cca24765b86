use std::fmt;
use std::str::FromStr;

use padmux_gamepad::{MAX_AXES, MAX_BUTTONS, MAX_POVS, MAX_SLIDERS};
use smallvec::SmallVec;
use thiserror::Error;

use crate::v1::combo::parse_terms_with_delim;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("empty descriptor")]
    Empty,
    #[error("malformed alternatives in \"{0}\"")]
    Alternatives(String),
    #[error("unknown control type \"{0}\"")]
    UnknownType(String),
    #[error("missing index in \"{0}\"")]
    MissingIndex(String),
    #[error("index {index} out of range for {kind} (max {max})")]
    IndexOutOfRange {
        kind: &'static str,
        index: u32,
        max: usize,
    },
    #[error("invalid pov direction \"{0}\"")]
    InvalidDirection(String),
    #[error("unexpected token \"{0}\"")]
    Unexpected(String),
    #[error("{modifier} is not supported for {kind}")]
    UnsupportedModifier {
        modifier: &'static str,
        kind: &'static str,
    },
}

/// Hat direction a POV descriptor tests against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PovDirection {
    Up,
    Right,
    Down,
    Left,
}

impl PovDirection {
    pub const ALL: [PovDirection; 4] = [
        PovDirection::Up,
        PovDirection::Right,
        PovDirection::Down,
        PovDirection::Left,
    ];

    /// Direction in centidegrees, 0 = up, clockwise.
    pub const fn centidegrees(self) -> i32 {
        match self {
            PovDirection::Up => 0,
            PovDirection::Right => 9000,
            PovDirection::Down => 18000,
            PovDirection::Left => 27000,
        }
    }

    fn parse(input: &str) -> Option<Self> {
        Some(match input.to_ascii_lowercase().as_str() {
            "up" | "u" | "n" => PovDirection::Up,
            "right" | "r" | "e" => PovDirection::Right,
            "down" | "d" | "s" => PovDirection::Down,
            "left" | "l" | "w" => PovDirection::Left,
            _ => return None,
        })
    }
}

/// One raw control reference, parsed from e.g. `IHAxis 2` or `pov 0 up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Descriptor {
    Button { index: u16, inverted: bool },
    Axis { index: u8, inverted: bool, half: bool },
    Slider { index: u8, inverted: bool, half: bool },
    Pov { index: u8, direction: PovDirection },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Button,
    Axis,
    Slider,
    Pov,
}

impl Kind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "button" => Kind::Button,
            "axis" => Kind::Axis,
            "slider" => Kind::Slider,
            "pov" => Kind::Pov,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Button => "button",
            Kind::Axis => "axis",
            Kind::Slider => "slider",
            Kind::Pov => "pov",
        }
    }

    fn max(self) -> usize {
        match self {
            Kind::Button => MAX_BUTTONS,
            Kind::Axis => MAX_AXES,
            Kind::Slider => MAX_SLIDERS,
            Kind::Pov => MAX_POVS,
        }
    }
}

/// Split the type token into its modifiers and kind.
///
/// Full type names win over prefixes, so a type name that happens to start
/// with `i` or `h` is never read as a modifier. Prefixes are tried longest
/// first.
fn split_prefix(token: &str) -> Option<(bool, bool, Kind)> {
    if let Some(kind) = Kind::from_name(token) {
        return Some((false, false, kind));
    }
    const PREFIXES: [(&str, bool, bool); 4] = [
        ("ih", true, true),
        ("hi", true, true),
        ("i", true, false),
        ("h", false, true),
    ];
    PREFIXES.iter().find_map(|(prefix, inverted, half)| {
        let rest = token.strip_prefix(prefix)?;
        Kind::from_name(rest).map(|kind| (*inverted, *half, kind))
    })
}

impl FromStr for Descriptor {
    type Err = DescriptorError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.split_whitespace();
        let type_token = parts.next().ok_or(DescriptorError::Empty)?;
        let lowered = type_token.to_ascii_lowercase();
        let (inverted, half, kind) = split_prefix(&lowered)
            .ok_or_else(|| DescriptorError::UnknownType(type_token.to_string()))?;

        let index_token = parts
            .next()
            .ok_or_else(|| DescriptorError::MissingIndex(input.to_string()))?;
        let index: u32 = index_token
            .parse()
            .map_err(|_| DescriptorError::MissingIndex(input.to_string()))?;
        if index as usize >= kind.max() {
            return Err(DescriptorError::IndexOutOfRange {
                kind: kind.name(),
                index,
                max: kind.max() - 1,
            });
        }

        let descriptor = match kind {
            Kind::Button => {
                if half {
                    return Err(DescriptorError::UnsupportedModifier {
                        modifier: "half",
                        kind: kind.name(),
                    });
                }
                Descriptor::Button {
                    index: index as u16,
                    inverted,
                }
            }
            Kind::Axis => Descriptor::Axis {
                index: index as u8,
                inverted,
                half,
            },
            Kind::Slider => Descriptor::Slider {
                index: index as u8,
                inverted,
                half,
            },
            Kind::Pov => {
                if inverted || half {
                    return Err(DescriptorError::UnsupportedModifier {
                        modifier: if inverted { "invert" } else { "half" },
                        kind: kind.name(),
                    });
                }
                let token = parts
                    .next()
                    .ok_or_else(|| DescriptorError::InvalidDirection(String::new()))?;
                let direction = PovDirection::parse(token)
                    .ok_or_else(|| DescriptorError::InvalidDirection(token.to_string()))?;
                Descriptor::Pov {
                    index: index as u8,
                    direction,
                }
            }
        };

        if let Some(extra) = parts.next() {
            return Err(DescriptorError::Unexpected(extra.to_string()));
        }
        Ok(descriptor)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = |inverted: bool, half: bool| match (inverted, half) {
            (true, true) => "IH",
            (true, false) => "I",
            (false, true) => "H",
            (false, false) => "",
        };
        match *self {
            Descriptor::Button { index, inverted } => {
                write!(f, "{}Button {index}", prefix(inverted, false))
            }
            Descriptor::Axis {
                index,
                inverted,
                half,
            } => write!(f, "{}Axis {index}", prefix(inverted, half)),
            Descriptor::Slider {
                index,
                inverted,
                half,
            } => write!(f, "{}Slider {index}", prefix(inverted, half)),
            Descriptor::Pov { index, direction } => {
                write!(f, "POV {index} {direction:?}")
            }
        }
    }
}

/// Pipe-separated alternatives bound to one logical control.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DescriptorSet(SmallVec<[Descriptor; 2]>);

impl DescriptorSet {
    pub fn single(descriptor: Descriptor) -> Self {
        let mut set = SmallVec::new();
        set.push(descriptor);
        Self(set)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Descriptor> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a DescriptorSet {
    type Item = &'a Descriptor;
    type IntoIter = std::slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromStr for DescriptorSet {
    type Err = DescriptorError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let terms = parse_terms_with_delim(input, '|')
            .map_err(|_| DescriptorError::Alternatives(input.to_string()))?;
        if terms.is_empty() {
            return Err(DescriptorError::Empty);
        }
        terms
            .into_iter()
            .map(str::parse)
            .collect::<Result<SmallVec<_>, _>>()
            .map(DescriptorSet)
    }
}
