//! Signal aspects and the worst-of combination rule.
//!
//! Aspects are declared in increasing order of severity, so the derived
//! [`Ord`] is the severity order and combining aspects is just `max`.

use serde::{Deserialize, Serialize};

/// The discrete state a signal displays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum SignalAspect {
    Green = 0,
    BlinkYellow = 1,
    Yellow = 2,
    BlinkRed = 3,
    Red = 4,
    Off = 5,
}

impl SignalAspect {
    /// Every aspect, least severe first.
    pub const ALL: [SignalAspect; 6] = [
        SignalAspect::Green,
        SignalAspect::BlinkYellow,
        SignalAspect::Yellow,
        SignalAspect::BlinkRed,
        SignalAspect::Red,
        SignalAspect::Off,
    ];

    /// Number of aspects.
    pub const COUNT: usize = 6;

    /// Identity of [`worst_of`](Self::worst_of): the least severe aspect.
    pub const SAFE: SignalAspect = SignalAspect::Green;

    /// Stable index used by the wire and bit-set encodings.
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<SignalAspect> {
        Self::ALL.get(index as usize).copied()
    }

    /// The more severe of two aspects.
    pub fn worst_of(self, other: SignalAspect) -> SignalAspect {
        self.max(other)
    }

    /// The most severe aspect of the input, or `None` when it is empty.
    pub fn most_severe<I>(aspects: I) -> Option<SignalAspect>
    where
        I: IntoIterator<Item = SignalAspect>,
    {
        aspects.into_iter().reduce(SignalAspect::worst_of)
    }

    pub fn is_blink(self) -> bool {
        matches!(self, SignalAspect::BlinkYellow | SignalAspect::BlinkRed)
    }

    /// Whether the lamp is lit for the given blink phase.
    pub fn is_lit(self, blink_phase_on: bool) -> bool {
        match self {
            SignalAspect::Off => false,
            a if a.is_blink() => blink_phase_on,
            _ => true,
        }
    }

    /// Lowercase name used in data files.
    pub fn name(self) -> &'static str {
        match self {
            SignalAspect::Green => "green",
            SignalAspect::BlinkYellow => "blink_yellow",
            SignalAspect::Yellow => "yellow",
            SignalAspect::BlinkRed => "blink_red",
            SignalAspect::Red => "red",
            SignalAspect::Off => "off",
        }
    }
}

impl std::fmt::Display for SignalAspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when parsing an unknown aspect name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown signal aspect '{0}'")]
pub struct UnknownAspect(pub String);

impl std::str::FromStr for SignalAspect {
    type Err = UnknownAspect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        SignalAspect::ALL
            .into_iter()
            .find(|a| a.name() == lowered)
            .ok_or_else(|| UnknownAspect(s.to_string()))
    }
}
