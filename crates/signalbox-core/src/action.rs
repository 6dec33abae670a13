//! Aspect-to-trigger table deciding when a box emits power.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::aspect::SignalAspect;

bitflags! {
    /// One bit per aspect, at [`SignalAspect::index`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct AspectBits: u8 {
        const GREEN = 1;
        const BLINK_YELLOW = 1 << 1;
        const YELLOW = 1 << 2;
        const BLINK_RED = 1 << 3;
        const RED = 1 << 4;
        const OFF = 1 << 5;
    }
}

impl AspectBits {
    fn of(aspect: SignalAspect) -> Self {
        Self::from_bits_truncate(1 << aspect.index())
    }
}

/// Set of aspects on which a box performs its action.
///
/// Serialized as its raw bits; bits beyond the last aspect are discarded on
/// decode, so a payload can never store an aspect that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct ActionMapping(AspectBits);

impl Default for ActionMapping {
    /// New boxes act on GREEN only.
    fn default() -> Self {
        Self(AspectBits::GREEN)
    }
}

impl From<u8> for ActionMapping {
    fn from(bits: u8) -> Self {
        Self::from_bits(bits)
    }
}

impl From<ActionMapping> for u8 {
    fn from(mapping: ActionMapping) -> Self {
        mapping.bits()
    }
}

impl ActionMapping {
    pub fn empty() -> Self {
        Self(AspectBits::empty())
    }

    pub fn from_aspects<I: IntoIterator<Item = SignalAspect>>(aspects: I) -> Self {
        Self(
            aspects
                .into_iter()
                .fold(AspectBits::empty(), |bits, a| bits | AspectBits::of(a)),
        )
    }

    /// Build from raw bits; bits beyond the last aspect are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(AspectBits::from_bits_truncate(bits))
    }

    pub fn bits(self) -> u8 {
        self.0.bits()
    }

    pub fn does_action_on_aspect(self, aspect: SignalAspect) -> bool {
        self.0.contains(AspectBits::of(aspect))
    }

    /// Enable or disable the action for one aspect. Returns whether the table changed.
    pub fn do_action_on_aspect(&mut self, aspect: SignalAspect, trigger: bool) -> bool {
        let before = self.0;
        self.0.set(AspectBits::of(aspect), trigger);
        before != self.0
    }

    pub fn aspects(self) -> impl Iterator<Item = SignalAspect> {
        SignalAspect::ALL
            .into_iter()
            .filter(move |a| self.does_action_on_aspect(*a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_acts_on_green_only() {
        let mapping = ActionMapping::default();
        assert!(mapping.does_action_on_aspect(SignalAspect::Green));
        for a in &SignalAspect::ALL[1..] {
            assert!(!mapping.does_action_on_aspect(*a));
        }
    }

    #[test]
    fn toggle_reports_change() {
        let mut mapping = ActionMapping::empty();
        assert!(mapping.do_action_on_aspect(SignalAspect::Red, true));
        assert!(!mapping.do_action_on_aspect(SignalAspect::Red, true));
        assert!(mapping.does_action_on_aspect(SignalAspect::Red));
        assert!(mapping.do_action_on_aspect(SignalAspect::Red, false));
        assert!(!mapping.does_action_on_aspect(SignalAspect::Red));
    }

    #[test]
    fn from_bits_masks_unknown_bits() {
        let mapping = ActionMapping::from_bits(0xFF);
        assert_eq!(mapping.bits(), 0b0011_1111);
        assert_eq!(mapping.aspects().count(), SignalAspect::COUNT);
    }

    #[test]
    fn flag_bits_follow_aspect_index() {
        for a in SignalAspect::ALL {
            assert_eq!(AspectBits::of(a).bits(), 1 << a.index());
        }
    }

    #[test]
    fn decoded_mapping_drops_high_bits() {
        let bytes = bitcode::serialize(&0b1101_0001u8).unwrap();
        let mapping: ActionMapping = bitcode::deserialize(&bytes).unwrap();
        assert_eq!(mapping, ActionMapping::from_aspects([SignalAspect::Green, SignalAspect::Red]));
        assert_eq!(mapping.bits(), 0b0001_0001);
    }

    #[test]
    fn aspects_lists_enabled_in_order() {
        let mapping = ActionMapping::from_aspects([SignalAspect::Red, SignalAspect::Yellow]);
        let listed: Vec<_> = mapping.aspects().collect();
        assert_eq!(listed, vec![SignalAspect::Yellow, SignalAspect::Red]);
    }
}
