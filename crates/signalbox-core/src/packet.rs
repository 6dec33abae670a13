//! Wire payloads exchanged with clients and GUIs.
//!
//! Payloads are encoded with `bitcode`. Decoding failures are reported as
//! [`PacketError`] and never panic.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::action::ActionMapping;
use crate::aspect::SignalAspect;
use crate::node::BoxVariant;
use crate::receiver::ReceiverPacket;

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("packet for a {packet:?} box sent to a {target:?} box")]
    VariantMismatch {
        packet: BoxVariant,
        target: BoxVariant,
    },
}

/// Replicated state of a controller box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerPacket {
    pub aspect: SignalAspect,
    pub default_aspect: SignalAspect,
    pub powered_aspect: SignalAspect,
}

/// Full server-to-client snapshot of one box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxPacket {
    pub variant: BoxVariant,
    pub actions: Option<ActionMapping>,
    pub receiver: Option<ReceiverPacket>,
    pub controller: Option<ControllerPacket>,
}

/// An edit submitted from a box's GUI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuiUpdate {
    /// Replace the action mapping.
    Actions(ActionMapping),
    /// Reconfigure a controller box.
    ControllerAspects {
        default_aspect: SignalAspect,
        powered_aspect: SignalAspect,
    },
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PacketError> {
    bitcode::serialize(value).map_err(|e| PacketError::Encode(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PacketError> {
    bitcode::deserialize(bytes).map_err(|e| PacketError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{BlockPos, ControllerKey};

    #[test]
    fn box_packet_survives_encoding() {
        let packet = BoxPacket {
            variant: BoxVariant::Receiver,
            actions: Some(ActionMapping::from_aspects([SignalAspect::Red])),
            receiver: Some(ReceiverPacket {
                aspect: SignalAspect::Red,
                bindings: vec![(ControllerKey(BlockPos::new(1, 2, 3)), SignalAspect::Red)],
            }),
            controller: None,
        };
        let bytes = encode(&packet).unwrap();
        let decoded: BoxPacket = decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn empty_payload_is_a_decode_error() {
        let result: Result<GuiUpdate, _> = decode(&[]);
        assert!(matches!(result, Err(PacketError::Decode(_))));
    }
}
