//! Box nodes: small owned components composed per variant.
//!
//! A [`BoxNode`] is one addressable participant in the box graph. Which
//! components it carries is fixed at construction by its [`BoxVariant`]
//! and summarised as a [`Capabilities`] set. Nodes never hold references
//! to their neighbours; the [`SignalWorld`](crate::world::SignalWorld)
//! looks adjacency up on demand and passes what a node needs in a
//! [`NodeContext`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::action::ActionMapping;
use crate::aspect::SignalAspect;
use crate::config::SignalConfig;
use crate::controller::SignalNetwork;
use crate::id::{BlockPos, ControllerKey, Ticks};
use crate::packet::{BoxPacket, ControllerPacket, GuiUpdate, PacketError};
use crate::receiver::{ReceiverPoll, ReceiverRecord, SimpleSignalReceiver};

/// Redstone level of an inactive output.
pub const NO_POWER: u8 = 0;
/// Redstone level of an active output.
pub const FULL_POWER: u8 = 15;

// ---------------------------------------------------------------------------
// Variants and capabilities
// ---------------------------------------------------------------------------

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Aggregates aspects from bound controllers.
        const RECEIVER = 1;
        /// Maps aspects to an on/off action.
        const ACTION_MAPPING = 1 << 1;
        /// Emits redstone power.
        const POWER_OUTPUT = 1 << 2;
        /// Owns a controller keyed by its own position.
        const CONTROLLER = 1 << 3;
        /// Offers its aspect to adjacent boxes.
        const TRANSFERS_ASPECT = 1 << 4;
        /// Accepts aspects from adjacent boxes.
        const RECEIVES_ASPECT = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxVariant {
    /// Listens to remote controllers and drives redstone from their aspect.
    Receiver,
    /// Turns redstone input and adjacent box aspects into a controller aspect.
    Controller,
}

impl BoxVariant {
    pub fn capabilities(self) -> Capabilities {
        match self {
            BoxVariant::Receiver => {
                Capabilities::RECEIVER
                    | Capabilities::ACTION_MAPPING
                    | Capabilities::POWER_OUTPUT
                    | Capabilities::TRANSFERS_ASPECT
            }
            BoxVariant::Controller => Capabilities::CONTROLLER | Capabilities::RECEIVES_ASPECT,
        }
    }

    pub fn localization_tag(self) -> &'static str {
        match self {
            BoxVariant::Receiver => "signalbox.receiver",
            BoxVariant::Controller => "signalbox.controller",
        }
    }
}

/// Which half of a client/server pair a world runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Server,
    Client,
}

// ---------------------------------------------------------------------------
// Controller component
// ---------------------------------------------------------------------------

/// Configuration of a controller box. The live aspect lives in the
/// [`SignalNetwork`]; `aspect` here is only the client's replicated copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSource {
    pub default_aspect: SignalAspect,
    pub powered_aspect: SignalAspect,
    aspect: SignalAspect,
}

impl Default for ControllerSource {
    fn default() -> Self {
        Self {
            default_aspect: SignalAspect::Green,
            powered_aspect: SignalAspect::Red,
            aspect: SignalAspect::Green,
        }
    }
}

impl ControllerSource {
    /// Aspect the controller should show given its inputs.
    pub fn desired_aspect(&self, powered: bool, neighbor: Option<SignalAspect>) -> SignalAspect {
        let own = if powered {
            self.powered_aspect
        } else {
            self.default_aspect
        };
        neighbor.map_or(own, |n| own.worst_of(n))
    }
}

/// Persisted controller-box settings plus the controller's aspect at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerRecord {
    pub name: String,
    pub aspect: SignalAspect,
    pub default_aspect: SignalAspect,
    pub powered_aspect: SignalAspect,
}

// ---------------------------------------------------------------------------
// Node record
// ---------------------------------------------------------------------------

/// Persisted form of a box, the equivalent of a block-entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub pos: BlockPos,
    pub variant: BoxVariant,
    pub clock: Ticks,
    pub actions: Option<ActionMapping>,
    pub receiver: Option<ReceiverRecord>,
    pub controller: Option<ControllerRecord>,
}

// ---------------------------------------------------------------------------
// Tick context and outcome
// ---------------------------------------------------------------------------

/// Everything a node may read while advancing one tick.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub side: Side,
    pub network: &'a SignalNetwork,
    /// Redstone input at the node.
    pub powered: bool,
    /// Worst aspect offered by adjacent boxes that transfer aspects.
    pub neighbor_aspect: Option<SignalAspect>,
    pub forced_refresh_period: Ticks,
}

/// What a node asks its world to do after advancing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTick {
    pub poll: ReceiverPoll,
    /// Neighbours must be notified and a full update replicated.
    pub forced_refresh: bool,
    /// New aspect for the node's own controller, if it owns one.
    pub controller_aspect: Option<SignalAspect>,
}

// ---------------------------------------------------------------------------
// BoxNode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BoxNode {
    pos: BlockPos,
    variant: BoxVariant,
    capabilities: Capabilities,
    clock: Ticks,
    receiver: Option<SimpleSignalReceiver>,
    actions: Option<ActionMapping>,
    source: Option<ControllerSource>,
}

impl BoxNode {
    pub fn new(pos: BlockPos, variant: BoxVariant, config: &SignalConfig) -> Self {
        let capabilities = variant.capabilities();
        let receiver = capabilities
            .contains(Capabilities::RECEIVER)
            .then(|| SimpleSignalReceiver::new(variant.localization_tag(), pos, config));
        let actions = capabilities
            .contains(Capabilities::ACTION_MAPPING)
            .then(ActionMapping::default);
        let source = capabilities
            .contains(Capabilities::CONTROLLER)
            .then(ControllerSource::default);
        Self {
            pos,
            variant,
            capabilities,
            clock: 0,
            receiver,
            actions,
            source,
        }
    }

    pub fn pos(&self) -> BlockPos {
        self.pos
    }

    pub fn variant(&self) -> BoxVariant {
        self.variant
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Number of ticks this node has been advanced.
    pub fn clock(&self) -> Ticks {
        self.clock
    }

    pub fn receiver(&self) -> Option<&SimpleSignalReceiver> {
        self.receiver.as_ref()
    }

    pub fn receiver_mut(&mut self) -> Option<&mut SimpleSignalReceiver> {
        self.receiver.as_mut()
    }

    pub fn actions(&self) -> Option<ActionMapping> {
        self.actions
    }

    pub fn source(&self) -> Option<&ControllerSource> {
        self.source.as_ref()
    }

    /// Key of the controller this node owns, if any.
    pub fn controller_key(&self) -> Option<ControllerKey> {
        self.source.map(|_| ControllerKey(self.pos))
    }

    pub fn can_receive_aspect(&self) -> bool {
        self.capabilities.contains(Capabilities::RECEIVES_ASPECT)
    }

    pub fn can_transfer_aspect(&self) -> bool {
        self.capabilities.contains(Capabilities::TRANSFERS_ASPECT)
    }

    /// The receiver's aggregate, used as the trigger for action checks.
    pub fn trigger_aspect(&self) -> Option<SignalAspect> {
        self.receiver.as_ref().map(SimpleSignalReceiver::aspect)
    }

    /// Aspect offered to adjacent boxes.
    pub fn box_signal_aspect(&self) -> Option<SignalAspect> {
        if !self.can_transfer_aspect() {
            return None;
        }
        self.trigger_aspect()
    }

    /// Client-side copy of the owned controller's aspect.
    pub fn displayed_controller_aspect(&self) -> Option<SignalAspect> {
        self.source.map(|s| s.aspect)
    }

    pub fn does_action_on_aspect(&self, aspect: SignalAspect) -> bool {
        self.actions.is_some_and(|a| a.does_action_on_aspect(aspect))
    }

    /// Returns whether the table changed. Nodes without a mapping ignore the call.
    pub fn do_action_on_aspect(&mut self, aspect: SignalAspect, trigger: bool) -> bool {
        self.actions
            .as_mut()
            .is_some_and(|a| a.do_action_on_aspect(aspect, trigger))
    }

    /// Whether the action fires for the current aggregate, regardless of side.
    pub fn is_emitting_redstone(&self) -> bool {
        self.capabilities.contains(Capabilities::POWER_OUTPUT)
            && self
                .trigger_aspect()
                .is_some_and(|a| self.does_action_on_aspect(a))
    }

    /// Redstone level towards a neighbour. Never powers another box.
    pub fn power_output(&self, neighbor_is_box: bool) -> u8 {
        if neighbor_is_box || !self.is_emitting_redstone() {
            NO_POWER
        } else {
            FULL_POWER
        }
    }

    /// Advance one tick.
    ///
    /// The clock is bumped first, so a fresh node forces its first refresh
    /// when the clock reaches `forced_refresh_period`.
    pub fn advance(&mut self, tick: Ticks, ctx: &NodeContext<'_>) -> NodeTick {
        self.clock = self.clock.wrapping_add(1);

        if ctx.side == Side::Client {
            if let Some(receiver) = self.receiver.as_mut() {
                receiver.tick_client();
            }
            return NodeTick::default();
        }

        let poll = self
            .receiver
            .as_mut()
            .map(|r| r.tick_server(ctx.network))
            .unwrap_or_default();
        let controller_aspect = self
            .source
            .map(|s| s.desired_aspect(ctx.powered, ctx.neighbor_aspect));
        let forced_refresh = self.clock % ctx.forced_refresh_period.max(1) == 0;
        if forced_refresh {
            tracing::trace!(pos = %self.pos, tick, "forced refresh");
        }
        NodeTick {
            poll,
            forced_refresh,
            controller_aspect,
        }
    }

    /// Returns whether anything changed.
    pub fn apply_gui(&mut self, update: &GuiUpdate) -> bool {
        match update {
            GuiUpdate::Actions(mapping) => match self.actions.as_mut() {
                Some(actions) if *actions != *mapping => {
                    *actions = *mapping;
                    true
                }
                _ => false,
            },
            GuiUpdate::ControllerAspects {
                default_aspect,
                powered_aspect,
            } => match self.source.as_mut() {
                Some(source)
                    if source.default_aspect != *default_aspect
                        || source.powered_aspect != *powered_aspect =>
                {
                    source.default_aspect = *default_aspect;
                    source.powered_aspect = *powered_aspect;
                    true
                }
                _ => false,
            },
        }
    }

    // -- Persistence --

    pub fn write_record(&self, network: &SignalNetwork) -> BoxRecord {
        let controller = self.source.map(|s| {
            let key = ControllerKey(self.pos);
            ControllerRecord {
                name: network
                    .controller(key)
                    .map(|c| c.name())
                    .unwrap_or(self.variant.localization_tag())
                    .to_string(),
                aspect: network.aspect(key).unwrap_or(s.aspect),
                default_aspect: s.default_aspect,
                powered_aspect: s.powered_aspect,
            }
        });
        BoxRecord {
            pos: self.pos,
            variant: self.variant,
            clock: self.clock,
            actions: self.actions,
            receiver: self.receiver.as_ref().map(SimpleSignalReceiver::write_record),
            controller,
        }
    }

    /// Rebuild a node from its record. Receiver bindings whose controller
    /// is not in `network` are dropped and returned.
    pub fn from_record(
        record: &BoxRecord,
        config: &SignalConfig,
        network: &SignalNetwork,
    ) -> (Self, Vec<ControllerKey>) {
        let mut node = Self::new(record.pos, record.variant, config);
        node.clock = record.clock;
        if let (Some(actions), Some(saved)) = (node.actions.as_mut(), record.actions) {
            *actions = saved;
        }
        let mut dropped = Vec::new();
        if let (Some(receiver), Some(saved)) = (node.receiver.as_mut(), record.receiver.as_ref()) {
            dropped = receiver.read_record(saved, |k| network.contains(k));
        }
        if let (Some(source), Some(saved)) = (node.source.as_mut(), record.controller.as_ref()) {
            source.default_aspect = saved.default_aspect;
            source.powered_aspect = saved.powered_aspect;
            source.aspect = saved.aspect;
        }
        (node, dropped)
    }

    // -- Replication --

    pub fn write_packet(&self, network: &SignalNetwork) -> BoxPacket {
        BoxPacket {
            variant: self.variant,
            actions: self.actions,
            receiver: self.receiver.as_ref().map(SimpleSignalReceiver::write_packet),
            controller: self.source.map(|s| ControllerPacket {
                aspect: network.aspect(ControllerKey(self.pos)).unwrap_or(s.aspect),
                default_aspect: s.default_aspect,
                powered_aspect: s.powered_aspect,
            }),
        }
    }

    /// Apply a replicated snapshot. Only meaningful on the client.
    pub fn read_packet(&mut self, packet: &BoxPacket) -> Result<(), PacketError> {
        if packet.variant != self.variant {
            return Err(PacketError::VariantMismatch {
                packet: packet.variant,
                target: self.variant,
            });
        }
        if let (Some(actions), Some(incoming)) = (self.actions.as_mut(), packet.actions) {
            *actions = incoming;
        }
        if let (Some(receiver), Some(incoming)) = (self.receiver.as_mut(), packet.receiver.as_ref()) {
            receiver.read_packet(incoming);
        }
        if let (Some(source), Some(incoming)) = (self.source.as_mut(), packet.controller.as_ref()) {
            source.aspect = incoming.aspect;
            source.default_aspect = incoming.default_aspect;
            source.powered_aspect = incoming.powered_aspect;
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SignalConfig {
        SignalConfig::default()
    }

    fn receiver_box() -> BoxNode {
        BoxNode::new(BlockPos::new(0, 64, 0), BoxVariant::Receiver, &config())
    }

    fn server_ctx(network: &SignalNetwork) -> NodeContext<'_> {
        NodeContext {
            side: Side::Server,
            network,
            powered: false,
            neighbor_aspect: None,
            forced_refresh_period: 512,
        }
    }

    fn red_receiver(network: &mut SignalNetwork) -> BoxNode {
        let key = ControllerKey(BlockPos::new(10, 64, 0));
        network.add_controller(key, "distant");
        network.restore_aspect(key, SignalAspect::Red);
        let mut node = receiver_box();
        node.receiver_mut().unwrap().bind(key, SignalAspect::Red).unwrap();
        node
    }

    #[test]
    fn variants_select_components() {
        let receiver = receiver_box();
        assert!(receiver.receiver().is_some());
        assert!(receiver.actions().is_some());
        assert!(receiver.source().is_none());
        assert!(receiver.can_transfer_aspect());
        assert!(!receiver.can_receive_aspect());

        let controller = BoxNode::new(BlockPos::default(), BoxVariant::Controller, &config());
        assert!(controller.receiver().is_none());
        assert!(controller.actions().is_none());
        assert_eq!(controller.controller_key(), Some(ControllerKey(BlockPos::default())));
        assert!(controller.can_receive_aspect());
        assert!(!controller.can_transfer_aspect());
    }

    #[test]
    fn box_neighbor_never_gets_power() {
        let mut network = SignalNetwork::new();
        let mut node = red_receiver(&mut network);
        node.do_action_on_aspect(SignalAspect::Red, true);
        assert!(node.is_emitting_redstone());
        assert_eq!(node.power_output(true), NO_POWER);
        assert_eq!(node.power_output(false), FULL_POWER);
    }

    #[test]
    fn power_follows_action_mapping() {
        let mut network = SignalNetwork::new();
        let mut node = red_receiver(&mut network);
        assert_eq!(node.power_output(false), NO_POWER);
        node.do_action_on_aspect(SignalAspect::Red, true);
        assert_eq!(node.power_output(false), FULL_POWER);
        node.do_action_on_aspect(SignalAspect::Red, false);
        assert_eq!(node.power_output(false), NO_POWER);
    }

    #[test]
    fn controller_box_never_emits() {
        let node = BoxNode::new(BlockPos::default(), BoxVariant::Controller, &config());
        assert!(!node.is_emitting_redstone());
        assert_eq!(node.power_output(false), NO_POWER);
        assert_eq!(node.box_signal_aspect(), None);
    }

    #[test]
    fn forced_refresh_on_period_multiples() {
        let network = SignalNetwork::new();
        let ctx = server_ctx(&network);
        let mut node = receiver_box();
        let mut refreshed_at = Vec::new();
        for tick in 1..=1100 {
            if node.advance(tick, &ctx).forced_refresh {
                refreshed_at.push(node.clock());
            }
        }
        assert_eq!(refreshed_at, vec![512, 1024]);
    }

    #[test]
    fn client_advance_is_presentation_only() {
        let mut network = SignalNetwork::new();
        let mut node = red_receiver(&mut network);
        let key = ControllerKey(BlockPos::new(10, 64, 0));
        network.restore_aspect(key, SignalAspect::Green);

        let ctx = NodeContext {
            side: Side::Client,
            ..server_ctx(&network)
        };
        for tick in 1..=600 {
            assert_eq!(node.advance(tick, &ctx), NodeTick::default());
        }
        assert_eq!(node.trigger_aspect(), Some(SignalAspect::Red));
    }

    #[test]
    fn controller_desired_aspect_combines_inputs() {
        let source = ControllerSource::default();
        assert_eq!(source.desired_aspect(false, None), SignalAspect::Green);
        assert_eq!(source.desired_aspect(true, None), SignalAspect::Red);
        assert_eq!(
            source.desired_aspect(false, Some(SignalAspect::Yellow)),
            SignalAspect::Yellow
        );
        assert_eq!(
            source.desired_aspect(true, Some(SignalAspect::Yellow)),
            SignalAspect::Red
        );
    }

    #[test]
    fn gui_updates_only_matching_component() {
        let mut receiver = receiver_box();
        let red_only = ActionMapping::from_aspects([SignalAspect::Red]);
        assert!(receiver.apply_gui(&GuiUpdate::Actions(red_only)));
        assert!(!receiver.apply_gui(&GuiUpdate::Actions(red_only)));
        assert!(!receiver.apply_gui(&GuiUpdate::ControllerAspects {
            default_aspect: SignalAspect::Yellow,
            powered_aspect: SignalAspect::Red,
        }));
        assert_eq!(receiver.actions(), Some(red_only));
    }

    #[test]
    fn record_round_trip() {
        let mut network = SignalNetwork::new();
        let mut node = red_receiver(&mut network);
        node.do_action_on_aspect(SignalAspect::Yellow, true);
        let record = node.write_record(&network);

        let (restored, dropped) = BoxNode::from_record(&record, &config(), &network);
        assert!(dropped.is_empty());
        assert_eq!(restored.write_record(&network), record);
        assert_eq!(restored.trigger_aspect(), Some(SignalAspect::Red));
    }

    #[test]
    fn packet_variant_mismatch_rejected() {
        let network = SignalNetwork::new();
        let controller = BoxNode::new(BlockPos::default(), BoxVariant::Controller, &config());
        let packet = controller.write_packet(&network);
        let mut receiver = receiver_box();
        assert!(matches!(
            receiver.read_packet(&packet),
            Err(PacketError::VariantMismatch { .. })
        ));
    }
}
