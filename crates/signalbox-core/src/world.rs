//! The box graph of one logical side, and its tick driver.
//!
//! A [`SignalWorld`] owns the controller registry, every box node, and a
//! position index used to resolve adjacency on demand. All mutation goes
//! through it so that a change and everything it causes (controller
//! fan-out, host block updates, neighbour re-evaluation, replication)
//! completes before the call returns.
//!
//! # Propagation
//!
//! Follow-up work is queued and drained in FIFO order at the end of each
//! public operation, so the queue is always empty between calls. A node
//! propagated more than `max_node_revisits` times in one drain is part of a
//! cycle; its further work is logged and dropped.

use std::collections::{BTreeMap, VecDeque};

use slotmap::{SecondaryMap, SlotMap};

use crate::aspect::SignalAspect;
use crate::config::SignalConfig;
use crate::controller::SignalNetwork;
use crate::event::{EventBuffer, SignalEvent};
use crate::host::BlockHost;
use crate::id::{BlockPos, ControllerKey, Facing, NodeId, Ticks};
use crate::node::{BoxNode, BoxVariant, Capabilities, NO_POWER, NodeContext, NodeTick, Side};
use crate::packet::{self, BoxPacket, GuiUpdate, PacketError};
use crate::receiver::ReceiverError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("a box already exists at {0}")]
    Occupied(BlockPos),
    #[error("no box at {0}")]
    NoBox(BlockPos),
    #[error("box at {0} has no receiver")]
    NotAReceiver(BlockPos),
    #[error("box at {0} has no action mapping")]
    NoActionMapping(BlockPos),
    #[error("unknown {0}")]
    UnknownController(ControllerKey),
    #[error("{0} is already registered")]
    ControllerExists(ControllerKey),
    #[error("operation only valid on the {expected:?} side")]
    WrongSide { expected: Side },
    #[error(transparent)]
    Receiver(#[from] ReceiverError),
    #[error(transparent)]
    Packet(#[from] PacketError),
}

// ---------------------------------------------------------------------------
// Work queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Work {
    /// Notify the host and adjacent boxes, then replicate the node.
    Propagate { node: NodeId, forced: bool },
    /// Recompute a controller box's aspect from its inputs.
    Reevaluate(NodeId),
}

/// Summary of one [`SignalWorld::advance`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvanceResult {
    pub nodes_ticked: usize,
    pub forced_refreshes: usize,
    pub propagation_steps: usize,
}

// ---------------------------------------------------------------------------
// SignalWorld
// ---------------------------------------------------------------------------

pub struct SignalWorld<H: BlockHost> {
    pub(crate) side: Side,
    pub(crate) config: SignalConfig,
    pub(crate) network: SignalNetwork,
    pub(crate) nodes: SlotMap<NodeId, BoxNode>,
    pub(crate) positions: BTreeMap<BlockPos, NodeId>,
    pub(crate) events: EventBuffer,
    pub(crate) pending: VecDeque<Work>,
    pub(crate) tick: Ticks,
    pub(crate) host: H,
}

impl<H: BlockHost> std::fmt::Debug for SignalWorld<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalWorld")
            .field("side", &self.side)
            .field("config", &self.config)
            .field("network", &self.network)
            .field("nodes", &self.nodes.len())
            .field("pending", &self.pending.len())
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

impl<H: BlockHost> SignalWorld<H> {
    pub fn new(side: Side, config: SignalConfig, host: H) -> Self {
        let config = config.sanitized();
        Self {
            side,
            events: EventBuffer::new(config.event_capacity),
            config,
            network: SignalNetwork::new(),
            nodes: SlotMap::with_key(),
            positions: BTreeMap::new(),
            pending: VecDeque::new(),
            tick: 0,
            host,
        }
    }

    /// Server world with default configuration.
    pub fn server(host: H) -> Self {
        Self::new(Side::Server, SignalConfig::default(), host)
    }

    /// Client world with default configuration.
    pub fn client(host: H) -> Self {
        Self::new(Side::Client, SignalConfig::default(), host)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Tick index passed to the most recent [`advance`](Self::advance).
    pub fn tick(&self) -> Ticks {
        self.tick
    }

    pub fn network(&self) -> &SignalNetwork {
        &self.network
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn node(&self, id: NodeId) -> Option<&BoxNode> {
        self.nodes.get(id)
    }

    pub fn id_at(&self, pos: BlockPos) -> Option<NodeId> {
        self.positions.get(&pos).copied()
    }

    pub fn node_at(&self, pos: BlockPos) -> Option<&BoxNode> {
        self.id_at(pos).and_then(|id| self.nodes.get(id))
    }

    /// All nodes in position order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &BoxNode)> + '_ {
        self.positions
            .values()
            .filter_map(|id| self.nodes.get(*id).map(|n| (*id, n)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn events(&self) -> &EventBuffer {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<SignalEvent> {
        self.events.drain()
    }

    /// Queued propagation work. Zero whenever no call is in progress.
    pub fn pending_work(&self) -> usize {
        self.pending.len()
    }

    fn require_side(&self, expected: Side) -> Result<(), WorldError> {
        if self.side == expected {
            Ok(())
        } else {
            Err(WorldError::WrongSide { expected })
        }
    }

    fn require_id(&self, pos: BlockPos) -> Result<NodeId, WorldError> {
        self.id_at(pos).ok_or(WorldError::NoBox(pos))
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Place a box. On the server a controller box also registers its
    /// controller, and neighbours are notified of the placement.
    pub fn add_box(&mut self, pos: BlockPos, variant: BoxVariant) -> Result<NodeId, WorldError> {
        if self.positions.contains_key(&pos) {
            return Err(WorldError::Occupied(pos));
        }
        let owns_controller = variant.capabilities().contains(Capabilities::CONTROLLER);
        let key = ControllerKey(pos);
        if self.side == Side::Server && owns_controller && self.network.contains(key) {
            return Err(WorldError::ControllerExists(key));
        }

        let id = self.nodes.insert(BoxNode::new(pos, variant, &self.config));
        self.positions.insert(pos, id);
        self.events.push(SignalEvent::NodeAdded {
            node: id,
            pos,
            tick: self.tick,
        });
        tracing::debug!(%pos, ?variant, side = ?self.side, "box added");

        if self.side == Side::Server {
            if owns_controller {
                self.network.add_controller(key, variant.localization_tag());
                self.pending.push_back(Work::Reevaluate(id));
            }
            self.pending.push_back(Work::Propagate {
                node: id,
                forced: false,
            });
            self.run_propagation();
        }
        Ok(id)
    }

    /// Remove a box. Its controller (if any) is removed and every receiver
    /// bound to it is unbound; its own registrations are dropped.
    pub fn remove_box(&mut self, pos: BlockPos) -> Option<BoxNode> {
        let id = self.positions.remove(&pos)?;
        let node = self.nodes.remove(id)?;
        self.events.push(SignalEvent::NodeRemoved {
            node: id,
            pos,
            tick: self.tick,
        });
        tracing::debug!(%pos, variant = ?node.variant(), "box removed");

        if self.side == Side::Server {
            self.network.unregister_everywhere(id);
            if let Some(key) = node.controller_key() {
                self.detach_controller(key);
            }
            self.host.notify_neighbors(pos);
            self.reevaluate_adjacent(pos);
            self.run_propagation();
        }
        Some(node)
    }

    // -----------------------------------------------------------------------
    // Free-standing controllers
    // -----------------------------------------------------------------------

    /// Register a controller that is not owned by a box (e.g. a signal block).
    pub fn add_controller(
        &mut self,
        key: ControllerKey,
        name: impl Into<String>,
    ) -> Result<(), WorldError> {
        self.require_side(Side::Server)?;
        if self.network.add_controller(key, name) {
            Ok(())
        } else {
            Err(WorldError::ControllerExists(key))
        }
    }

    /// Remove a free-standing controller. Controllers owned by a box go away
    /// with [`remove_box`](Self::remove_box) instead; for those this returns
    /// `false`.
    pub fn remove_controller(&mut self, key: ControllerKey) -> bool {
        if self.node_at(key.0).is_some_and(|n| n.controller_key() == Some(key)) {
            tracing::warn!(%key, "refusing to remove a box-owned controller");
            return false;
        }
        let removed = self.detach_controller(key);
        self.run_propagation();
        removed
    }

    /// Set a controller's aspect and propagate the consequences.
    pub fn set_controller_aspect(
        &mut self,
        key: ControllerKey,
        aspect: SignalAspect,
    ) -> Result<bool, WorldError> {
        self.require_side(Side::Server)?;
        if !self.network.contains(key) {
            return Err(WorldError::UnknownController(key));
        }
        let changed = self.fan_out(key, aspect);
        self.run_propagation();
        Ok(changed)
    }

    fn detach_controller(&mut self, key: ControllerKey) -> bool {
        let Some(observers) = self.network.remove_controller(key) else {
            return false;
        };
        for observer in observers {
            let Some(receiver) = self.nodes.get_mut(observer).and_then(BoxNode::receiver_mut) else {
                continue;
            };
            if receiver.unbind(key) {
                let aspect = receiver.aspect();
                self.events.push(SignalEvent::AspectChanged {
                    node: observer,
                    aspect,
                    tick: self.tick,
                });
                self.pending.push_back(Work::Propagate {
                    node: observer,
                    forced: false,
                });
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Bindings
    // -----------------------------------------------------------------------

    /// Bind the receiver at `pos` to a controller. Returns whether the
    /// receiver's aggregate changed.
    pub fn bind_receiver(&mut self, pos: BlockPos, key: ControllerKey) -> Result<bool, WorldError> {
        self.require_side(Side::Server)?;
        let id = self.require_id(pos)?;
        let aspect = self
            .network
            .aspect(key)
            .ok_or(WorldError::UnknownController(key))?;
        let receiver = self
            .nodes
            .get_mut(id)
            .and_then(BoxNode::receiver_mut)
            .ok_or(WorldError::NotAReceiver(pos))?;
        let changed = receiver.bind(key, aspect)?;
        let aggregate = receiver.aspect();
        self.network.register(key, id);
        if changed {
            self.events.push(SignalEvent::AspectChanged {
                node: id,
                aspect: aggregate,
                tick: self.tick,
            });
        }
        self.pending.push_back(Work::Propagate {
            node: id,
            forced: false,
        });
        self.run_propagation();
        Ok(changed)
    }

    /// Returns whether the receiver's aggregate changed.
    pub fn unbind_receiver(&mut self, pos: BlockPos, key: ControllerKey) -> Result<bool, WorldError> {
        self.require_side(Side::Server)?;
        let id = self.require_id(pos)?;
        let receiver = self
            .nodes
            .get_mut(id)
            .and_then(BoxNode::receiver_mut)
            .ok_or(WorldError::NotAReceiver(pos))?;
        let changed = receiver.unbind(key);
        let aggregate = receiver.aspect();
        self.network.unregister(key, id);
        if changed {
            self.events.push(SignalEvent::AspectChanged {
                node: id,
                aspect: aggregate,
                tick: self.tick,
            });
        }
        self.pending.push_back(Work::Propagate {
            node: id,
            forced: false,
        });
        self.run_propagation();
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Actions and GUI
    // -----------------------------------------------------------------------

    /// Update one entry of a box's action mapping and propagate the new
    /// output. Returns whether the table changed.
    pub fn do_action_on_aspect(
        &mut self,
        pos: BlockPos,
        aspect: SignalAspect,
        trigger: bool,
    ) -> Result<bool, WorldError> {
        self.require_side(Side::Server)?;
        let id = self.require_id(pos)?;
        let node = self.nodes.get_mut(id).ok_or(WorldError::NoBox(pos))?;
        if node.actions().is_none() {
            return Err(WorldError::NoActionMapping(pos));
        }
        let changed = node.do_action_on_aspect(aspect, trigger);
        if changed {
            self.events.push(SignalEvent::ActionMappingChanged {
                node: id,
                aspect,
                trigger,
                tick: self.tick,
            });
        }
        self.pending.push_back(Work::Propagate {
            node: id,
            forced: false,
        });
        self.run_propagation();
        Ok(changed)
    }

    /// Decode and apply a GUI payload. Neighbours are notified whether or
    /// not the payload changed anything.
    pub fn read_gui_data(&mut self, pos: BlockPos, data: &[u8]) -> Result<bool, WorldError> {
        let update: GuiUpdate = packet::decode(data).inspect_err(|err| {
            tracing::warn!(%pos, %err, "rejected GUI payload");
        })?;
        self.apply_gui(pos, &update)
    }

    pub fn apply_gui(&mut self, pos: BlockPos, update: &GuiUpdate) -> Result<bool, WorldError> {
        self.require_side(Side::Server)?;
        let id = self.require_id(pos)?;
        let node = self.nodes.get_mut(id).ok_or(WorldError::NoBox(pos))?;
        let changed = node.apply_gui(update);
        if node.capabilities().contains(Capabilities::CONTROLLER) {
            self.pending.push_back(Work::Reevaluate(id));
        }
        self.pending.push_back(Work::Propagate {
            node: id,
            forced: false,
        });
        self.run_propagation();
        Ok(changed)
    }

    /// Client side: apply a replicated snapshot produced by the server.
    pub fn apply_update(&mut self, pos: BlockPos, data: &[u8]) -> Result<(), WorldError> {
        self.require_side(Side::Client)?;
        let id = self.require_id(pos)?;
        let packet: BoxPacket = packet::decode(data)?;
        let node = self.nodes.get_mut(id).ok_or(WorldError::NoBox(pos))?;
        node.read_packet(&packet)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn loaded_box(&self, pos: BlockPos) -> Option<NodeId> {
        if !self.host.is_loaded(pos) {
            return None;
        }
        self.id_at(pos)
    }

    /// Whether a loaded box occupies `pos`.
    pub fn is_box_at(&self, pos: BlockPos) -> bool {
        self.loaded_box(pos).is_some()
    }

    /// True iff the neighbour in direction `facing` is a box that accepts aspects.
    pub fn is_connected(&self, pos: BlockPos, facing: Facing) -> bool {
        if self.node_at(pos).is_none() {
            return false;
        }
        self.loaded_box(pos.offset(facing))
            .and_then(|id| self.nodes.get(id))
            .is_some_and(BoxNode::can_receive_aspect)
    }

    /// Redstone level the box at `pos` emits towards its neighbour in
    /// direction `facing`. Never powers a neighbouring box.
    pub fn power_output(&self, pos: BlockPos, facing: Facing) -> u8 {
        match self.node_at(pos) {
            Some(node) => node.power_output(self.is_box_at(pos.offset(facing))),
            None => NO_POWER,
        }
    }

    pub fn is_emitting_redstone(&self, pos: BlockPos) -> bool {
        self.node_at(pos).is_some_and(BoxNode::is_emitting_redstone)
    }

    /// Aspect the box at `pos` offers to adjacent boxes.
    pub fn box_signal_aspect(&self, pos: BlockPos) -> Option<SignalAspect> {
        self.node_at(pos).and_then(BoxNode::box_signal_aspect)
    }

    /// Aspect that drives the box's action, for external trigger providers.
    pub fn trigger_aspect(&self, pos: BlockPos) -> Option<SignalAspect> {
        self.node_at(pos).and_then(BoxNode::trigger_aspect)
    }

    /// Worst aspect offered by loaded, transferring boxes around `pos`.
    fn neighbor_aspect(&self, pos: BlockPos) -> Option<SignalAspect> {
        SignalAspect::most_severe(pos.neighbors().filter_map(|(_, p)| {
            self.loaded_box(p)
                .and_then(|id| self.nodes.get(id))
                .and_then(BoxNode::box_signal_aspect)
        }))
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advance every node by one tick, in position order.
    ///
    /// Each node's consequences are fully propagated before the next node
    /// advances.
    pub fn advance(&mut self, tick: Ticks) -> AdvanceResult {
        self.tick = tick;
        let mut result = AdvanceResult::default();

        let ids: Vec<NodeId> = self.positions.values().copied().collect();
        for id in ids {
            let Some(pos) = self.nodes.get(id).map(BoxNode::pos) else {
                continue;
            };
            let server = self.side == Side::Server;
            let powered = server && self.host.is_powered(pos);
            let neighbor_aspect = if server {
                self.neighbor_aspect(pos)
            } else {
                None
            };
            let ctx = NodeContext {
                side: self.side,
                network: &self.network,
                powered,
                neighbor_aspect,
                forced_refresh_period: self.config.forced_refresh_period,
            };
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            let outcome = node.advance(tick, &ctx);
            result.nodes_ticked += 1;
            if outcome.forced_refresh {
                result.forced_refreshes += 1;
            }
            self.apply_tick(id, outcome);
            result.propagation_steps += self.run_propagation();
        }
        result
    }

    fn apply_tick(&mut self, id: NodeId, outcome: NodeTick) {
        for controller in outcome.poll.pruned {
            self.events.push(SignalEvent::BindingPruned {
                node: id,
                controller,
                tick: self.tick,
            });
        }
        if outcome.poll.changed {
            if let Some(aspect) = self.nodes.get(id).and_then(BoxNode::trigger_aspect) {
                self.events.push(SignalEvent::AspectChanged {
                    node: id,
                    aspect,
                    tick: self.tick,
                });
            }
            self.pending.push_back(Work::Propagate {
                node: id,
                forced: false,
            });
        }
        if let Some(aspect) = outcome.controller_aspect {
            let key = self.nodes.get(id).and_then(BoxNode::controller_key);
            if let Some(key) = key {
                if self.fan_out(key, aspect) {
                    self.pending.push_back(Work::Propagate {
                        node: id,
                        forced: false,
                    });
                }
            }
        }
        if outcome.forced_refresh {
            self.pending.push_back(Work::Propagate {
                node: id,
                forced: true,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Propagation
    // -----------------------------------------------------------------------

    /// Set a controller's aspect and deliver it to every observer's receiver.
    /// Receivers whose aggregate changed are queued for propagation.
    fn fan_out(&mut self, key: ControllerKey, aspect: SignalAspect) -> bool {
        let tick = self.tick;
        let nodes = &mut self.nodes;
        let events = &mut self.events;
        let pending = &mut self.pending;
        let mut deliver = |observer: NodeId, controller: ControllerKey, aspect: SignalAspect| {
            // Observers are weak: a removed node simply no longer resolves.
            let Some(receiver) = nodes.get_mut(observer).and_then(BoxNode::receiver_mut) else {
                return;
            };
            if receiver.on_controller_aspect_change(controller, aspect) {
                events.push(SignalEvent::AspectChanged {
                    node: observer,
                    aspect: receiver.aspect(),
                    tick,
                });
                pending.push_back(Work::Propagate {
                    node: observer,
                    forced: false,
                });
            }
        };
        let changed = self.network.set_aspect(key, aspect, &mut deliver);
        if changed {
            self.events.push(SignalEvent::ControllerAspectChanged {
                controller: key,
                aspect,
                tick,
            });
        }
        changed
    }

    /// Drain the queue completely. Returns steps taken.
    fn run_propagation(&mut self) -> usize {
        let limit = self.config.max_node_revisits;
        let mut visits: SecondaryMap<NodeId, usize> = SecondaryMap::new();
        let mut steps = 0;
        while let Some(work) = self.pending.pop_front() {
            let node = match work {
                Work::Propagate { node, .. } | Work::Reevaluate(node) => node,
            };
            let count = visits.entry(node).map(|e| e.or_insert(0));
            if let Some(count) = count {
                *count += 1;
                if *count > limit {
                    tracing::error!(?node, limit, ?work, "propagation cycle detected, dropping work");
                    continue;
                }
            }
            steps += 1;
            match work {
                Work::Propagate { node, forced } => {
                    self.update_neighbors(node);
                    self.send_update(node, forced);
                }
                Work::Reevaluate(node) => self.reevaluate(node),
            }
        }
        steps
    }

    /// Notify the host's block-update mechanism and every adjacent box.
    fn update_neighbors(&mut self, id: NodeId) {
        let Some(pos) = self.nodes.get(id).map(BoxNode::pos) else {
            return;
        };
        self.host.notify_neighbors(pos);
        self.events.push(SignalEvent::NeighborsNotified {
            node: id,
            tick: self.tick,
        });
        self.reevaluate_adjacent(pos);
    }

    /// Queue re-evaluation for adjacent boxes that react to their neighbours.
    fn reevaluate_adjacent(&mut self, pos: BlockPos) {
        for (_, neighbor) in pos.neighbors() {
            let Some(nid) = self.loaded_box(neighbor) else {
                continue;
            };
            let reacts = self
                .nodes
                .get(nid)
                .is_some_and(|n| n.capabilities().contains(Capabilities::CONTROLLER));
            if reacts {
                self.pending.push_back(Work::Reevaluate(nid));
            }
        }
    }

    fn reevaluate(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let (Some(source), Some(key)) = (node.source().copied(), node.controller_key()) else {
            return;
        };
        let pos = node.pos();
        let desired = source.desired_aspect(self.host.is_powered(pos), self.neighbor_aspect(pos));
        if self.fan_out(key, desired) {
            self.pending.push_back(Work::Propagate {
                node: id,
                forced: false,
            });
        }
    }

    fn send_update(&mut self, id: NodeId, forced: bool) {
        if self.side != Side::Server {
            return;
        }
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let pos = node.pos();
        match packet::encode(&node.write_packet(&self.network)) {
            Ok(bytes) => {
                self.host.send_update(pos, bytes);
                self.events.push(SignalEvent::ClientUpdateSent {
                    node: id,
                    forced,
                    tick: self.tick,
                });
            }
            Err(err) => tracing::warn!(%pos, %err, "failed to encode box update"),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
