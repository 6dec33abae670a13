//! Signal events recorded in a fixed-capacity ring buffer.
//!
//! Events are for observers such as debug overlays and tests; the
//! propagation itself never reads them back. When the buffer is full the
//! oldest events are dropped.

use std::collections::VecDeque;

use crate::aspect::SignalAspect;
use crate::id::{BlockPos, ControllerKey, NodeId, Ticks};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A signal-network event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    NodeAdded {
        node: NodeId,
        pos: BlockPos,
        tick: Ticks,
    },
    NodeRemoved {
        node: NodeId,
        pos: BlockPos,
        tick: Ticks,
    },
    ControllerAspectChanged {
        controller: ControllerKey,
        aspect: SignalAspect,
        tick: Ticks,
    },
    /// A receiver's aggregate changed.
    AspectChanged {
        node: NodeId,
        aspect: SignalAspect,
        tick: Ticks,
    },
    ActionMappingChanged {
        node: NodeId,
        aspect: SignalAspect,
        trigger: bool,
        tick: Ticks,
    },
    NeighborsNotified {
        node: NodeId,
        tick: Ticks,
    },
    ClientUpdateSent {
        node: NodeId,
        forced: bool,
        tick: Ticks,
    },
    BindingPruned {
        node: NodeId,
        controller: ControllerKey,
        tick: Ticks,
    },
}

impl SignalEvent {
    pub fn tick(&self) -> Ticks {
        match self {
            SignalEvent::NodeAdded { tick, .. }
            | SignalEvent::NodeRemoved { tick, .. }
            | SignalEvent::ControllerAspectChanged { tick, .. }
            | SignalEvent::AspectChanged { tick, .. }
            | SignalEvent::ActionMappingChanged { tick, .. }
            | SignalEvent::NeighborsNotified { tick, .. }
            | SignalEvent::ClientUpdateSent { tick, .. }
            | SignalEvent::BindingPruned { tick, .. } => *tick,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// Bounded FIFO of recent events. Pushing onto a full buffer evicts the
/// oldest event and counts it as dropped; draining never counts as dropping.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<SignalEvent>,
    capacity: usize,
    evicted: u64,
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, event: SignalEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events lost to eviction since the buffer was created.
    pub fn dropped_count(&self) -> u64 {
        self.evicted
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SignalEvent> + '_ {
        self.events.iter()
    }

    /// Remove and return all events, oldest first.
    pub fn drain(&mut self) -> Vec<SignalEvent> {
        self.events.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
