//! Per-box aggregation of controller aspects.
//!
//! A [`SimpleSignalReceiver`] remembers the last aspect reported by each
//! controller it is bound to and exposes the worst of them. Push
//! notifications keep it current; [`tick_server`](SimpleSignalReceiver::tick_server)
//! re-reads the registry as a backstop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aspect::SignalAspect;
use crate::config::SignalConfig;
use crate::controller::SignalNetwork;
use crate::id::{BlockPos, ControllerKey, Ticks};

/// Aggregate reported by a receiver with no bindings.
pub const UNBOUND_ASPECT: SignalAspect = SignalAspect::Off;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiverError {
    #[error("receiver at {owner} already bound to {capacity} controllers")]
    Full { owner: BlockPos, capacity: usize },
}

/// Persisted form of a receiver, embedded in its box's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverRecord {
    pub name: String,
    pub owner: BlockPos,
    pub bindings: Vec<(ControllerKey, SignalAspect)>,
}

/// Replicated form of a receiver. The client applies it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverPacket {
    pub aspect: SignalAspect,
    pub bindings: Vec<(ControllerKey, SignalAspect)>,
}

/// Outcome of a server-side poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverPoll {
    pub changed: bool,
    /// Bindings dropped because their controller no longer exists.
    pub pruned: Vec<ControllerKey>,
}

#[derive(Debug, Clone)]
pub struct SimpleSignalReceiver {
    name: String,
    owner: BlockPos,
    capacity: usize,
    bindings: BTreeMap<ControllerKey, SignalAspect>,
    aspect: SignalAspect,
    blink_period: Ticks,
    client_ticks: Ticks,
    blink_on: bool,
}

impl SimpleSignalReceiver {
    pub fn new(name: impl Into<String>, owner: BlockPos, config: &SignalConfig) -> Self {
        Self {
            name: name.into(),
            owner,
            capacity: config.max_bindings.max(1),
            bindings: BTreeMap::new(),
            aspect: UNBOUND_ASPECT,
            blink_period: config.blink_period.max(1),
            client_ticks: 0,
            blink_on: true,
        }
    }

    /// Localization tag of the owning box.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> BlockPos {
        self.owner
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The cached aggregate. Reading never recomputes.
    pub fn aspect(&self) -> SignalAspect {
        self.aspect
    }

    pub fn bindings(&self) -> impl Iterator<Item = (ControllerKey, SignalAspect)> + '_ {
        self.bindings.iter().map(|(k, a)| (*k, *a))
    }

    pub fn is_bound_to(&self, key: ControllerKey) -> bool {
        self.bindings.contains_key(&key)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Whether blinking aspects are currently shown lit on the client.
    pub fn is_blink_lit(&self) -> bool {
        self.aspect.is_lit(self.blink_on)
    }

    /// Bind to a controller with its current aspect. Returns whether the
    /// aggregate changed. Re-binding an existing key just refreshes its aspect.
    pub fn bind(&mut self, key: ControllerKey, aspect: SignalAspect) -> Result<bool, ReceiverError> {
        if !self.bindings.contains_key(&key) && self.bindings.len() >= self.capacity {
            return Err(ReceiverError::Full {
                owner: self.owner,
                capacity: self.capacity,
            });
        }
        self.bindings.insert(key, aspect);
        Ok(self.recompute())
    }

    /// Returns whether the aggregate changed.
    pub fn unbind(&mut self, key: ControllerKey) -> bool {
        if self.bindings.remove(&key).is_none() {
            return false;
        }
        self.recompute()
    }

    /// Record a pushed aspect change. Unbound controllers are ignored.
    /// Returns whether the aggregate changed.
    pub fn on_controller_aspect_change(&mut self, key: ControllerKey, aspect: SignalAspect) -> bool {
        match self.bindings.get_mut(&key) {
            Some(entry) if *entry != aspect => {
                *entry = aspect;
                self.recompute()
            }
            _ => false,
        }
    }

    /// Re-read every bound controller from the registry and recompute.
    pub fn tick_server(&mut self, network: &SignalNetwork) -> ReceiverPoll {
        let mut pruned = Vec::new();
        for (key, entry) in self.bindings.iter_mut() {
            match network.aspect(*key) {
                Some(aspect) => *entry = aspect,
                None => pruned.push(*key),
            }
        }
        for key in &pruned {
            self.bindings.remove(key);
            tracing::debug!(owner = %self.owner, controller = %key, "pruned stale binding");
        }
        ReceiverPoll {
            changed: self.recompute(),
            pruned,
        }
    }

    /// Client side: advance presentation state only.
    pub fn tick_client(&mut self) {
        self.client_ticks = self.client_ticks.wrapping_add(1);
        if self.client_ticks % self.blink_period == 0 {
            self.blink_on = !self.blink_on;
        }
    }

    fn recompute(&mut self) -> bool {
        let aggregate =
            SignalAspect::most_severe(self.bindings.values().copied()).unwrap_or(UNBOUND_ASPECT);
        let changed = aggregate != self.aspect;
        self.aspect = aggregate;
        changed
    }

    // -- Persistence --

    pub fn write_record(&self) -> ReceiverRecord {
        ReceiverRecord {
            name: self.name.clone(),
            owner: self.owner,
            bindings: self.bindings().collect(),
        }
    }

    /// Restore bindings from a record, dropping any whose controller does not
    /// exist. Returns the dropped keys.
    pub fn read_record(
        &mut self,
        record: &ReceiverRecord,
        exists: impl Fn(ControllerKey) -> bool,
    ) -> Vec<ControllerKey> {
        self.name = record.name.clone();
        self.bindings.clear();
        let mut dropped = Vec::new();
        for &(key, aspect) in &record.bindings {
            if !exists(key) {
                dropped.push(key);
                continue;
            }
            if self.bindings.len() >= self.capacity {
                tracing::warn!(owner = %self.owner, controller = %key, "binding over capacity dropped on load");
                dropped.push(key);
                continue;
            }
            self.bindings.insert(key, aspect);
        }
        self.recompute();
        dropped
    }

    // -- Replication --

    pub fn write_packet(&self) -> ReceiverPacket {
        ReceiverPacket {
            aspect: self.aspect,
            bindings: self.bindings().collect(),
        }
    }

    pub fn read_packet(&mut self, packet: &ReceiverPacket) {
        self.bindings = packet.bindings.iter().copied().collect();
        self.aspect = packet.aspect;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
