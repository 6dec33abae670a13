//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::collections::BTreeSet;

use crate::host::BlockHost;
use crate::id::{BlockPos, ControllerKey};
use crate::packet::{self, BoxPacket};
use crate::world::SignalWorld;

// ===========================================================================
// Recording host
// ===========================================================================

/// A [`BlockHost`] that records every callback and lets tests control
/// redstone power and chunk loading.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    pub notifications: Vec<BlockPos>,
    pub updates: Vec<(BlockPos, Vec<u8>)>,
    pub powered: BTreeSet<BlockPos>,
    pub unloaded: BTreeSet<BlockPos>,
}

impl RecordingHost {
    pub fn notify_count(&self, pos: BlockPos) -> usize {
        self.notifications.iter().filter(|p| **p == pos).count()
    }

    pub fn update_count(&self, pos: BlockPos) -> usize {
        self.updates.iter().filter(|(p, _)| *p == pos).count()
    }

    pub fn total_notifications(&self) -> usize {
        self.notifications.len()
    }

    pub fn total_updates(&self) -> usize {
        self.updates.len()
    }

    /// Decode the most recent replication payload sent for `pos`.
    pub fn last_packet(&self, pos: BlockPos) -> Option<BoxPacket> {
        self.updates
            .iter()
            .rev()
            .find(|(p, _)| *p == pos)
            .and_then(|(_, bytes)| packet::decode(bytes).ok())
    }

    /// Raw bytes of the most recent replication payload sent for `pos`.
    pub fn last_payload(&self, pos: BlockPos) -> Option<&[u8]> {
        self.updates
            .iter()
            .rev()
            .find(|(p, _)| *p == pos)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// Forget recorded callbacks. Power and loading state are kept.
    pub fn clear(&mut self) {
        self.notifications.clear();
        self.updates.clear();
    }

    pub fn set_powered(&mut self, pos: BlockPos, powered: bool) {
        if powered {
            self.powered.insert(pos);
        } else {
            self.powered.remove(&pos);
        }
    }

    pub fn set_loaded(&mut self, pos: BlockPos, loaded: bool) {
        if loaded {
            self.unloaded.remove(&pos);
        } else {
            self.unloaded.insert(pos);
        }
    }
}

impl BlockHost for RecordingHost {
    fn notify_neighbors(&mut self, pos: BlockPos) {
        self.notifications.push(pos);
    }

    fn send_update(&mut self, pos: BlockPos, payload: Vec<u8>) {
        self.updates.push((pos, payload));
    }

    fn is_powered(&self, pos: BlockPos) -> bool {
        self.powered.contains(&pos)
    }

    fn is_loaded(&self, pos: BlockPos) -> bool {
        !self.unloaded.contains(&pos)
    }
}

// ===========================================================================
// Positions
// ===========================================================================

pub fn origin() -> BlockPos {
    BlockPos::new(0, 64, 0)
}

/// A position well away from [`origin`], for free-standing controllers.
pub fn far_pos() -> BlockPos {
    BlockPos::new(100, 64, 100)
}

// ===========================================================================
// World builders
// ===========================================================================

pub fn server_world() -> SignalWorld<RecordingHost> {
    SignalWorld::server(RecordingHost::default())
}

pub fn client_world() -> SignalWorld<RecordingHost> {
    SignalWorld::client(RecordingHost::default())
}

/// Register a free-standing controller at `pos` and return its key.
///
/// # Panics
///
/// Panics if the world is a client world or the key is taken.
pub fn signal_at(world: &mut SignalWorld<RecordingHost>, pos: BlockPos) -> ControllerKey {
    let key = ControllerKey(pos);
    world
        .add_controller(key, format!("signal@{pos}"))
        .expect("controller registration failed");
    key
}

/// Advance `world` through ticks `from..=to`.
pub fn run_ticks(world: &mut SignalWorld<RecordingHost>, from: u64, to: u64) {
    for tick in from..=to {
        world.advance(tick);
    }
}
