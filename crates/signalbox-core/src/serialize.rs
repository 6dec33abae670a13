//! Persistence for a server world.
//!
//! A save is a single `bitcode` blob with a versioned header, the controller
//! registry and one [`BoxRecord`] per box. Observers are stored by box
//! position so that notification order survives a reload.

use serde::{Deserialize, Serialize};

use crate::aspect::SignalAspect;
use crate::config::SignalConfig;
use crate::event::SignalEvent;
use crate::host::BlockHost;
use crate::id::{BlockPos, ControllerKey, NodeId, Ticks};
use crate::node::{BoxNode, BoxRecord, Side};
use crate::world::SignalWorld;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a signal-box world save.
pub const SNAPSHOT_MAGIC: u32 = 0x5B0C_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("only server worlds can be saved")]
    ClientWorld,
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("data too short for snapshot header")]
    TooShort,
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("two boxes saved at {0}")]
    DuplicateBox(BlockPos),
}

// ---------------------------------------------------------------------------
// Snapshot layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// World tick at the time of the save.
    pub tick: Ticks,
}

impl SnapshotHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(LoadError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(LoadError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(LoadError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerEntry {
    pub key: ControllerKey,
    pub name: String,
    pub aspect: SignalAspect,
    /// Positions of observing boxes, in registration order.
    pub observers: Vec<BlockPos>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub header: SnapshotHeader,
    pub controllers: Vec<ControllerEntry>,
    pub boxes: Vec<BoxRecord>,
}

/// Decode a save without rebuilding a world.
pub fn read_snapshot(data: &[u8]) -> Result<WorldSnapshot, LoadError> {
    if data.is_empty() {
        return Err(LoadError::TooShort);
    }
    let snapshot: WorldSnapshot =
        bitcode::deserialize(data).map_err(|e| LoadError::Decode(e.to_string()))?;
    snapshot.header.validate()?;
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Save / load
// ---------------------------------------------------------------------------

impl<H: BlockHost> SignalWorld<H> {
    /// Capture the current state. Pending propagation work is not saved.
    pub fn snapshot(&self) -> Result<WorldSnapshot, SaveError> {
        if self.side != Side::Server {
            return Err(SaveError::ClientWorld);
        }
        let controllers = self
            .network
            .controller_keys()
            .filter_map(|key| self.network.controller(key))
            .map(|c| ControllerEntry {
                key: c.key(),
                name: c.name().to_string(),
                aspect: c.aspect(),
                observers: c
                    .observers()
                    .iter()
                    .filter_map(|id| self.nodes.get(*id).map(BoxNode::pos))
                    .collect(),
            })
            .collect();
        let boxes = self
            .nodes()
            .map(|(_, node)| node.write_record(&self.network))
            .collect();
        Ok(WorldSnapshot {
            header: SnapshotHeader::new(self.tick),
            controllers,
            boxes,
        })
    }

    pub fn save(&self) -> Result<Vec<u8>, SaveError> {
        let snapshot = self.snapshot()?;
        bitcode::serialize(&snapshot).map_err(|e| SaveError::Encode(e.to_string()))
    }

    pub fn load(data: &[u8], config: SignalConfig, host: H) -> Result<Self, LoadError> {
        let snapshot = read_snapshot(data)?;
        Self::from_snapshot(&snapshot, config, host)
    }

    /// Rebuild a server world. Bindings to controllers missing from the
    /// snapshot are dropped and reported as [`SignalEvent::BindingPruned`].
    /// No host callbacks are made.
    pub fn from_snapshot(
        snapshot: &WorldSnapshot,
        config: SignalConfig,
        host: H,
    ) -> Result<Self, LoadError> {
        let mut world = SignalWorld::new(Side::Server, config, host);
        world.tick = snapshot.header.tick;

        for entry in &snapshot.controllers {
            world.network.add_controller(entry.key, entry.name.clone());
            world.network.restore_aspect(entry.key, entry.aspect);
        }

        for record in &snapshot.boxes {
            if world.positions.contains_key(&record.pos) {
                return Err(LoadError::DuplicateBox(record.pos));
            }
            if let Some(saved) = &record.controller {
                let key = ControllerKey(record.pos);
                if world.network.add_controller(key, saved.name.clone()) {
                    world.network.restore_aspect(key, saved.aspect);
                }
            }

            let (node, dropped) = BoxNode::from_record(record, &world.config, &world.network);
            let id = world.nodes.insert(node);
            world.positions.insert(record.pos, id);
            world.report_dropped(id, record.pos, dropped);
        }

        for entry in &snapshot.controllers {
            for pos in &entry.observers {
                if let Some(id) = world.bound_observer(*pos, entry.key) {
                    world.network.register(entry.key, id);
                }
            }
        }
        // Bindings the saved observer lists did not cover, in position order.
        let bound: Vec<(ControllerKey, NodeId)> = world
            .nodes()
            .flat_map(|(id, node)| {
                node.receiver()
                    .into_iter()
                    .flat_map(move |r| r.bindings().map(move |(key, _)| (key, id)))
            })
            .collect();
        for (key, id) in bound {
            world.network.register(key, id);
        }

        tracing::info!(
            tick = world.tick,
            boxes = world.nodes.len(),
            controllers = world.network.len(),
            "world loaded"
        );
        Ok(world)
    }

    /// The receiver at `pos`, if it is still bound to `key`.
    fn bound_observer(&self, pos: BlockPos, key: ControllerKey) -> Option<NodeId> {
        let id = self.id_at(pos)?;
        self.nodes
            .get(id)
            .and_then(BoxNode::receiver)
            .filter(|r| r.is_bound_to(key))
            .map(|_| id)
    }

    fn report_dropped(&mut self, id: NodeId, pos: BlockPos, dropped: Vec<ControllerKey>) {
        for controller in dropped {
            tracing::debug!(%pos, %controller, "dropped binding to missing controller");
            self.events.push(SignalEvent::BindingPruned {
                node: id,
                controller,
                tick: self.tick,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BoxVariant;
    use crate::test_utils::*;

    #[test]
    fn header_rejects_wrong_magic() {
        let header = SnapshotHeader {
            magic: 0xDEAD_BEEF,
            ..SnapshotHeader::new(0)
        };
        assert!(matches!(header.validate(), Err(LoadError::InvalidMagic(0xDEAD_BEEF))));
    }

    #[test]
    fn header_rejects_future_version() {
        let header = SnapshotHeader {
            version: FORMAT_VERSION + 1,
            ..SnapshotHeader::new(0)
        };
        assert!(matches!(header.validate(), Err(LoadError::FutureVersion(_))));
    }

    #[test]
    fn empty_data_is_too_short() {
        assert!(matches!(read_snapshot(&[]), Err(LoadError::TooShort)));
    }

    #[test]
    fn client_world_cannot_save() {
        let world = client_world();
        assert!(matches!(world.save(), Err(SaveError::ClientWorld)));
    }

    #[test]
    fn save_and_load_restores_bindings_and_observers() {
        let mut world = server_world();
        let key = signal_at(&mut world, far_pos());
        world.set_controller_aspect(key, SignalAspect::Red).unwrap();
        world.add_box(origin(), BoxVariant::Receiver).unwrap();
        world.bind_receiver(origin(), key).unwrap();
        world.do_action_on_aspect(origin(), SignalAspect::Red, true).unwrap();

        let bytes = world.save().unwrap();
        let loaded =
            SignalWorld::load(&bytes, SignalConfig::default(), RecordingHost::default()).unwrap();

        assert_eq!(loaded.trigger_aspect(origin()), Some(SignalAspect::Red));
        assert!(loaded.is_emitting_redstone(origin()));
        assert_eq!(loaded.network().observers(key).len(), 1);
        assert_eq!(loaded.host().total_notifications(), 0);
    }

    #[test]
    fn snapshot_lists_observers_in_registration_order() {
        let mut world = server_world();
        let key = signal_at(&mut world, far_pos());
        let late = BlockPos::new(9, 64, 0);
        let early = BlockPos::new(3, 64, 0);
        for pos in [late, early] {
            world.add_box(pos, BoxVariant::Receiver).unwrap();
            world.bind_receiver(pos, key).unwrap();
        }

        let snapshot = world.snapshot().unwrap();
        let entry = snapshot.controllers.iter().find(|c| c.key == key).unwrap();
        assert_eq!(entry.observers, vec![late, early]);
    }

    #[test]
    fn stale_observer_positions_are_skipped() {
        let mut world = server_world();
        let key = signal_at(&mut world, far_pos());
        world.add_box(origin(), BoxVariant::Receiver).unwrap();
        world.bind_receiver(origin(), key).unwrap();

        let mut snapshot = world.snapshot().unwrap();
        for entry in &mut snapshot.controllers {
            entry.observers.insert(0, BlockPos::new(-8, 64, 0));
        }
        let loaded =
            SignalWorld::from_snapshot(&snapshot, SignalConfig::default(), RecordingHost::default())
                .unwrap();
        assert_eq!(loaded.network().observers(key), &[loaded.id_at(origin()).unwrap()]);
    }

    #[test]
    fn load_drops_bindings_to_missing_controllers() {
        let mut world = server_world();
        let kept = signal_at(&mut world, far_pos());
        let lost = signal_at(&mut world, far_pos().offset(crate::id::Facing::Up));
        world.set_controller_aspect(kept, SignalAspect::Yellow).unwrap();
        world.set_controller_aspect(lost, SignalAspect::Red).unwrap();
        world.add_box(origin(), BoxVariant::Receiver).unwrap();
        world.bind_receiver(origin(), kept).unwrap();
        world.bind_receiver(origin(), lost).unwrap();

        let mut snapshot = world.snapshot().unwrap();
        snapshot.controllers.retain(|c| c.key != lost);
        let mut loaded =
            SignalWorld::from_snapshot(&snapshot, SignalConfig::default(), RecordingHost::default())
                .unwrap();

        assert_eq!(loaded.trigger_aspect(origin()), Some(SignalAspect::Yellow));
        let pruned: Vec<_> = loaded
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, SignalEvent::BindingPruned { controller, .. } if *controller == lost))
            .collect();
        assert_eq!(pruned.len(), 1);
    }
}
