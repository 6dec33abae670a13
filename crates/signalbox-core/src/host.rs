//! The host game's side of the contract.
//!
//! The core never touches block storage or the network layer directly; it
//! calls into a [`BlockHost`] supplied by whoever embeds the world.

use crate::id::BlockPos;

pub trait BlockHost {
    /// Tell the host that the block at `pos` changed so that adjacent
    /// redstone consumers re-evaluate. Fire-and-forget.
    fn notify_neighbors(&mut self, pos: BlockPos);

    /// Deliver a replicated box snapshot to clients watching `pos`.
    fn send_update(&mut self, pos: BlockPos, payload: Vec<u8>);

    /// Whether the block at `pos` is receiving redstone power.
    fn is_powered(&self, pos: BlockPos) -> bool {
        let _ = pos;
        false
    }

    /// Whether the chunk containing `pos` is loaded. Unloaded neighbours are
    /// treated as absent.
    fn is_loaded(&self, pos: BlockPos) -> bool {
        let _ = pos;
        true
    }
}

/// A host that discards every callback. Useful for client worlds, which
/// never notify or replicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl BlockHost for NullHost {
    fn notify_neighbors(&mut self, _pos: BlockPos) {}

    fn send_update(&mut self, _pos: BlockPos, _payload: Vec<u8>) {}
}
