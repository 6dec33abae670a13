//! Signalbox Core -- the receiver side of a railway signalling network.
//!
//! Signal boxes are blocks that listen to one or more remote signal
//! controllers, fold the reported aspects into a single most-restrictive
//! aspect, and turn that into a redstone output according to a per-box
//! action table. Controller boxes work the other way round and publish an
//! aspect derived from redstone input and adjacent boxes.
//!
//! # Tick Model
//!
//! Each call to [`world::SignalWorld::advance`] visits every box in position
//! order:
//!
//! 1. **Carry-over** -- Finish propagation work left from the previous tick.
//! 2. **Poll** -- Receivers pull their controllers' aspects and prune
//!    bindings to controllers that no longer exist.
//! 3. **Publish** -- Controller boxes recompute and fan out their aspect.
//! 4. **Refresh** -- Every [`config::FORCED_REFRESH_PERIOD`] ticks a box
//!    re-notifies its neighbours and re-replicates even if nothing changed.
//!
//! Consequences of a change (observer fan-out, host block updates,
//! re-evaluation of adjacent controller boxes, client replication) are
//! drained before the next box advances.
//!
//! # Key Types
//!
//! - [`aspect::SignalAspect`] -- Totally ordered signal states with
//!   `worst_of` aggregation.
//! - [`controller::SignalNetwork`] -- Registry of controllers and their
//!   observers.
//! - [`receiver::SimpleSignalReceiver`] -- Per-box record of bound
//!   controllers and the aggregated aspect.
//! - [`action::ActionMapping`] -- Which aspects energise a box's output.
//! - [`node::BoxNode`] -- A box composed from optional components.
//! - [`world::SignalWorld`] -- The box graph and its tick driver.
//! - [`serialize`] -- Versioned world saves via bitcode.

pub mod action;
pub mod aspect;
pub mod config;
pub mod controller;
pub mod event;
pub mod host;
pub mod id;
pub mod node;
pub mod packet;
pub mod receiver;
pub mod serialize;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
