//! Signal controllers and the registry that owns them.
//!
//! A controller never holds references to its receivers. It stores the
//! [`NodeId`]s of its observers in registration order, and the
//! [`SignalNetwork`] resolves them through an [`AspectListener`] supplied
//! by the caller when an aspect changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aspect::SignalAspect;
use crate::id::{ControllerKey, NodeId};

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Receives controller aspect changes, one call per observer.
pub trait AspectListener {
    fn on_controller_aspect_change(
        &mut self,
        observer: NodeId,
        controller: ControllerKey,
        aspect: SignalAspect,
    );
}

impl<F> AspectListener for F
where
    F: FnMut(NodeId, ControllerKey, SignalAspect),
{
    fn on_controller_aspect_change(
        &mut self,
        observer: NodeId,
        controller: ControllerKey,
        aspect: SignalAspect,
    ) {
        self(observer, controller, aspect)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The authoritative aspect of one logical signal source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalController {
    key: ControllerKey,
    name: String,
    aspect: SignalAspect,
    observers: Vec<NodeId>,
}

impl SignalController {
    /// A new controller starts at the safe aspect with no observers.
    pub fn new(key: ControllerKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            aspect: SignalAspect::SAFE,
            observers: Vec::new(),
        }
    }

    pub fn key(&self) -> ControllerKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aspect(&self) -> SignalAspect {
        self.aspect
    }

    pub fn observers(&self) -> &[NodeId] {
        &self.observers
    }

    /// Returns `false` if the observer was already registered.
    pub fn register(&mut self, observer: NodeId) -> bool {
        if self.observers.contains(&observer) {
            return false;
        }
        self.observers.push(observer);
        true
    }

    /// Returns `false` if the observer was not registered.
    pub fn unregister(&mut self, observer: NodeId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| *o != observer);
        self.observers.len() != before
    }

    /// Store a new aspect and notify every observer, in registration order.
    ///
    /// The observer list is snapshotted first, so a listener that registers
    /// or unregisters during delivery does not affect this round.
    pub fn set_aspect(
        &mut self,
        aspect: SignalAspect,
        listener: &mut dyn AspectListener,
    ) -> bool {
        if self.aspect == aspect {
            return false;
        }
        self.aspect = aspect;
        let snapshot = self.observers.clone();
        for observer in snapshot {
            listener.on_controller_aspect_change(observer, self.key, aspect);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Network registry
// ---------------------------------------------------------------------------

/// Process-wide registry of controllers and their observers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalNetwork {
    controllers: BTreeMap<ControllerKey, SignalController>,
}

impl SignalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a controller. Returns `false` (and changes nothing) if the key is taken.
    pub fn add_controller(&mut self, key: ControllerKey, name: impl Into<String>) -> bool {
        if self.controllers.contains_key(&key) {
            return false;
        }
        tracing::debug!(%key, "controller added");
        self.controllers.insert(key, SignalController::new(key, name));
        true
    }

    /// Remove a controller and return the observers it was detached from.
    pub fn remove_controller(&mut self, key: ControllerKey) -> Option<Vec<NodeId>> {
        let controller = self.controllers.remove(&key)?;
        tracing::debug!(%key, observers = controller.observers.len(), "controller removed");
        Some(controller.observers)
    }

    pub fn contains(&self, key: ControllerKey) -> bool {
        self.controllers.contains_key(&key)
    }

    pub fn controller(&self, key: ControllerKey) -> Option<&SignalController> {
        self.controllers.get(&key)
    }

    pub fn aspect(&self, key: ControllerKey) -> Option<SignalAspect> {
        self.controllers.get(&key).map(|c| c.aspect)
    }

    pub fn observers(&self, key: ControllerKey) -> &[NodeId] {
        self.controllers
            .get(&key)
            .map(|c| c.observers.as_slice())
            .unwrap_or(&[])
    }

    pub fn controller_keys(&self) -> impl Iterator<Item = ControllerKey> + '_ {
        self.controllers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Register an observer. Unknown controllers are ignored.
    pub fn register(&mut self, key: ControllerKey, observer: NodeId) -> bool {
        self.controllers
            .get_mut(&key)
            .is_some_and(|c| c.register(observer))
    }

    pub fn unregister(&mut self, key: ControllerKey, observer: NodeId) -> bool {
        self.controllers
            .get_mut(&key)
            .is_some_and(|c| c.unregister(observer))
    }

    /// Detach an observer from every controller (used when a node is removed).
    pub fn unregister_everywhere(&mut self, observer: NodeId) {
        for controller in self.controllers.values_mut() {
            controller.unregister(observer);
        }
    }

    /// Set a controller's aspect, fanning out synchronously to its observers.
    /// Returns `true` if the aspect changed.
    pub fn set_aspect(
        &mut self,
        key: ControllerKey,
        aspect: SignalAspect,
        listener: &mut dyn AspectListener,
    ) -> bool {
        let Some(controller) = self.controllers.get_mut(&key) else {
            return false;
        };
        let previous = controller.aspect;
        let changed = controller.set_aspect(aspect, listener);
        if changed {
            tracing::debug!(%key, from = %previous, to = %aspect, "controller aspect changed");
        }
        changed
    }

    /// Set an aspect without notifying anyone. Used when restoring saved state.
    pub(crate) fn restore_aspect(&mut self, key: ControllerKey, aspect: SignalAspect) {
        if let Some(controller) = self.controllers.get_mut(&key) {
            controller.aspect = aspect;
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
