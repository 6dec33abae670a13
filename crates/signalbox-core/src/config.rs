//! Tunables for a [`SignalWorld`](crate::world::SignalWorld).

use serde::{Deserialize, Serialize};

use crate::id::Ticks;

/// Ticks between unconditional neighbour notifications and client refreshes.
pub const FORCED_REFRESH_PERIOD: Ticks = 512;

/// Client ticks per blink phase flip.
pub const BLINK_PERIOD: Ticks = 16;

/// Controllers a single receiver can be bound to.
pub const MAX_BINDINGS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// A node forces a refresh whenever its clock is a multiple of this.
    pub forced_refresh_period: Ticks,
    pub blink_period: Ticks,
    pub max_bindings: usize,
    /// Times one node may be processed while draining a single call's
    /// propagation before further work on it is treated as a cycle.
    pub max_node_revisits: usize,
    /// Capacity of the world's event ring buffer.
    pub event_capacity: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            forced_refresh_period: FORCED_REFRESH_PERIOD,
            blink_period: BLINK_PERIOD,
            max_bindings: MAX_BINDINGS,
            max_node_revisits: 64,
            event_capacity: 256,
        }
    }
}

impl SignalConfig {
    /// Clamp zero values that would make the tick arithmetic meaningless.
    pub fn sanitized(mut self) -> Self {
        self.forced_refresh_period = self.forced_refresh_period.max(1);
        self.blink_period = self.blink_period.max(1);
        self.max_bindings = self.max_bindings.max(1);
        self.max_node_revisits = self.max_node_revisits.max(1);
        self.event_capacity = self.event_capacity.max(1);
        self
    }
}
