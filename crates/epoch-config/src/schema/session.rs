//! Synchronization session settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the transport event queue.
    pub event_buffer: u32,
    /// Capacity of the diagnostics broadcast bus.
    pub diagnostics_capacity: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_buffer: 256,
            diagnostics_capacity: 64,
        }
    }
}
