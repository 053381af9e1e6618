//! Per-channel transport options.

use serde::{Deserialize, Serialize};

/// Options applied to every channel join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Receive our own broadcasts back from the server.
    pub broadcast_self: bool,
    /// Ask the server to acknowledge broadcasts.
    pub broadcast_ack: bool,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            broadcast_self: false,
            broadcast_ack: true,
        }
    }
}
