//! Configuration schema.
//!
//! All sections default sensibly, so an empty TOML file is a valid config.

mod channels;
mod realtime;
mod session;

pub use channels::ChannelsConfig;
pub use realtime::RealtimeConfig;
pub use session::SessionConfig;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub realtime: RealtimeConfig,
    pub channels: ChannelsConfig,
    pub session: SessionConfig,
}
