//! epoch-sync configuration.
//!
//! TOML-based configuration for the realtime transport and the
//! synchronization session. Every section uses serde defaults so a
//! partial file (or no file at all) works.
//!
//! ```rust,no_run
//! use epoch_config::load_config;
//!
//! let config = load_config().expect("failed to load config");
//! println!("{:?}", config.realtime);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{ChannelsConfig, RealtimeConfig, SessionConfig, SyncConfig};

use epoch_common::ConfigError;

/// Load config from the platform default path and validate it.
pub fn load_config() -> Result<SyncConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path and validate it.
pub fn load_config_from(path: &std::path::Path) -> Result<SyncConfig, ConfigError> {
    let config = toml_loader::load_from_path(path)?;
    validation::validate(&config)?;
    Ok(config)
}
