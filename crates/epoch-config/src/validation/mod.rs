//! Configuration validation.
//!
//! Every check pushes into a shared error list so one pass reports all
//! problems in a single `ConfigError`.

mod helpers;


use crate::schema::SyncConfig;
use epoch_common::ConfigError;
use regex::Regex;
use std::sync::LazyLock;

use helpers::validate_range;

static PROJECT_REF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &SyncConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_realtime(&mut errors, config);
    validate_session(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_realtime(errors: &mut Vec<String>, config: &SyncConfig) {
    let rt = &config.realtime;
    validate_range(errors, "realtime.heartbeat_interval_secs", rt.heartbeat_interval_secs, 1, 120);
    validate_range(errors, "realtime.reconnect_delay_secs", rt.reconnect_delay_secs, 1, 60);
    validate_range(errors, "realtime.max_reconnect_delay_secs", rt.max_reconnect_delay_secs, 1, 600);
    validate_range(errors, "realtime.connect_timeout_secs", rt.connect_timeout_secs, 1, 120);

    if rt.max_reconnect_delay_secs < rt.reconnect_delay_secs {
        errors.push(format!(
            "realtime.max_reconnect_delay_secs = {} is below realtime.reconnect_delay_secs = {}",
            rt.max_reconnect_delay_secs, rt.reconnect_delay_secs
        ));
    }

    if !rt.project_ref.is_empty() && !PROJECT_REF_RE.is_match(&rt.project_ref) {
        errors.push(format!(
            "realtime.project_ref = {:?} must be lowercase alphanumeric",
            rt.project_ref
        ));
    }

    if let Some(endpoint) = &rt.endpoint {
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            errors.push(format!(
                "realtime.endpoint = {endpoint:?} must start with ws:// or wss://"
            ));
        }
    }
}

fn validate_session(errors: &mut Vec<String>, config: &SyncConfig) {
    validate_range(errors, "session.event_buffer", config.session.event_buffer, 16, 65536);
    validate_range(
        errors,
        "session.diagnostics_capacity",
        config.session.diagnostics_capacity,
        1,
        4096,
    );
}
