//! Realtime transport connection settings.

use serde::{Deserialize, Serialize};

/// Connection settings for the Supabase Realtime (Phoenix Channels) endpoint.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Supabase project reference; used to build the endpoint when
    /// `endpoint` is not set.
    pub project_ref: String,
    /// Explicit websocket endpoint, e.g. `ws://localhost:4000/socket/websocket`.
    pub endpoint: Option<String>,
    /// Supabase anon key (publishable).
    pub api_key: String,
    /// Optional access token (JWT) sent with every channel join.
    pub access_token: Option<String>,
    pub heartbeat_interval_secs: u32,
    pub reconnect_delay_secs: u32,
    pub max_reconnect_delay_secs: u32,
    pub connect_timeout_secs: u32,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("project_ref", &self.project_ref)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            project_ref: String::new(),
            endpoint: None,
            api_key: String::new(),
            access_token: None,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            connect_timeout_secs: 15,
        }
    }
}

impl RealtimeConfig {
    /// Websocket URL including the api key and protocol version.
    pub fn ws_url(&self) -> String {
        let base = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "wss://{}.supabase.co/realtime/v1/websocket",
                self.project_ref
            ),
        };
        format!("{base}?apikey={}&vsn=1.0.0", self.api_key)
    }

    /// Whether enough is configured to attempt a connection.
    pub fn is_configured(&self) -> bool {
        (!self.project_ref.is_empty() || self.endpoint.is_some()) && !self.api_key.is_empty()
    }
}
