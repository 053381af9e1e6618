//! Phoenix protocol envelope and the commands sent to the connection task.

use serde::{Deserialize, Serialize};

use crate::transport::{ChannelOptions, HandleId};

/// Prefix Supabase puts in front of every channel topic on the wire.
pub(crate) const TOPIC_PREFIX: &str = "realtime:";

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    /// Envelope for a channel topic, adding the wire prefix.
    pub(crate) fn channel(
        topic: &str,
        event: &str,
        payload: serde_json::Value,
        msg_ref: String,
    ) -> Self {
        Self {
            topic: format!("{TOPIC_PREFIX}{topic}"),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
        }
    }

    pub(crate) fn heartbeat(msg_ref: String) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(msg_ref),
        }
    }

    /// Topic without the wire prefix.
    pub(crate) fn short_topic(&self) -> &str {
        self.topic.strip_prefix(TOPIC_PREFIX).unwrap_or(&self.topic)
    }
}

/// Build the `phx_join` payload for a channel.
pub(crate) fn join_payload(
    options: &ChannelOptions,
    access_token: Option<&str>,
) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "config": {
            "broadcast": {
                "self": options.broadcast_self,
                "ack": options.broadcast_ack
            },
            "presence": {
                "key": options.presence_key.as_deref().unwrap_or("")
            }
        }
    });
    if let (Some(token), Some(obj)) = (access_token, payload.as_object_mut()) {
        obj.insert("access_token".to_string(), serde_json::json!(token));
    }
    payload
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Commands sent from [`super::RealtimeTransport`] to the connection task.
#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    Join {
        handle: HandleId,
        topic: String,
        options: ChannelOptions,
    },
    Leave {
        handle: HandleId,
    },
    Broadcast {
        handle: HandleId,
        event: String,
        payload: serde_json::Value,
    },
    Track {
        handle: HandleId,
        payload: serde_json::Value,
    },
    Disconnect,
}
