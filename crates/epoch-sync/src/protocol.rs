//! Wire types for the epoch channels.
//!
//! These are the application-level payloads that ride inside transport
//! broadcasts and presence tracking. The transport envelope itself is the
//! concern of [`crate::realtime`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Broadcast event names
// ---------------------------------------------------------------------------

/// Event names used in channel broadcasts.
pub mod events {
    pub const NEW_MESSAGE: &str = "new_message";
    pub const READY_CHANGED: &str = "ready_changed";
}

// ---------------------------------------------------------------------------
// Channel names
// ---------------------------------------------------------------------------

/// Channel names. These strings are part of the wire contract shared with
/// every other client of the same epoch.
pub mod topics {
    pub fn epoch_chat(epoch_id: &str) -> String {
        format!("epoch:{epoch_id}:chat")
    }

    pub fn epoch_presence(epoch_id: &str) -> String {
        format!("epoch:{epoch_id}:presence")
    }

    pub fn epoch_status(epoch_id: &str) -> String {
        format!("epoch:{epoch_id}:status")
    }

    pub fn team_chat(epoch_id: &str, team_id: &str) -> String {
        format!("epoch:{epoch_id}:team:{team_id}:chat")
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Audience of a chat feed, unread counter, or focus flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatScope {
    Epoch,
    Team,
}

impl ChatScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatScope::Epoch => "epoch",
            ChatScope::Team => "team",
        }
    }
}

impl std::fmt::Display for ChatScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message as broadcast on an epoch or team chat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub epoch_id: String,
    pub sender_id: String,
    pub sender_group_id: String,
    pub scope: ChatScope,
    /// Set exactly when `scope` is [`ChatScope::Team`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,
}

impl ChatMessage {
    /// Whether `team_id` agrees with `scope`.
    pub fn is_well_scoped(&self) -> bool {
        match self.scope {
            ChatScope::Epoch => self.team_id.is_none(),
            ChatScope::Team => self.team_id.is_some(),
        }
    }
}

/// Identity tracked on the epoch presence channel, one per open connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPresence {
    pub participant_id: String,
    pub group_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// Payload of the `ready_changed` broadcast on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyChangedPayload {
    pub group_id: String,
    pub ready: bool,
}

/// One entry of the REST ready-state snapshot used to seed the ready map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadySeed {
    pub group_id: String,
    #[serde(default)]
    pub ready: Option<bool>,
}

impl ReadySeed {
    pub fn new(group_id: impl Into<String>, ready: Option<bool>) -> Self {
        Self {
            group_id: group_id.into(),
            ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_follow_wire_contract() {
        assert_eq!(topics::epoch_chat("e1"), "epoch:e1:chat");
        assert_eq!(topics::epoch_presence("e1"), "epoch:e1:presence");
        assert_eq!(topics::epoch_status("e1"), "epoch:e1:status");
        assert_eq!(topics::team_chat("e1", "t9"), "epoch:e1:team:t9:chat");
    }

    #[test]
    fn scope_displays_wire_name() {
        assert_eq!(ChatScope::Epoch.to_string(), "epoch");
        assert_eq!(ChatScope::Team.to_string(), "team");
    }

    #[test]
    fn chat_message_decodes_without_optional_fields() {
        let json = serde_json::json!({
            "id": "m1",
            "epoch_id": "e1",
            "sender_id": "u1",
            "sender_group_id": "s1",
            "scope": "epoch",
            "content": "hi",
            "created_at": "2026-01-02T03:04:05Z"
        });
        let msg: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.scope, ChatScope::Epoch);
        assert!(msg.team_id.is_none());
        assert!(msg.sender_display_name.is_none());
        assert!(msg.is_well_scoped());
    }

    #[test]
    fn team_message_without_team_id_is_not_well_scoped() {
        let json = serde_json::json!({
            "id": "m1",
            "epoch_id": "e1",
            "sender_id": "u1",
            "sender_group_id": "s1",
            "scope": "team",
            "content": "hi",
            "created_at": "2026-01-02T03:04:05Z"
        });
        let msg: ChatMessage = serde_json::from_value(json).unwrap();
        assert!(!msg.is_well_scoped());
    }

    #[test]
    fn presence_ignores_transport_fields() {
        let json = serde_json::json!({
            "participant_id": "u1",
            "group_id": "s1",
            "display_name": "Alpha",
            "joined_at": "2026-01-02T03:04:05Z",
            "phx_ref": "F-abc"
        });
        let p: ParticipantPresence = serde_json::from_value(json).unwrap();
        assert_eq!(p.participant_id, "u1");
        assert_eq!(p.group_id, "s1");
    }

    #[test]
    fn ready_seed_defaults_to_none() {
        let seed: ReadySeed = serde_json::from_str(r#"{"group_id":"s1"}"#).unwrap();
        assert_eq!(seed, ReadySeed::new("s1", None));
    }
}
