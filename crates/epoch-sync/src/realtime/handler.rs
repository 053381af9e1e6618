//! Incoming Phoenix frame handling and presence bookkeeping.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::registry::ChannelRegistry;
use super::types::PhoenixMessage;
use crate::transport::{ChannelEvent, PresenceState, SubscribeStatus, TransportEvent};

// ---------------------------------------------------------------------------
// Presence helpers
// ---------------------------------------------------------------------------

/// Parse a Phoenix presence map into `key -> metas`.
///
/// Supabase sends presence as `{ "key": { "metas": [{ ... }] } }`.
pub(crate) fn parse_presence_map(value: &serde_json::Value) -> PresenceState {
    let mut result = PresenceState::new();
    if let Some(obj) = value.as_object() {
        for (key, val) in obj {
            if let Some(metas) = val.get("metas").and_then(|m| m.as_array()) {
                result.insert(key.clone(), metas.clone());
            }
        }
    }
    result
}

fn phx_ref(meta: &serde_json::Value) -> Option<&str> {
    meta.get("phx_ref").and_then(|r| r.as_str())
}

/// Apply a `presence_diff`: joins append metas, leaves remove metas by
/// `phx_ref`. Keys left without metas disappear.
pub(crate) fn apply_presence_diff(
    state: &mut PresenceState,
    joins: PresenceState,
    leaves: PresenceState,
) {
    for (key, metas) in joins {
        state.entry(key).or_default().extend(metas);
    }
    for (key, left) in leaves {
        let Some(current) = state.get_mut(&key) else {
            continue;
        };
        let refs: HashSet<&str> = left.iter().filter_map(phx_ref).collect();
        current.retain(|meta| !phx_ref(meta).is_some_and(|r| refs.contains(r)));
        if current.is_empty() {
            state.remove(&key);
        }
    }
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

/// Translate one incoming frame into at most one transport event. Frames for
/// topics that are no longer registered are dropped.
pub(crate) fn handle_phoenix_message(
    msg: &PhoenixMessage,
    registry: &mut ChannelRegistry,
) -> Option<TransportEvent> {
    let topic = msg.short_topic();

    match msg.event.as_str() {
        "phx_reply" => {
            let status = msg.payload.get("status").and_then(|s| s.as_str());
            let handle = msg
                .msg_ref
                .as_deref()
                .and_then(|r| registry.take_join(r));
            let Some(handle) = handle else {
                // Heartbeat, leave and broadcast acks.
                if status != Some("ok") {
                    debug!(topic = %topic, status = ?status, "Non-join reply");
                }
                return None;
            };
            if status == Some("ok") {
                debug!(topic = %topic, handle = %handle, "Channel joined");
                return Some(TransportEvent::channel(
                    handle,
                    ChannelEvent::Status(SubscribeStatus::Subscribed),
                ));
            }
            let reason = msg
                .payload
                .get("response")
                .and_then(|r| r.get("reason"))
                .and_then(|r| r.as_str())
                .unwrap_or("unknown error")
                .to_string();
            warn!(topic = %topic, status = ?status, reason = %reason, "Channel join rejected");
            Some(TransportEvent::channel(
                handle,
                ChannelEvent::Status(SubscribeStatus::ChannelError(reason)),
            ))
        }
        "phx_error" => {
            let handle = registry.current_for(topic, msg.msg_ref.as_deref())?;
            warn!(topic = %topic, "Channel error");
            Some(TransportEvent::channel(
                handle,
                ChannelEvent::Status(SubscribeStatus::ChannelError("channel error".to_string())),
            ))
        }
        "phx_close" => {
            let handle = registry.current_for(topic, msg.msg_ref.as_deref())?;
            info!(topic = %topic, "Channel closed");
            Some(TransportEvent::channel(
                handle,
                ChannelEvent::Status(SubscribeStatus::Closed),
            ))
        }
        "broadcast" => {
            let handle = registry.handle_for_topic(topic)?;
            let event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            let payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            debug!(topic = %topic, event = %event, "Broadcast received");
            Some(TransportEvent::channel(
                handle,
                ChannelEvent::Broadcast { event, payload },
            ))
        }
        "presence_state" => {
            let (handle, presence) = registry.presence_mut(topic)?;
            *presence = parse_presence_map(&msg.payload);
            debug!(topic = %topic, keys = presence.len(), "Presence state received");
            Some(TransportEvent::channel(
                handle,
                ChannelEvent::PresenceSync {
                    state: presence.clone(),
                },
            ))
        }
        "presence_diff" => {
            let (handle, presence) = registry.presence_mut(topic)?;
            let joins = msg
                .payload
                .get("joins")
                .map(parse_presence_map)
                .unwrap_or_default();
            let leaves = msg
                .payload
                .get("leaves")
                .map(parse_presence_map)
                .unwrap_or_default();
            debug!(
                topic = %topic,
                joins = joins.len(),
                leaves = leaves.len(),
                "Presence diff received"
            );
            apply_presence_diff(presence, joins, leaves);
            Some(TransportEvent::channel(
                handle,
                ChannelEvent::PresenceSync {
                    state: presence.clone(),
                },
            ))
        }
        _ => {
            debug!(topic = %topic, event = %msg.event, "Unhandled Phoenix event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::{ChannelOptions, HandleId};

    fn frame(topic: &str, event: &str, payload: serde_json::Value, msg_ref: Option<&str>) -> PhoenixMessage {
        PhoenixMessage {
            topic: format!("realtime:{topic}"),
            event: event.to_string(),
            payload,
            msg_ref: msg_ref.map(str::to_string),
        }
    }

    fn registry_with(topic: &str, handle: u64, join_ref: &str) -> ChannelRegistry {
        let mut registry = ChannelRegistry::default();
        registry.register(HandleId(handle), topic, ChannelOptions::default());
        registry.expect_join(join_ref.to_string(), HandleId(handle));
        registry
    }

    fn status_of(event: Option<TransportEvent>) -> (HandleId, SubscribeStatus) {
        match event {
            Some(TransportEvent::Channel {
                handle,
                event: ChannelEvent::Status(status),
            }) => (handle, status),
            other => panic!("expected status, got {other:?}"),
        }
    }

    fn presence_of(event: Option<TransportEvent>) -> PresenceState {
        match event {
            Some(TransportEvent::Channel {
                event: ChannelEvent::PresenceSync { state },
                ..
            }) => state,
            other => panic!("expected presence sync, got {other:?}"),
        }
    }

    #[test]
    fn join_reply_ok_is_subscribed() {
        let mut registry = registry_with("epoch:E1:chat", 1, "3");
        let event = handle_phoenix_message(
            &frame("epoch:E1:chat", "phx_reply", json!({"status": "ok", "response": {}}), Some("3")),
            &mut registry,
        );
        assert_eq!(status_of(event), (HandleId(1), SubscribeStatus::Subscribed));
    }

    #[test]
    fn join_reply_error_carries_reason() {
        let mut registry = registry_with("epoch:E1:chat", 1, "3");
        let event = handle_phoenix_message(
            &frame(
                "epoch:E1:chat",
                "phx_reply",
                json!({"status": "error", "response": {"reason": "unauthorized"}}),
                Some("3"),
            ),
            &mut registry,
        );
        assert_eq!(
            status_of(event),
            (HandleId(1), SubscribeStatus::ChannelError("unauthorized".into()))
        );
    }

    #[test]
    fn non_join_reply_is_ignored() {
        let mut registry = registry_with("epoch:E1:chat", 1, "3");
        let heartbeat = PhoenixMessage {
            topic: "phoenix".into(),
            event: "phx_reply".into(),
            payload: json!({"status": "ok", "response": {}}),
            msg_ref: Some("4".into()),
        };
        assert!(handle_phoenix_message(&heartbeat, &mut registry).is_none());
    }

    #[test]
    fn close_for_older_join_is_dropped() {
        let mut registry = registry_with("epoch:E1:chat", 2, "9");
        let stale = frame("epoch:E1:chat", "phx_close", json!({}), Some("3"));
        assert!(handle_phoenix_message(&stale, &mut registry).is_none());

        let current = frame("epoch:E1:chat", "phx_close", json!({}), Some("9"));
        assert_eq!(
            status_of(handle_phoenix_message(&current, &mut registry)),
            (HandleId(2), SubscribeStatus::Closed)
        );
    }

    #[test]
    fn phx_error_maps_to_channel_error() {
        let mut registry = registry_with("epoch:E1:status", 5, "1");
        let event = handle_phoenix_message(
            &frame("epoch:E1:status", "phx_error", json!({}), Some("1")),
            &mut registry,
        );
        assert!(matches!(
            status_of(event),
            (HandleId(5), SubscribeStatus::ChannelError(_))
        ));
    }

    #[test]
    fn broadcast_unwraps_inner_event() {
        let mut registry = registry_with("epoch:E1:status", 5, "1");
        let event = handle_phoenix_message(
            &frame(
                "epoch:E1:status",
                "broadcast",
                json!({"type": "broadcast", "event": "ready_changed", "payload": {"group_id": "s1", "ready": true}}),
                None,
            ),
            &mut registry,
        );
        assert_eq!(
            event,
            Some(TransportEvent::channel(
                HandleId(5),
                ChannelEvent::Broadcast {
                    event: "ready_changed".into(),
                    payload: json!({"group_id": "s1", "ready": true}),
                },
            ))
        );
    }

    #[test]
    fn frames_for_unknown_topic_are_dropped() {
        let mut registry = ChannelRegistry::default();
        let msg = frame("epoch:E1:chat", "broadcast", json!({"event": "new_message", "payload": {}}), None);
        assert!(handle_phoenix_message(&msg, &mut registry).is_none());
    }

    #[test]
    fn presence_state_replaces_then_diff_applies_by_ref() {
        let mut registry = registry_with("epoch:E1:presence", 2, "1");

        let state = handle_phoenix_message(
            &frame(
                "epoch:E1:presence",
                "presence_state",
                json!({
                    "u1": {"metas": [{"phx_ref": "a", "participant_id": "u1"}]},
                    "u2": {"metas": [{"phx_ref": "b", "participant_id": "u2"}]}
                }),
                None,
            ),
            &mut registry,
        );
        assert_eq!(presence_of(state).len(), 2);

        let diff = handle_phoenix_message(
            &frame(
                "epoch:E1:presence",
                "presence_diff",
                json!({
                    "joins": {"u1": {"metas": [{"phx_ref": "c", "participant_id": "u1"}]}},
                    "leaves": {"u2": {"metas": [{"phx_ref": "b", "participant_id": "u2"}]}}
                }),
                None,
            ),
            &mut registry,
        );
        let state = presence_of(diff);
        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["u1"]);
        assert_eq!(state["u1"].len(), 2);

        let replaced = handle_phoenix_message(
            &frame(
                "epoch:E1:presence",
                "presence_state",
                json!({"u3": {"metas": [{"phx_ref": "d", "participant_id": "u3"}]}}),
                None,
            ),
            &mut registry,
        );
        assert_eq!(presence_of(replaced).keys().collect::<Vec<_>>(), vec!["u3"]);
    }

    #[test]
    fn leave_of_one_connection_keeps_the_other() {
        let mut state = PresenceState::new();
        state.insert(
            "u1".into(),
            vec![json!({"phx_ref": "a"}), json!({"phx_ref": "b"})],
        );
        let mut leaves = PresenceState::new();
        leaves.insert("u1".into(), vec![json!({"phx_ref": "a"})]);

        apply_presence_diff(&mut state, PresenceState::new(), leaves);
        assert_eq!(state["u1"], vec![json!({"phx_ref": "b"})]);
    }

    #[test]
    fn parse_presence_map_skips_entries_without_metas() {
        let parsed = parse_presence_map(&json!({
            "u1": {"metas": [{"participant_id": "u1"}]},
            "bogus": {"nope": true}
        }));
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key("u1"));
    }
}
