//! Channels owned by the connection task, keyed by handle and by topic.

use std::collections::HashMap;

use tracing::debug;

use crate::transport::{ChannelOptions, HandleId, PresenceState};

/// One channel the connection should keep joined.
#[derive(Debug, Clone)]
pub(crate) struct RegisteredChannel {
    pub(crate) handle: HandleId,
    pub(crate) topic: String,
    pub(crate) options: ChannelOptions,
    /// Server-side presence state, rebuilt from `presence_state` and
    /// `presence_diff` frames.
    pub(crate) presence: PresenceState,
    /// Ref of the most recent `phx_join` sent for this channel.
    pub(crate) join_ref: Option<String>,
}

/// At most one handle per topic. Join refs map replies back to handles.
#[derive(Debug, Default)]
pub(crate) struct ChannelRegistry {
    by_handle: HashMap<HandleId, RegisteredChannel>,
    by_topic: HashMap<String, HandleId>,
    pending_joins: HashMap<String, HandleId>,
}

impl ChannelRegistry {
    /// Register a channel. A handle previously registered for the same
    /// topic is forgotten and returned.
    pub(crate) fn register(
        &mut self,
        handle: HandleId,
        topic: &str,
        options: ChannelOptions,
    ) -> Option<HandleId> {
        let replaced = self.by_topic.insert(topic.to_string(), handle);
        if let Some(old) = replaced {
            debug!(topic, old = %old, new = %handle, "Replacing channel handle");
            self.by_handle.remove(&old);
            self.pending_joins.retain(|_, h| *h != old);
        }
        self.by_handle.insert(
            handle,
            RegisteredChannel {
                handle,
                topic: topic.to_string(),
                options,
                presence: PresenceState::new(),
                join_ref: None,
            },
        );
        replaced
    }

    /// Forget a handle. Returns the channel if it was registered.
    pub(crate) fn remove(&mut self, handle: HandleId) -> Option<RegisteredChannel> {
        let channel = self.by_handle.remove(&handle)?;
        if self.by_topic.get(&channel.topic) == Some(&handle) {
            self.by_topic.remove(&channel.topic);
        }
        self.pending_joins.retain(|_, h| *h != handle);
        Some(channel)
    }

    pub(crate) fn get(&self, handle: HandleId) -> Option<&RegisteredChannel> {
        self.by_handle.get(&handle)
    }

    pub(crate) fn handle_for_topic(&self, topic: &str) -> Option<HandleId> {
        self.by_topic.get(topic).copied()
    }

    /// Mutable presence state for the channel on `topic`.
    pub(crate) fn presence_mut(&mut self, topic: &str) -> Option<(HandleId, &mut PresenceState)> {
        let handle = *self.by_topic.get(topic)?;
        self.by_handle
            .get_mut(&handle)
            .map(|channel| (handle, &mut channel.presence))
    }

    /// Remember that the reply with `msg_ref` answers a join of `handle`.
    pub(crate) fn expect_join(&mut self, msg_ref: String, handle: HandleId) {
        if let Some(channel) = self.by_handle.get_mut(&handle) {
            channel.join_ref = Some(msg_ref.clone());
        }
        self.pending_joins.insert(msg_ref, handle);
    }

    /// Handle for a channel-level frame (`phx_error`, `phx_close`). Frames
    /// whose ref names an older join of the topic are stale.
    pub(crate) fn current_for(&self, topic: &str, msg_ref: Option<&str>) -> Option<HandleId> {
        let handle = self.handle_for_topic(topic)?;
        let channel = self.by_handle.get(&handle)?;
        match (msg_ref, channel.join_ref.as_deref()) {
            (Some(got), Some(current)) if got != current => None,
            _ => Some(handle),
        }
    }

    /// Resolve a join reply. `None` for replies to anything else, or to a
    /// join whose handle has since been forgotten.
    pub(crate) fn take_join(&mut self, msg_ref: &str) -> Option<HandleId> {
        self.pending_joins.remove(msg_ref)
    }

    /// Drop per-connection state. Registrations survive so they can be
    /// rejoined.
    pub(crate) fn reset_connection_state(&mut self) {
        self.pending_joins.clear();
        for channel in self.by_handle.values_mut() {
            channel.presence.clear();
            channel.join_ref = None;
        }
    }

    /// Every registered channel, in handle order.
    pub(crate) fn channels(&self) -> Vec<RegisteredChannel> {
        let mut channels: Vec<RegisteredChannel> = self.by_handle.values().cloned().collect();
        channels.sort_by_key(|c| c.handle);
        channels
    }

    pub(crate) fn len(&self) -> usize {
        self.by_handle.len()
    }
}
