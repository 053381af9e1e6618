//! Chat feeds and unread bookkeeping.
//!
//! A feed is the arrival-ordered list of messages received on one chat
//! channel. Messages are appended as they arrive and never reordered,
//! edited, or deduplicated; the transport delivers at least once and
//! duplicates are passed through.

use crate::protocol::{ChatMessage, ChatScope};

/// Append-only, arrival-ordered messages of one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastFeed {
    scope: ChatScope,
    messages: Vec<ChatMessage>,
}

impl BroadcastFeed {
    pub fn new(scope: ChatScope) -> Self {
        Self {
            scope,
            messages: Vec::new(),
        }
    }

    pub fn scope(&self) -> ChatScope {
        self.scope
    }

    /// Append a message and count it as unread unless this feed's scope
    /// is focused.
    pub fn on_message(&mut self, message: ChatMessage, unread: &mut UnreadCounters) {
        self.messages.push(message);
        unread.record(self.scope);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop the backlog. Only used when the feed's channel context changes.
    pub fn reset(&mut self) {
        self.messages.clear();
    }
}

/// Unread counts for both scopes plus the single focused scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadCounters {
    epoch: u32,
    team: u32,
    focus: Option<ChatScope>,
}

impl UnreadCounters {
    /// Count one inbound message on `scope` unless it is focused.
    pub fn record(&mut self, scope: ChatScope) {
        if self.focus == Some(scope) {
            return;
        }
        let counter = self.counter_mut(scope);
        *counter = counter.saturating_add(1);
    }

    /// Focus `scope`: zero its counter and unfocus the other scope. The
    /// other scope's count is left as it is.
    pub fn set_focus(&mut self, scope: ChatScope) {
        *self.counter_mut(scope) = 0;
        self.focus = Some(scope);
    }

    /// Zero a counter without touching focus.
    pub fn reset_scope(&mut self, scope: ChatScope) {
        *self.counter_mut(scope) = 0;
    }

    pub fn focus(&self) -> Option<ChatScope> {
        self.focus
    }

    pub fn is_focused(&self, scope: ChatScope) -> bool {
        self.focus == Some(scope)
    }

    pub fn count(&self, scope: ChatScope) -> u32 {
        match scope {
            ChatScope::Epoch => self.epoch,
            ChatScope::Team => self.team,
        }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn team(&self) -> u32 {
        self.team
    }

    fn counter_mut(&mut self, scope: ChatScope) -> &mut u32 {
        match scope {
            ChatScope::Epoch => &mut self.epoch,
            ChatScope::Team => &mut self.team,
        }
    }
}
