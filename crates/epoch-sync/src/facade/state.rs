//! Observable state, session phases, and diagnostics.

use crate::feed::{BroadcastFeed, UnreadCounters};
use crate::lifecycle::ChannelRole;
use crate::presence::PresenceTracker;
use crate::protocol::ChatScope;
use crate::ready::ReadyStateAggregator;

/// Everything the UI renders, held in one cell so each update (including
/// the full reset on leave) is observed as a single transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub presence: PresenceTracker,
    pub epoch_feed: BroadcastFeed,
    pub team_feed: BroadcastFeed,
    pub ready: ReadyStateAggregator,
    pub unread: UnreadCounters,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            presence: PresenceTracker::default(),
            epoch_feed: BroadcastFeed::new(ChatScope::Epoch),
            team_feed: BroadcastFeed::new(ChatScope::Team),
            ready: ReadyStateAggregator::default(),
            unread: UnreadCounters::default(),
        }
    }
}

/// Lifecycle of the epoch session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Channels requested; stays here while any of them has failed.
    Joining,
    Joined,
    Leaving,
}

/// Team sub-session, nested inside an epoch session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TeamPhase {
    #[default]
    Idle,
    Joined,
}

/// Non-fatal problems surfaced to the UI, e.g. to offer a reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDiagnostic {
    SubscriptionFailed {
        role: ChannelRole,
        topic: String,
        reason: String,
    },
    PresenceTrackFailed {
        topic: String,
        reason: String,
    },
}

impl std::fmt::Display for SyncDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncDiagnostic::SubscriptionFailed {
                role,
                topic,
                reason,
            } => write!(f, "{role} subscription to {topic} failed: {reason}"),
            SyncDiagnostic::PresenceTrackFailed { topic, reason } => {
                write!(f, "presence track on {topic} failed: {reason}")
            }
        }
    }
}
