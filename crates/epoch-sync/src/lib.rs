//! Real-time synchronization core for a multiplayer epoch.
//!
//! Tracks live presence, the epoch and team chat feeds, and the mirrored
//! per-participant ready map on top of a publish/subscribe channel
//! transport. [`SynchronizationFacade`] is the only entry point a UI
//! needs; everything it exposes is observable through a single
//! `tokio::sync::watch` cell.

pub mod facade;
pub mod feed;
pub mod lifecycle;
pub mod presence;
pub mod protocol;
pub mod ready;
pub mod realtime;
pub mod transport;

pub use facade::{
    SessionPhase, SyncCommand, SyncDiagnostic, SyncOptions, SyncState, SynchronizationFacade,
    TeamPhase,
};
pub use feed::{BroadcastFeed, UnreadCounters};
pub use lifecycle::{ChannelLifecycleManager, ChannelRole, SlotStatus};
pub use presence::PresenceTracker;
pub use protocol::{ChatMessage, ChatScope, ParticipantPresence, ReadyChangedPayload, ReadySeed};
pub use ready::ReadyStateAggregator;
pub use realtime::RealtimeTransport;
pub use transport::{
    ChannelEvent, ChannelHandle, ChannelOptions, ConnectionStatus, HandleId, PresenceState,
    SubscribeStatus, Transport, TransportEvent,
};
