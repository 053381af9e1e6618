//! Handles, options, and inbound events of the transport boundary.

use std::collections::BTreeMap;
use std::fmt;

use epoch_config::ChannelsConfig;

/// Identity of one subscription. Unique for the lifetime of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live subscription to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    id: HandleId,
    topic: String,
}

impl ChannelHandle {
    pub fn new(id: HandleId, topic: impl Into<String>) -> Self {
        Self {
            id,
            topic: topic.into(),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Options sent with a channel subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Receive our own broadcasts back.
    pub broadcast_self: bool,
    /// Ask the server to acknowledge broadcasts.
    pub broadcast_ack: bool,
    /// Key this connection is tracked under on a presence channel.
    pub presence_key: Option<String>,
}

impl ChannelOptions {
    pub fn with_presence_key(mut self, key: impl Into<String>) -> Self {
        self.presence_key = Some(key.into());
        self
    }
}

impl From<&ChannelsConfig> for ChannelOptions {
    fn from(config: &ChannelsConfig) -> Self {
        Self {
            broadcast_self: config.broadcast_self,
            broadcast_ack: config.broadcast_ack,
            presence_key: None,
        }
    }
}

/// Full presence state of a channel: transport key to every payload
/// tracked under that key (one per open connection).
pub type PresenceState = BTreeMap<String, Vec<serde_json::Value>>;

/// Terminal or intermediate status of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeStatus {
    /// The channel is joined. Sent again after every reconnect.
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

/// State of the underlying connection, independent of any channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Failed(String),
}

/// Something that happened on one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Status(SubscribeStatus),
    Broadcast {
        event: String,
        payload: serde_json::Value,
    },
    /// The channel's complete presence state after a change.
    PresenceSync { state: PresenceState },
}

/// Events delivered by a transport, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Channel { handle: HandleId, event: ChannelEvent },
    Connection(ConnectionStatus),
}

impl TransportEvent {
    pub fn channel(handle: HandleId, event: ChannelEvent) -> Self {
        Self::Channel { handle, event }
    }
}
