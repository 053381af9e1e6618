//! Transport capability consumed by the synchronization core.
//!
//! The core never talks to a socket directly. It asks a [`Transport`] for
//! channel handles, and receives everything that happens on those channels
//! as [`TransportEvent`]s tagged with the [`HandleId`] they belong to.

mod types;

#[cfg(test)]
pub(crate) mod recording;

pub use types::{
    ChannelEvent, ChannelHandle, ChannelOptions, ConnectionStatus, HandleId, PresenceState,
    SubscribeStatus, TransportEvent,
};

use async_trait::async_trait;
use epoch_common::TransportError;

/// Publish/subscribe channel transport.
///
/// Implementations must never reuse a [`HandleId`]: the core relies on
/// handle identity to drop events that belong to a torn-down channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Request a subscription. The returned handle is live immediately,
    /// but the channel is only usable once a
    /// [`SubscribeStatus::Subscribed`] event arrives for it.
    async fn subscribe(
        &self,
        topic: &str,
        options: ChannelOptions,
    ) -> Result<ChannelHandle, TransportError>;

    /// Tear a channel down. Events for the handle stop being meaningful
    /// as soon as this is called.
    async fn unsubscribe(&self, handle: &ChannelHandle);

    /// Broadcast an event to every subscriber of the channel.
    async fn publish(
        &self,
        handle: &ChannelHandle,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError>;

    /// Track this connection's presence metadata on the channel.
    async fn track(
        &self,
        handle: &ChannelHandle,
        payload: serde_json::Value,
    ) -> Result<(), TransportError>;
}
