//! [`Transport`] implementation backed by the realtime connection task.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use epoch_common::TransportError;
use epoch_config::RealtimeConfig;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use super::connection::connection_loop;
use super::types::RealtimeCommand;
use crate::transport::{ChannelHandle, ChannelOptions, HandleId, Transport, TransportEvent};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for the realtime connection.
///
/// All methods are non-blocking and send commands to the background
/// connection task. Subscriptions requested while offline are joined once
/// the connection comes up.
pub struct RealtimeTransport {
    command_tx: mpsc::Sender<RealtimeCommand>,
    connected: Arc<RwLock<bool>>,
    next_handle: AtomicU64,
    live: Mutex<HashSet<HandleId>>,
}

impl RealtimeTransport {
    /// Start the background connection. Returns `(transport, events)`.
    pub fn connect(
        config: RealtimeConfig,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(event_buffer.max(1));
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));

        let transport = Self {
            command_tx,
            connected: Arc::clone(&connected),
            next_handle: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
        };

        tokio::spawn(connection_loop(config, connected, event_tx, command_rx));

        (transport, event_rx)
    }

    /// Check if the socket is currently up.
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Leave every channel and stop the connection task.
    pub async fn disconnect(&self) {
        self.live.lock().await.clear();
        let _ = self.command_tx.send(RealtimeCommand::Disconnect).await;
    }

    async fn send(&self, command: RealtimeCommand) -> Result<(), TransportError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Reject handles that were never issued or are torn down, and calls
    /// made while the socket is down.
    async fn check_usable(&self, handle: &ChannelHandle) -> Result<(), TransportError> {
        if !self.live.lock().await.contains(&handle.id()) {
            return Err(TransportError::UnknownHandle(handle.id().0));
        }
        if !self.is_connected().await {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RealtimeTransport {
    async fn subscribe(
        &self,
        topic: &str,
        options: ChannelOptions,
    ) -> Result<ChannelHandle, TransportError> {
        let id = HandleId(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.send(RealtimeCommand::Join {
            handle: id,
            topic: topic.to_string(),
            options,
        })
        .await?;
        self.live.lock().await.insert(id);
        debug!(topic, handle = %id, "Subscription requested");
        Ok(ChannelHandle::new(id, topic))
    }

    async fn unsubscribe(&self, handle: &ChannelHandle) {
        if !self.live.lock().await.remove(&handle.id()) {
            return;
        }
        let _ = self
            .send(RealtimeCommand::Leave {
                handle: handle.id(),
            })
            .await;
    }

    async fn publish(
        &self,
        handle: &ChannelHandle,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.check_usable(handle).await?;
        self.send(RealtimeCommand::Broadcast {
            handle: handle.id(),
            event: event.to_string(),
            payload,
        })
        .await
    }

    async fn track(
        &self,
        handle: &ChannelHandle,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.check_usable(handle).await?;
        self.send(RealtimeCommand::Track {
            handle: handle.id(),
            payload,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> RealtimeConfig {
        RealtimeConfig {
            endpoint: Some("ws://127.0.0.1:9/socket/websocket".into()),
            api_key: "anon".into(),
            reconnect_delay_secs: 60,
            connect_timeout_secs: 1,
            ..RealtimeConfig::default()
        }
    }

    #[tokio::test]
    async fn handles_are_never_reused() {
        let (transport, _events) = RealtimeTransport::connect(offline_config(), 8);
        let a = transport
            .subscribe("epoch:E1:chat", ChannelOptions::default())
            .await
            .unwrap();
        transport.unsubscribe(&a).await;
        let b = transport
            .subscribe("epoch:E1:chat", ChannelOptions::default())
            .await
            .unwrap();
        assert_ne!(a.id(), b.id());
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn publish_on_torn_down_handle_fails() {
        let (transport, _events) = RealtimeTransport::connect(offline_config(), 8);
        let handle = transport
            .subscribe("epoch:E1:chat", ChannelOptions::default())
            .await
            .unwrap();
        transport.unsubscribe(&handle).await;

        let err = transport
            .publish(&handle, "new_message", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownHandle(_)));
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn publish_while_offline_is_not_connected() {
        let (transport, _events) = RealtimeTransport::connect(offline_config(), 8);
        let handle = transport
            .subscribe("epoch:E1:chat", ChannelOptions::default())
            .await
            .unwrap();

        let err = transport
            .track(&handle, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert!(!transport.is_connected().await);
        transport.disconnect().await;
    }
}
