//! Background WebSocket connection loop with auto-reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use epoch_config::RealtimeConfig;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::handler::handle_phoenix_message;
use super::registry::{ChannelRegistry, RegisteredChannel};
use super::types::{join_payload, PhoenixMessage, RealtimeCommand};
use crate::transport::{ConnectionStatus, TransportEvent};

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// How a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The socket dropped; reconnect.
    Dropped,
    /// Disconnect was requested or every client handle is gone.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task owning the socket and the channel registry. Runs until
/// a disconnect is requested.
pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    connected: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<TransportEvent>,
    mut command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let mut registry = ChannelRegistry::default();
    let base_delay = u64::from(config.reconnect_delay_secs.max(1));
    let max_delay = u64::from(config.max_reconnect_delay_secs).max(base_delay);
    let connect_timeout = u64::from(config.connect_timeout_secs.max(1));
    let mut reconnect_delay = base_delay;

    loop {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to realtime endpoint");

        match tokio::time::timeout(
            Duration::from_secs(connect_timeout),
            tokio_tungstenite::connect_async(&url),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = base_delay;
                *connected.write().await = true;
                let _ = event_tx
                    .send(TransportEvent::Connection(ConnectionStatus::Connected))
                    .await;

                let end = run_session(ws_stream, &config, &mut registry, &event_tx, &mut command_rx)
                    .await;

                *connected.write().await = false;
                registry.reset_connection_state();
                let _ = event_tx
                    .send(TransportEvent::Connection(ConnectionStatus::Disconnected))
                    .await;
                if end == SessionEnd::Shutdown {
                    info!("Realtime connection shut down");
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to realtime endpoint");
                let _ = event_tx
                    .send(TransportEvent::Connection(ConnectionStatus::Failed(format!(
                        "connection failed: {e}"
                    ))))
                    .await;
            }
            Err(_elapsed) => {
                error!(timeout = connect_timeout, "Realtime connection timed out");
                let _ = event_tx
                    .send(TransportEvent::Connection(ConnectionStatus::Failed(format!(
                        "connection timed out after {connect_timeout}s"
                    ))))
                    .await;
            }
        }

        // Exponential backoff reconnect.
        info!(
            delay = reconnect_delay,
            "Reconnecting in {} seconds", reconnect_delay
        );
        if !wait_offline(Duration::from_secs(reconnect_delay), &mut registry, &mut command_rx).await
        {
            info!("Realtime connection shut down while offline");
            return;
        }
        reconnect_delay = (reconnect_delay * 2).min(max_delay);
    }
}

/// Serve one connected socket until it drops or shutdown is requested.
async fn run_session<S>(
    ws_stream: S,
    config: &RealtimeConfig,
    registry: &mut ChannelRegistry,
    event_tx: &mpsc::Sender<TransportEvent>,
    command_rx: &mut mpsc::Receiver<RealtimeCommand>,
) -> SessionEnd
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Sink<WsMessage>
        + Unpin,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let access_token = config.access_token.as_deref();

    // Rejoin every registered channel.
    for channel in registry.channels() {
        if !send_join(&mut ws_write, registry, &channel, access_token).await {
            return SessionEnd::Dropped;
        }
    }

    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(u64::from(config.heartbeat_interval_secs.max(1))));
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = ws_read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<PhoenixMessage>(&text) {
                        Ok(msg) => {
                            if let Some(event) = handle_phoenix_message(&msg, registry) {
                                let _ = event_tx.send(event).await;
                            }
                        }
                        Err(_) => debug!(text = %text, "Unrecognized realtime frame"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Realtime server closed connection");
                    return SessionEnd::Dropped;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return SessionEnd::Dropped;
                }
                Some(Ok(_)) => {}
            },
            command = command_rx.recv() => match command {
                Some(RealtimeCommand::Disconnect) | None => {
                    leave_all(&mut ws_write, registry).await;
                    let _ = ws_write.send(WsMessage::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                Some(command) => {
                    if !forward_command(&mut ws_write, registry, command, access_token).await {
                        return SessionEnd::Dropped;
                    }
                }
            },
            _ = heartbeat.tick() => {
                if !send_frame(&mut ws_write, &PhoenixMessage::heartbeat(next_ref())).await {
                    warn!("Heartbeat failed");
                    return SessionEnd::Dropped;
                }
            }
        }
    }
}

/// Sleep out the backoff delay while keeping the registry current.
/// Returns false when shutdown was requested.
async fn wait_offline(
    delay: Duration,
    registry: &mut ChannelRegistry,
    command_rx: &mut mpsc::Receiver<RealtimeCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = command_rx.recv() => match command {
                Some(RealtimeCommand::Disconnect) | None => return false,
                Some(RealtimeCommand::Join { handle, topic, options }) => {
                    registry.register(handle, &topic, options);
                }
                Some(RealtimeCommand::Leave { handle }) => {
                    registry.remove(handle);
                }
                Some(RealtimeCommand::Broadcast { handle, event, .. }) => {
                    warn!(handle = %handle, event = %event, "Dropping broadcast while offline");
                }
                Some(RealtimeCommand::Track { handle, .. }) => {
                    debug!(handle = %handle, "Dropping presence track while offline");
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Outgoing frames
// ---------------------------------------------------------------------------

/// Write one command to the socket. Returns false if the socket is gone.
async fn forward_command<W>(
    ws_write: &mut W,
    registry: &mut ChannelRegistry,
    command: RealtimeCommand,
    access_token: Option<&str>,
) -> bool
where
    W: Sink<WsMessage> + Unpin,
{
    match command {
        RealtimeCommand::Join {
            handle,
            topic,
            options,
        } => {
            registry.register(handle, &topic, options);
            let Some(channel) = registry.get(handle).cloned() else {
                return true;
            };
            send_join(ws_write, registry, &channel, access_token).await
        }
        RealtimeCommand::Leave { handle } => match registry.remove(handle) {
            Some(channel) => {
                let msg = PhoenixMessage::channel(
                    &channel.topic,
                    "phx_leave",
                    serde_json::json!({}),
                    next_ref(),
                );
                send_frame(ws_write, &msg).await
            }
            None => true,
        },
        RealtimeCommand::Broadcast {
            handle,
            event,
            payload,
        } => {
            let Some(topic) = registry.get(handle).map(|c| c.topic.clone()) else {
                debug!(handle = %handle, "Broadcast for unknown handle");
                return true;
            };
            let msg = PhoenixMessage::channel(
                &topic,
                "broadcast",
                serde_json::json!({
                    "type": "broadcast",
                    "event": event,
                    "payload": payload
                }),
                next_ref(),
            );
            send_frame(ws_write, &msg).await
        }
        RealtimeCommand::Track { handle, payload } => {
            let Some(topic) = registry.get(handle).map(|c| c.topic.clone()) else {
                debug!(handle = %handle, "Track for unknown handle");
                return true;
            };
            let msg = PhoenixMessage::channel(
                &topic,
                "presence",
                serde_json::json!({
                    "type": "presence",
                    "event": "track",
                    "payload": payload
                }),
                next_ref(),
            );
            send_frame(ws_write, &msg).await
        }
        // Handled by the caller.
        RealtimeCommand::Disconnect => true,
    }
}

async fn send_join<W>(
    ws_write: &mut W,
    registry: &mut ChannelRegistry,
    channel: &RegisteredChannel,
    access_token: Option<&str>,
) -> bool
where
    W: Sink<WsMessage> + Unpin,
{
    let msg_ref = next_ref();
    registry.expect_join(msg_ref.clone(), channel.handle);
    let msg = PhoenixMessage::channel(
        &channel.topic,
        "phx_join",
        join_payload(&channel.options, access_token),
        msg_ref,
    );
    debug!(topic = %channel.topic, handle = %channel.handle, "Joining channel");
    send_frame(ws_write, &msg).await
}

async fn leave_all<W>(ws_write: &mut W, registry: &mut ChannelRegistry)
where
    W: Sink<WsMessage> + Unpin,
{
    debug!(channels = registry.len(), "Leaving all channels");
    for channel in registry.channels() {
        let msg = PhoenixMessage::channel(
            &channel.topic,
            "phx_leave",
            serde_json::json!({}),
            next_ref(),
        );
        if !send_frame(ws_write, &msg).await {
            break;
        }
        registry.remove(channel.handle);
    }
}

async fn send_frame<W>(ws_write: &mut W, msg: &PhoenixMessage) -> bool
where
    W: Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => ws_write.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, event = %msg.event, "Failed to encode Phoenix frame");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Mutex;

    use futures_util::sink;

    use super::*;
    use crate::transport::{ChannelOptions, HandleId};

    type Frames = Arc<Mutex<Vec<WsMessage>>>;

    /// Writer that stores every frame it is given.
    fn collector() -> (impl Sink<WsMessage, Error = Infallible> + Unpin, Frames) {
        let frames: Frames = Arc::new(Mutex::new(Vec::new()));
        let writer = Box::pin(sink::unfold(
            Arc::clone(&frames),
            |frames, msg: WsMessage| async move {
                frames.lock().unwrap().push(msg);
                Ok::<_, Infallible>(frames)
            },
        ));
        (writer, frames)
    }

    fn sent(frames: &Frames) -> Vec<PhoenixMessage> {
        frames
            .lock()
            .unwrap()
            .iter()
            .filter_map(|f| match f {
                WsMessage::Text(text) => serde_json::from_str(text).ok(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn refs_are_unique() {
        let a = next_ref();
        let b = next_ref();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn join_registers_and_expects_reply() {
        let (mut writer, frames) = collector();
        let mut registry = ChannelRegistry::default();
        let options = ChannelOptions::default().with_presence_key("u1");

        let ok = forward_command(
            &mut writer,
            &mut registry,
            RealtimeCommand::Join {
                handle: HandleId(1),
                topic: "epoch:E1:presence".into(),
                options,
            },
            Some("jwt"),
        )
        .await;
        assert!(ok);

        let frames = sent(&frames);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "phx_join");
        assert_eq!(frames[0].topic, "realtime:epoch:E1:presence");
        assert_eq!(frames[0].payload["config"]["presence"]["key"], "u1");
        assert_eq!(frames[0].payload["access_token"], "jwt");

        let join_ref = frames[0].msg_ref.clone().unwrap();
        assert_eq!(registry.take_join(&join_ref), Some(HandleId(1)));
    }

    #[tokio::test]
    async fn leave_forgets_handle_and_sends_phx_leave() {
        let (mut writer, frames) = collector();
        let mut registry = ChannelRegistry::default();
        registry.register(HandleId(4), "epoch:E1:chat", ChannelOptions::default());

        let leave = || RealtimeCommand::Leave { handle: HandleId(4) };
        assert!(forward_command(&mut writer, &mut registry, leave(), None).await);
        // Unknown handle: nothing is written.
        assert!(forward_command(&mut writer, &mut registry, leave(), None).await);

        let frames = sent(&frames);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "phx_leave");
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn broadcast_wraps_event_and_payload() {
        let (mut writer, frames) = collector();
        let mut registry = ChannelRegistry::default();
        registry.register(HandleId(2), "epoch:E1:chat", ChannelOptions::default());

        forward_command(
            &mut writer,
            &mut registry,
            RealtimeCommand::Broadcast {
                handle: HandleId(2),
                event: "new_message".into(),
                payload: serde_json::json!({"content": "hi"}),
            },
            None,
        )
        .await;

        let frames = sent(&frames);
        assert_eq!(frames[0].event, "broadcast");
        assert_eq!(frames[0].payload["type"], "broadcast");
        assert_eq!(frames[0].payload["event"], "new_message");
        assert_eq!(frames[0].payload["payload"]["content"], "hi");
    }

    #[tokio::test]
    async fn track_goes_out_as_presence_frame() {
        let (mut writer, frames) = collector();
        let mut registry = ChannelRegistry::default();
        registry.register(HandleId(3), "epoch:E1:presence", ChannelOptions::default());

        forward_command(
            &mut writer,
            &mut registry,
            RealtimeCommand::Track {
                handle: HandleId(3),
                payload: serde_json::json!({"participant_id": "u1"}),
            },
            None,
        )
        .await;

        let frames = sent(&frames);
        assert_eq!(frames[0].event, "presence");
        assert_eq!(frames[0].payload["event"], "track");
        assert_eq!(frames[0].payload["payload"]["participant_id"], "u1");
    }

    #[tokio::test]
    async fn leave_all_empties_registry() {
        let (mut writer, frames) = collector();
        let mut registry = ChannelRegistry::default();
        registry.register(HandleId(1), "a", ChannelOptions::default());
        registry.register(HandleId(2), "b", ChannelOptions::default());

        leave_all(&mut writer, &mut registry).await;
        assert_eq!(registry.len(), 0);
        assert_eq!(sent(&frames).len(), 2);
    }

    #[tokio::test]
    async fn offline_wait_keeps_registry_current() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut registry = ChannelRegistry::default();
        tx.send(RealtimeCommand::Join {
            handle: HandleId(1),
            topic: "a".into(),
            options: ChannelOptions::default(),
        })
        .await
        .unwrap();
        tx.send(RealtimeCommand::Join {
            handle: HandleId(2),
            topic: "b".into(),
            options: ChannelOptions::default(),
        })
        .await
        .unwrap();
        tx.send(RealtimeCommand::Leave { handle: HandleId(1) })
            .await
            .unwrap();

        assert!(wait_offline(Duration::from_millis(20), &mut registry, &mut rx).await);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.handle_for_topic("b"), Some(HandleId(2)));

        tx.send(RealtimeCommand::Disconnect).await.unwrap();
        assert!(!wait_offline(Duration::from_secs(60), &mut registry, &mut rx).await);
    }
}
