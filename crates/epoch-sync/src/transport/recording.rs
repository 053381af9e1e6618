//! In-memory transport that records every call, for tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use epoch_common::TransportError;

use super::{ChannelHandle, ChannelOptions, HandleId, Transport};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Subscribe {
        handle: HandleId,
        topic: String,
        options: ChannelOptions,
    },
    Unsubscribe {
        handle: HandleId,
        topic: String,
    },
    Publish {
        handle: HandleId,
        event: String,
        payload: serde_json::Value,
    },
    Track {
        handle: HandleId,
        payload: serde_json::Value,
    },
}

#[derive(Default)]
pub(crate) struct RecordingTransport {
    next_id: AtomicU64,
    calls: Mutex<Vec<Call>>,
    live: Mutex<BTreeMap<HandleId, String>>,
    failing_topics: Mutex<HashSet<String>>,
    fail_track: AtomicBool,
}

impl RecordingTransport {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub(crate) fn subscribed_topics(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Subscribe { topic, .. } => Some(topic),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn tracks(&self) -> Vec<(HandleId, serde_json::Value)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Track { handle, payload } => Some((handle, payload)),
                _ => None,
            })
            .collect()
    }

    /// Topics with a live (subscribed, not yet torn down) handle, sorted.
    pub(crate) fn live_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.live.lock().unwrap().values().cloned().collect();
        topics.sort();
        topics
    }

    /// The live handle for a topic.
    pub(crate) fn handle_for(&self, topic: &str) -> HandleId {
        self.live
            .lock()
            .unwrap()
            .iter()
            .find(|(_, t)| t.as_str() == topic)
            .map(|(id, _)| *id)
            .unwrap_or_else(|| panic!("no live handle for {topic}"))
    }

    pub(crate) fn fail_subscribe_on(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        self.failing_topics.lock().unwrap().clear();
    }

    pub(crate) fn set_fail_track(&self, fail: bool) {
        self.fail_track.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn subscribe(
        &self,
        topic: &str,
        options: ChannelOptions,
    ) -> Result<ChannelHandle, TransportError> {
        if self.failing_topics.lock().unwrap().contains(topic) {
            return Err(TransportError::NotConnected);
        }
        let id = HandleId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.live.lock().unwrap().insert(id, topic.to_string());
        self.calls.lock().unwrap().push(Call::Subscribe {
            handle: id,
            topic: topic.to_string(),
            options,
        });
        Ok(ChannelHandle::new(id, topic))
    }

    async fn unsubscribe(&self, handle: &ChannelHandle) {
        self.live.lock().unwrap().remove(&handle.id());
        self.calls.lock().unwrap().push(Call::Unsubscribe {
            handle: handle.id(),
            topic: handle.topic().to_string(),
        });
    }

    async fn publish(
        &self,
        handle: &ChannelHandle,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        if !self.live.lock().unwrap().contains_key(&handle.id()) {
            return Err(TransportError::UnknownHandle(handle.id().0));
        }
        self.calls.lock().unwrap().push(Call::Publish {
            handle: handle.id(),
            event: event.to_string(),
            payload,
        });
        Ok(())
    }

    async fn track(
        &self,
        handle: &ChannelHandle,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        if self.fail_track.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.calls.lock().unwrap().push(Call::Track {
            handle: handle.id(),
            payload,
        });
        Ok(())
    }
}
