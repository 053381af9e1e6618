//! The synchronization facade: join/leave orchestration and event routing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use epoch_common::{SessionId, SyncError};
use epoch_config::{ChannelsConfig, SyncConfig};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

use crate::lifecycle::{ChannelLifecycleManager, ChannelRole, OpenFailure, SlotStatus};
use crate::protocol::{
    events, ChatMessage, ChatScope, ParticipantPresence, ReadyChangedPayload, ReadySeed,
};
use crate::transport::{
    ChannelEvent, ChannelOptions, ConnectionStatus, HandleId, PresenceState, SubscribeStatus,
    Transport, TransportEvent,
};

use super::state::{SessionPhase, SyncDiagnostic, SyncState, TeamPhase};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Construction options for a facade.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub channel: ChannelOptions,
    pub diagnostics_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            channel: ChannelOptions::from(&ChannelsConfig::default()),
            diagnostics_capacity: 64,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            channel: ChannelOptions::from(&config.channels),
            diagnostics_capacity: config.session.diagnostics_capacity as usize,
        }
    }
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

/// Coordinates presence, both chat feeds, and the ready map for one
/// session. All state changes go through `&mut self`, so handlers never
/// interleave; observers read the [`SyncState`] cell.
pub struct SynchronizationFacade {
    session_id: SessionId,
    channels: ChannelLifecycleManager,
    state: watch::Sender<SyncState>,
    diagnostics: broadcast::Sender<SyncDiagnostic>,
    phase: SessionPhase,
    team_phase: TeamPhase,
    /// Our presence payload while an epoch is joined.
    identity: Option<ParticipantPresence>,
    connected: bool,
}

impl SynchronizationFacade {
    pub fn new(transport: Arc<dyn Transport>, options: SyncOptions) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        let (diagnostics, _) = broadcast::channel(options.diagnostics_capacity.max(1));
        Self {
            session_id: SessionId::new(),
            channels: ChannelLifecycleManager::new(transport, options.channel),
            state,
            diagnostics,
            phase: SessionPhase::Idle,
            team_phase: TeamPhase::Idle,
            identity: None,
            connected: false,
        }
    }

    // -- Join / leave -------------------------------------------------------

    /// Join an epoch. Repeating the current epoch id is a no-op, except
    /// that channels which failed are requested again. A different epoch
    /// id leaves the current one completely first.
    pub async fn join_epoch(
        &mut self,
        epoch_id: &str,
        self_id: &str,
        self_group_id: &str,
        self_display_name: &str,
    ) {
        if let Some(current) = self.channels.epoch_id().map(str::to_owned) {
            if current == epoch_id {
                if self.channels.epoch_has_failures() {
                    info!(epoch_id, "Retrying failed epoch channels");
                    let failures = self.channels.retry_epoch().await;
                    self.settle_epoch_join(failures);
                } else {
                    debug!(epoch_id, "Already joined, ignoring duplicate join");
                }
                return;
            }
            info!(from = %current, to = epoch_id, "Switching epochs");
            self.leave_epoch().await;
        }

        self.set_phase(SessionPhase::Joining);
        self.identity = Some(ParticipantPresence {
            participant_id: self_id.to_string(),
            group_id: self_group_id.to_string(),
            display_name: self_display_name.to_string(),
            joined_at: Utc::now(),
        });
        let failures = self.channels.open_epoch(epoch_id, self_id).await;
        self.settle_epoch_join(failures);
    }

    /// Join a team chat inside the joined epoch. Repeating the current team
    /// id is a no-op; a new team starts with an empty feed and counter.
    pub async fn join_team(&mut self, epoch_id: &str, team_id: &str) {
        if self.channels.epoch_id() != Some(epoch_id) {
            warn!(epoch_id, team_id, "Team join for an epoch that is not joined, ignoring");
            return;
        }
        if self.channels.team_id() == Some(team_id) {
            if self.channels.team_has_failure() {
                info!(team_id, "Retrying failed team channel");
                if let Some(failure) = self.channels.retry_team().await {
                    self.report_subscription_failure(failure);
                }
            } else {
                debug!(team_id, "Already in team, ignoring duplicate join");
            }
            return;
        }

        self.channels.close_team().await;
        self.state.send_modify(|s| {
            s.team_feed.reset();
            s.unread.reset_scope(ChatScope::Team);
        });
        let failure = self.channels.open_team(epoch_id, team_id).await;
        self.team_phase = TeamPhase::Joined;
        if let Some(failure) = failure {
            self.report_subscription_failure(failure);
        }
    }

    /// Leave the team chat. No-op when no team is joined.
    pub async fn leave_team(&mut self) {
        if !self.channels.close_team().await {
            return;
        }
        self.state.send_modify(|s| {
            s.team_feed.reset();
            s.unread.reset_scope(ChatScope::Team);
        });
        self.team_phase = TeamPhase::Idle;
    }

    /// Tear down every channel and reset all observable state in one step.
    pub async fn leave_epoch(&mut self) {
        if self.phase != SessionPhase::Idle {
            self.set_phase(SessionPhase::Leaving);
        }
        self.channels.close_epoch().await;
        self.identity = None;
        self.team_phase = TeamPhase::Idle;
        self.state.send_replace(SyncState::default());
        self.set_phase(SessionPhase::Idle);
    }

    /// Leave if joined. Safe to call any number of times.
    pub async fn dispose(&mut self) {
        if self.channels.epoch_id().is_some() || self.phase != SessionPhase::Idle {
            self.leave_epoch().await;
        }
    }

    // -- Local updates ------------------------------------------------------

    /// Focus a chat scope: zero its unread count and unfocus the other.
    pub fn reset_unread(&mut self, scope: ChatScope) {
        self.state.send_modify(|s| s.unread.set_focus(scope));
    }

    /// Seed the ready map from the backend snapshot, replacing it.
    pub fn init_ready_states(&mut self, participants: impl IntoIterator<Item = ReadySeed>) {
        self.state.send_modify(|s| s.ready.init(participants));
    }

    /// Broadcast a chat message on the active channel of `scope`.
    pub async fn broadcast_message(
        &self,
        scope: ChatScope,
        message: &ChatMessage,
    ) -> epoch_common::Result<()> {
        let role = match scope {
            ChatScope::Epoch => ChannelRole::EpochChat,
            ChatScope::Team => ChannelRole::TeamChat,
        };
        let handle = self
            .channels
            .handle(role)
            .ok_or_else(|| SyncError::NotJoined(role.to_string()))?;
        let payload = serde_json::to_value(message)?;
        self.channels
            .transport()
            .publish(handle, events::NEW_MESSAGE, payload)
            .await?;
        Ok(())
    }

    // -- Transport events ---------------------------------------------------

    /// Apply one transport event. Events for handles that are no longer
    /// active are dropped.
    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connection(status) => self.on_connection(status),
            TransportEvent::Channel { handle, event } => {
                let Some(role) = self.channels.role_of(handle) else {
                    trace!(handle = %handle, "Dropping event for a torn-down channel");
                    return;
                };
                match event {
                    ChannelEvent::Status(status) => self.on_status(role, handle, status).await,
                    ChannelEvent::Broadcast { event, payload } => {
                        self.on_broadcast(role, &event, payload)
                    }
                    ChannelEvent::PresenceSync { state } => self.on_presence_sync(role, &state),
                }
            }
        }
    }

    fn on_connection(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Connected => {
                self.connected = true;
                info!(session = %self.session_id, "Transport connected");
            }
            ConnectionStatus::Disconnected => {
                self.connected = false;
                warn!(session = %self.session_id, "Transport disconnected");
            }
            ConnectionStatus::Failed(reason) => {
                self.connected = false;
                warn!(session = %self.session_id, reason = %reason, "Transport connection failed");
            }
        }
    }

    async fn on_status(&mut self, role: ChannelRole, handle: HandleId, status: SubscribeStatus) {
        match status {
            SubscribeStatus::Subscribed => {
                debug!(role = %role, handle = %handle, "Channel subscribed");
                self.channels.set_status(role, SlotStatus::Subscribed);
                if role != ChannelRole::TeamChat
                    && self.phase == SessionPhase::Joining
                    && !self.channels.epoch_has_failures()
                {
                    self.set_phase(SessionPhase::Joined);
                }
                if role == ChannelRole::EpochPresence {
                    self.track_presence().await;
                }
            }
            SubscribeStatus::ChannelError(reason) => self.on_channel_failed(role, reason),
            SubscribeStatus::TimedOut => {
                self.on_channel_failed(role, "subscription timed out".to_string())
            }
            SubscribeStatus::Closed => self.on_channel_failed(role, "channel closed".to_string()),
        }
    }

    fn on_channel_failed(&mut self, role: ChannelRole, reason: String) {
        let topic = self
            .channels
            .slot(role)
            .map(|slot| slot.topic.clone())
            .unwrap_or_default();
        self.channels.set_status(role, SlotStatus::Failed(reason.clone()));
        if role != ChannelRole::TeamChat && self.phase == SessionPhase::Joined {
            self.set_phase(SessionPhase::Joining);
        }
        self.report_subscription_failure(OpenFailure {
            role,
            topic,
            reason,
        });
    }

    /// Announce our identity. Runs on every subscribed status of the
    /// presence channel, so reconnects re-announce too.
    async fn track_presence(&self) {
        let (Some(identity), Some(handle)) = (
            self.identity.as_ref(),
            self.channels.handle(ChannelRole::EpochPresence),
        ) else {
            return;
        };
        let payload = match serde_json::to_value(identity) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode presence payload");
                return;
            }
        };
        match self.channels.transport().track(handle, payload).await {
            Ok(()) => debug!(topic = %handle.topic(), "Presence tracked"),
            Err(e) => {
                warn!(topic = %handle.topic(), error = %e, "Presence track failed");
                let _ = self.diagnostics.send(SyncDiagnostic::PresenceTrackFailed {
                    topic: handle.topic().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_broadcast(&mut self, role: ChannelRole, event: &str, payload: serde_json::Value) {
        match (role, event) {
            (ChannelRole::EpochChat | ChannelRole::TeamChat, events::NEW_MESSAGE) => {
                let message = match serde_json::from_value::<ChatMessage>(payload) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!(role = %role, error = %e, "Dropping undecodable chat message");
                        return;
                    }
                };
                if role.chat_scope() != Some(message.scope) || !message.is_well_scoped() {
                    warn!(role = %role, id = %message.id, "Dropping chat message with mismatched scope");
                    return;
                }
                let scope = message.scope;
                self.state.send_modify(|s| match scope {
                    ChatScope::Epoch => s.epoch_feed.on_message(message, &mut s.unread),
                    ChatScope::Team => s.team_feed.on_message(message, &mut s.unread),
                });
            }
            (ChannelRole::EpochStatus, events::READY_CHANGED) => {
                match serde_json::from_value::<ReadyChangedPayload>(payload) {
                    Ok(change) => {
                        debug!(group_id = %change.group_id, ready = change.ready, "Ready changed");
                        self.state.send_modify(|s| {
                            s.ready.on_ready_changed(&change.group_id, change.ready);
                        });
                    }
                    Err(e) => debug!(error = %e, "Dropping undecodable ready change"),
                }
            }
            _ => debug!(role = %role, event = %event, "Unhandled broadcast event"),
        }
    }

    fn on_presence_sync(&mut self, role: ChannelRole, state: &PresenceState) {
        if role != ChannelRole::EpochPresence {
            debug!(role = %role, "Ignoring presence sync on a non-presence channel");
            return;
        }
        self.state.send_modify(|s| {
            let online = s.presence.sync(state);
            debug!(online, "Presence synced");
        });
    }

    // -- Helpers ------------------------------------------------------------

    fn settle_epoch_join(&mut self, failures: Vec<OpenFailure>) {
        for failure in failures {
            self.report_subscription_failure(failure);
        }
        if self.channels.epoch_has_failures() {
            self.set_phase(SessionPhase::Joining);
        } else {
            self.set_phase(SessionPhase::Joined);
        }
    }

    fn report_subscription_failure(&self, failure: OpenFailure) {
        warn!(
            role = %failure.role,
            topic = %failure.topic,
            reason = %failure.reason,
            "Channel subscription failed"
        );
        let _ = self.diagnostics.send(SyncDiagnostic::SubscriptionFailed {
            role: failure.role,
            topic: failure.topic,
            reason: failure.reason,
        });
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "Session phase changed");
            self.phase = phase;
        }
    }

    // -- Observable reads ---------------------------------------------------

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Receiver for non-fatal diagnostics.
    pub fn diagnostics(&self) -> broadcast::Receiver<SyncDiagnostic> {
        self.diagnostics.subscribe()
    }

    pub fn snapshot(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn online_participants(&self) -> Vec<ParticipantPresence> {
        self.state.borrow().presence.participants().to_vec()
    }

    pub fn epoch_messages(&self) -> Vec<ChatMessage> {
        self.state.borrow().epoch_feed.messages().to_vec()
    }

    pub fn team_messages(&self) -> Vec<ChatMessage> {
        self.state.borrow().team_feed.messages().to_vec()
    }

    pub fn ready_states(&self) -> BTreeMap<String, bool> {
        self.state.borrow().ready.states().clone()
    }

    pub fn unread_epoch_count(&self) -> u32 {
        self.state.borrow().unread.epoch()
    }

    pub fn unread_team_count(&self) -> u32 {
        self.state.borrow().unread.team()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn team_phase(&self) -> TeamPhase {
        self.team_phase
    }

    pub fn epoch_id(&self) -> Option<&str> {
        self.channels.epoch_id()
    }

    pub fn team_id(&self) -> Option<&str> {
        self.channels.team_id()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Number of channel handles currently held.
    pub fn active_channels(&self) -> usize {
        self.channels.active_handles()
    }
}
