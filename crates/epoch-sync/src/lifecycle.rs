//! Channel lifecycle: which subscription currently backs each role.
//!
//! At most one epoch set (chat, presence, status) and one team chat are
//! open at a time. Replacing a set always tears the old one down before
//! the new one is requested, and every handle the manager hands out is
//! the only thing the facade trusts when an event arrives.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::protocol::{topics, ChatScope};
use crate::transport::{ChannelHandle, ChannelOptions, HandleId, Transport};

// ---------------------------------------------------------------------------
// Roles & slots
// ---------------------------------------------------------------------------

/// Logical purpose of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    EpochChat,
    EpochPresence,
    EpochStatus,
    TeamChat,
}

impl ChannelRole {
    /// Chat scope for the two chat roles.
    pub fn chat_scope(self) -> Option<ChatScope> {
        match self {
            ChannelRole::EpochChat => Some(ChatScope::Epoch),
            ChannelRole::TeamChat => Some(ChatScope::Team),
            ChannelRole::EpochPresence | ChannelRole::EpochStatus => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelRole::EpochChat => "epoch-chat",
            ChannelRole::EpochPresence => "epoch-presence",
            ChannelRole::EpochStatus => "epoch-status",
            ChannelRole::TeamChat => "team-chat",
        }
    }
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a requested channel stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    /// Subscribe call accepted, waiting for the transport to confirm.
    Requested,
    Subscribed,
    Failed(String),
}

/// One requested channel.
#[derive(Debug, Clone)]
pub struct ChannelSlot {
    pub role: ChannelRole,
    pub topic: String,
    /// Absent when the subscribe call itself failed.
    pub handle: Option<ChannelHandle>,
    pub status: SlotStatus,
}

impl ChannelSlot {
    fn is_failed(&self) -> bool {
        matches!(self.status, SlotStatus::Failed(_))
    }

    fn failure(&self) -> Option<OpenFailure> {
        match &self.status {
            SlotStatus::Failed(reason) => Some(OpenFailure {
                role: self.role,
                topic: self.topic.clone(),
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

/// A channel the transport refused to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFailure {
    pub role: ChannelRole,
    pub topic: String,
    pub reason: String,
}

struct EpochChannels {
    epoch_id: String,
    presence_key: String,
    chat: ChannelSlot,
    presence: ChannelSlot,
    status: ChannelSlot,
}

impl EpochChannels {
    fn slots(&self) -> [&ChannelSlot; 3] {
        [&self.chat, &self.presence, &self.status]
    }

    fn slots_mut(&mut self) -> [&mut ChannelSlot; 3] {
        [&mut self.chat, &mut self.presence, &mut self.status]
    }
}

struct TeamChannel {
    team_id: String,
    chat: ChannelSlot,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns the live subscriptions of one synchronization session.
pub struct ChannelLifecycleManager {
    transport: Arc<dyn Transport>,
    options: ChannelOptions,
    epoch: Option<EpochChannels>,
    team: Option<TeamChannel>,
}

impl ChannelLifecycleManager {
    pub fn new(transport: Arc<dyn Transport>, options: ChannelOptions) -> Self {
        Self {
            transport,
            options,
            epoch: None,
            team: None,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn epoch_id(&self) -> Option<&str> {
        self.epoch.as_ref().map(|e| e.epoch_id.as_str())
    }

    pub fn team_id(&self) -> Option<&str> {
        self.team.as_ref().map(|t| t.team_id.as_str())
    }

    /// Request the three epoch channels. Anything already open is torn
    /// down first. Returns the channels the transport refused.
    pub async fn open_epoch(&mut self, epoch_id: &str, presence_key: &str) -> Vec<OpenFailure> {
        if self.epoch.is_some() {
            self.close_epoch().await;
        }

        info!(epoch_id, "Opening epoch channels");
        let transport = self.transport.as_ref();
        let chat = open_slot(
            transport,
            ChannelRole::EpochChat,
            topics::epoch_chat(epoch_id),
            self.options.clone(),
        )
        .await;
        let presence = open_slot(
            transport,
            ChannelRole::EpochPresence,
            topics::epoch_presence(epoch_id),
            self.options.clone().with_presence_key(presence_key),
        )
        .await;
        let status = open_slot(
            transport,
            ChannelRole::EpochStatus,
            topics::epoch_status(epoch_id),
            self.options.clone(),
        )
        .await;

        let channels = EpochChannels {
            epoch_id: epoch_id.to_string(),
            presence_key: presence_key.to_string(),
            chat,
            presence,
            status,
        };
        let failures: Vec<OpenFailure> =
            channels.slots().iter().filter_map(|s| s.failure()).collect();
        self.epoch = Some(channels);
        failures
    }

    /// Re-request every failed epoch channel, tearing down its stale
    /// handle first. Channels that are fine are left alone.
    pub async fn retry_epoch(&mut self) -> Vec<OpenFailure> {
        let transport = self.transport.as_ref();
        let Some(channels) = self.epoch.as_mut() else {
            return Vec::new();
        };

        let presence_key = channels.presence_key.clone();
        for slot in channels.slots_mut() {
            if !slot.is_failed() {
                continue;
            }
            let options = match slot.role {
                ChannelRole::EpochPresence => {
                    self.options.clone().with_presence_key(&presence_key)
                }
                _ => self.options.clone(),
            };
            debug!(role = %slot.role, topic = %slot.topic, "Retrying channel");
            *slot = reopen_slot(transport, slot, options).await;
        }
        channels.slots().iter().filter_map(|s| s.failure()).collect()
    }

    /// Tear down the team channel and every epoch channel.
    pub async fn close_epoch(&mut self) {
        self.close_team().await;
        if let Some(channels) = self.epoch.take() {
            info!(epoch_id = %channels.epoch_id, "Closing epoch channels");
            for slot in channels.slots() {
                close_slot(self.transport.as_ref(), slot).await;
            }
        }
    }

    /// Request a team chat channel, tearing down any previous one first.
    pub async fn open_team(&mut self, epoch_id: &str, team_id: &str) -> Option<OpenFailure> {
        self.close_team().await;

        info!(epoch_id, team_id, "Opening team channel");
        let chat = open_slot(
            self.transport.as_ref(),
            ChannelRole::TeamChat,
            topics::team_chat(epoch_id, team_id),
            self.options.clone(),
        )
        .await;
        let failure = chat.failure();
        self.team = Some(TeamChannel {
            team_id: team_id.to_string(),
            chat,
        });
        failure
    }

    /// Re-request the team channel if it failed.
    pub async fn retry_team(&mut self) -> Option<OpenFailure> {
        let transport = self.transport.as_ref();
        let team = self.team.as_mut()?;
        if team.chat.is_failed() {
            debug!(topic = %team.chat.topic, "Retrying team channel");
            team.chat = reopen_slot(transport, &team.chat, self.options.clone()).await;
        }
        team.chat.failure()
    }

    /// Tear down the team channel. Returns whether one was open.
    pub async fn close_team(&mut self) -> bool {
        match self.team.take() {
            Some(team) => {
                info!(team_id = %team.team_id, "Closing team channel");
                close_slot(self.transport.as_ref(), &team.chat).await;
                true
            }
            None => false,
        }
    }

    /// Role of the channel a handle belongs to, if that handle is still
    /// the active one for its role.
    pub fn role_of(&self, id: HandleId) -> Option<ChannelRole> {
        self.slots()
            .find(|slot| slot.handle.as_ref().map(ChannelHandle::id) == Some(id))
            .map(|slot| slot.role)
    }

    pub fn slot(&self, role: ChannelRole) -> Option<&ChannelSlot> {
        self.slots().find(|slot| slot.role == role)
    }

    pub fn handle(&self, role: ChannelRole) -> Option<&ChannelHandle> {
        self.slot(role).and_then(|slot| slot.handle.as_ref())
    }

    pub fn set_status(&mut self, role: ChannelRole, status: SlotStatus) {
        let slot = match role {
            ChannelRole::EpochChat => self.epoch.as_mut().map(|e| &mut e.chat),
            ChannelRole::EpochPresence => self.epoch.as_mut().map(|e| &mut e.presence),
            ChannelRole::EpochStatus => self.epoch.as_mut().map(|e| &mut e.status),
            ChannelRole::TeamChat => self.team.as_mut().map(|t| &mut t.chat),
        };
        match slot {
            Some(slot) => slot.status = status,
            None => warn!(role = %role, "Status update for a role with no channel"),
        }
    }

    pub fn epoch_has_failures(&self) -> bool {
        self.epoch
            .as_ref()
            .is_some_and(|e| e.slots().iter().any(|s| s.is_failed()))
    }

    pub fn team_has_failure(&self) -> bool {
        self.team.as_ref().is_some_and(|t| t.chat.is_failed())
    }

    /// Number of handles currently held.
    pub fn active_handles(&self) -> usize {
        self.slots().filter(|slot| slot.handle.is_some()).count()
    }

    fn slots(&self) -> impl Iterator<Item = &ChannelSlot> {
        self.epoch
            .iter()
            .flat_map(|e| e.slots())
            .chain(self.team.iter().map(|t| &t.chat))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn open_slot(
    transport: &dyn Transport,
    role: ChannelRole,
    topic: String,
    options: ChannelOptions,
) -> ChannelSlot {
    match transport.subscribe(&topic, options).await {
        Ok(handle) => {
            debug!(role = %role, topic = %topic, handle = %handle.id(), "Channel requested");
            ChannelSlot {
                role,
                topic,
                handle: Some(handle),
                status: SlotStatus::Requested,
            }
        }
        Err(e) => {
            warn!(role = %role, topic = %topic, error = %e, "Subscribe failed");
            ChannelSlot {
                role,
                topic,
                handle: None,
                status: SlotStatus::Failed(e.to_string()),
            }
        }
    }
}

async fn reopen_slot(
    transport: &dyn Transport,
    slot: &ChannelSlot,
    options: ChannelOptions,
) -> ChannelSlot {
    close_slot(transport, slot).await;
    open_slot(transport, slot.role, slot.topic.clone(), options).await
}

async fn close_slot(transport: &dyn Transport, slot: &ChannelSlot) {
    if let Some(handle) = &slot.handle {
        transport.unsubscribe(handle).await;
    }
}
