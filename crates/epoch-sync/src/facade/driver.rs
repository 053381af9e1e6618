//! Single event loop that drives a facade from UI commands and transport
//! events.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{ChatMessage, ChatScope, ReadySeed};
use crate::transport::TransportEvent;

use super::session::SynchronizationFacade;

/// Requests the UI layer sends into [`SynchronizationFacade::run`].
#[derive(Debug, Clone)]
pub enum SyncCommand {
    JoinEpoch {
        epoch_id: String,
        self_id: String,
        self_group_id: String,
        self_display_name: String,
    },
    JoinTeam {
        epoch_id: String,
        team_id: String,
    },
    LeaveTeam,
    LeaveEpoch,
    ResetUnread(ChatScope),
    InitReadyStates(Vec<ReadySeed>),
    Broadcast {
        scope: ChatScope,
        message: ChatMessage,
    },
    /// Leave everything and stop the loop.
    Dispose,
}

impl SynchronizationFacade {
    /// Run the facade until a [`SyncCommand::Dispose`] arrives or the
    /// command sender is dropped. Commands and events are applied one at a
    /// time, in the order they are received.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SyncCommand>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        let mut events_open = true;
        info!(session = %self.session_id(), "Synchronization loop started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SyncCommand::Dispose) | None => break,
                    Some(command) => self.apply(command).await,
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("Transport event stream closed");
                        events_open = false;
                    }
                },
            }
        }

        self.dispose().await;
        info!(session = %self.session_id(), "Synchronization loop stopped");
    }

    /// Apply one command.
    pub async fn apply(&mut self, command: SyncCommand) {
        debug!(?command, "Applying command");
        match command {
            SyncCommand::JoinEpoch {
                epoch_id,
                self_id,
                self_group_id,
                self_display_name,
            } => {
                self.join_epoch(&epoch_id, &self_id, &self_group_id, &self_display_name)
                    .await
            }
            SyncCommand::JoinTeam { epoch_id, team_id } => {
                self.join_team(&epoch_id, &team_id).await
            }
            SyncCommand::LeaveTeam => self.leave_team().await,
            SyncCommand::LeaveEpoch => self.leave_epoch().await,
            SyncCommand::ResetUnread(scope) => self.reset_unread(scope),
            SyncCommand::InitReadyStates(seeds) => self.init_ready_states(seeds),
            SyncCommand::Broadcast { scope, message } => {
                if let Err(e) = self.broadcast_message(scope, &message).await {
                    warn!(scope = %scope, error = %e, "Broadcast failed");
                }
            }
            SyncCommand::Dispose => self.dispose().await,
        }
    }
}
