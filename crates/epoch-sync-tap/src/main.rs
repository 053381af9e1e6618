//! epoch-sync-tap: joins an epoch over Supabase Realtime and logs what the
//! synchronization core sees.
//!
//! Useful for watching presence, chat and ready changes of a live epoch
//! from a terminal without running the UI.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use epoch_common::{new_id, EpochError};
use epoch_config::SyncConfig;
use epoch_sync::{
    BroadcastFeed, ChatMessage, RealtimeTransport, SyncCommand, SyncOptions, SyncState,
    SynchronizationFacade, Transport,
};
use tokio::sync::{broadcast, mpsc};

#[derive(Parser)]
#[command(name = "epoch-sync-tap", about = "Join an epoch and log its live state")]
struct Args {
    /// Epoch to join.
    #[arg(long)]
    epoch: String,

    /// Participant id to track presence under. Random when omitted.
    #[arg(long)]
    participant: Option<String>,

    /// Group (seat) id of the participant.
    #[arg(long)]
    group: String,

    /// Display name shown to other participants.
    #[arg(long, default_value = "tap")]
    name: String,

    /// Also join this team's chat.
    #[arg(long)]
    team: Option<String>,

    /// Config file to use instead of the platform default.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "epoch_sync=info,epoch_sync_tap=info".into()),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "epoch-sync-tap failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), EpochError> {
    let config: SyncConfig = match &args.config {
        Some(path) => epoch_config::load_config_from(path)?,
        None => epoch_config::load_config()?,
    };
    if !config.realtime.is_configured() {
        return Err(EpochError::Other(
            "realtime is not configured: set project_ref (or endpoint) and api_key".to_string(),
        ));
    }
    tracing::debug!(config = ?config.realtime, "Loaded realtime config");

    let (transport, events) = RealtimeTransport::connect(
        config.realtime.clone(),
        config.session.event_buffer as usize,
    );
    let transport = Arc::new(transport);
    let facade = SynchronizationFacade::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        SyncOptions::from(&config),
    );
    let mut state_rx = facade.subscribe();
    let mut diagnostics = facade.diagnostics();
    tracing::info!(session = %facade.session_id(), epoch = %args.epoch, "epoch-sync-tap starting");

    let (command_tx, command_rx) = mpsc::channel(16);
    let driver = tokio::spawn(facade.run(command_rx, events));

    let participant = args.participant.unwrap_or_else(new_id);
    send(
        &command_tx,
        SyncCommand::JoinEpoch {
            epoch_id: args.epoch.clone(),
            self_id: participant,
            self_group_id: args.group,
            self_display_name: args.name,
        },
    )
    .await?;
    if let Some(team_id) = args.team {
        send(
            &command_tx,
            SyncCommand::JoinTeam {
                epoch_id: args.epoch,
                team_id,
            },
        )
        .await?;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut seen = SyncState::default();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Interrupted, leaving epoch");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                log_changes(&seen, &state);
                seen = state;
            }
            diagnostic = diagnostics.recv() => match diagnostic {
                Ok(diagnostic) => tracing::warn!(%diagnostic, "Sync diagnostic"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Diagnostics lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let _ = command_tx.send(SyncCommand::Dispose).await;
    if let Err(e) = driver.await {
        tracing::warn!(error = %e, "Synchronization loop panicked");
    }
    transport.disconnect().await;
    Ok(())
}

async fn send(tx: &mpsc::Sender<SyncCommand>, command: SyncCommand) -> Result<(), EpochError> {
    tx.send(command)
        .await
        .map_err(|_| EpochError::Other("synchronization loop stopped".to_string()))
}

/// Log the difference between two snapshots.
fn log_changes(before: &SyncState, after: &SyncState) {
    if before.presence != after.presence {
        let online: Vec<&str> = after
            .presence
            .participants()
            .iter()
            .map(|p| p.display_name.as_str())
            .collect();
        tracing::info!(count = online.len(), ?online, "Presence");
    }

    for (feed_before, feed_after) in [
        (&before.epoch_feed, &after.epoch_feed),
        (&before.team_feed, &after.team_feed),
    ] {
        for message in new_messages(feed_before, feed_after) {
            tracing::info!(
                scope = %feed_after.scope(),
                from = message.sender_display_name.as_deref().unwrap_or(&message.sender_id),
                content = %message.content,
                "Message"
            );
        }
    }

    if before.unread != after.unread {
        tracing::info!(
            epoch = after.unread.epoch(),
            team = after.unread.team(),
            "Unread"
        );
    }

    if before.ready != after.ready {
        tracing::info!(
            ready = after.ready.ready_count(),
            total = after.ready.len(),
            all_ready = after.ready.all_ready(),
            "Ready states"
        );
    }
}

/// Messages in `after` that were not in `before`. Several state updates can
/// arrive as one notification, so a feed that no longer extends the old one
/// was reset and is logged whole.
fn new_messages<'a>(before: &BroadcastFeed, after: &'a BroadcastFeed) -> &'a [ChatMessage] {
    if after.messages().starts_with(before.messages()) {
        &after.messages()[before.len()..]
    } else {
        after.messages()
    }
}
