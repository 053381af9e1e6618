//! Online participants of the active epoch.
//!
//! Every presence sync carries the channel's complete state, so the
//! tracker never merges: each sync replaces the exposed list wholesale.

use tracing::debug;

use crate::protocol::ParticipantPresence;
use crate::transport::PresenceState;

/// The most recent presence snapshot of the epoch presence channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceTracker {
    participants: Vec<ParticipantPresence>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the online list with the flattened `state`. Returns the new
    /// number of entries.
    pub fn sync(&mut self, state: &PresenceState) -> usize {
        self.participants = flatten_presence(state);
        self.participants.len()
    }

    pub fn participants(&self) -> &[ParticipantPresence] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

}

/// Flatten a presence state into one list, in key order and then payload
/// order. A participant tracked from two connections appears twice.
pub fn flatten_presence(state: &PresenceState) -> Vec<ParticipantPresence> {
    state
        .iter()
        .flat_map(|(key, metas)| metas.iter().map(move |meta| (key, meta)))
        .filter_map(|(key, meta)| {
            match serde_json::from_value::<ParticipantPresence>(meta.clone()) {
                Ok(p) => Some(p),
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping undecodable presence payload");
                    None
                }
            }
        })
        .collect()
}
