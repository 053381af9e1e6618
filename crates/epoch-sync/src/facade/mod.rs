//! Public entry point of the synchronization core.
//!
//! [`SynchronizationFacade`] owns the channel lifecycle and every
//! observable container. One instance serves one session: at most one
//! epoch and one team are active at a time.

mod driver;
mod session;
mod state;


pub use driver::SyncCommand;
pub use session::{SyncOptions, SynchronizationFacade};
pub use state::{SessionPhase, SyncDiagnostic, SyncState, TeamPhase};
