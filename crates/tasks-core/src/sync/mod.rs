//! Sync between the local cache and the remote store
//!
//! ## Architecture
//!
//! - **SyncOrchestrator**: owns the collection, debounces uploads, loads
//!   remote data and reacts to auth and row changes
//! - **Reconciler**: decides how remote data is merged (last writer wins)

mod error;
mod orchestrator;
mod reconcile;

pub use error::{SyncError, SyncResult};
pub use orchestrator::{
    LoadOutcome, SyncOrchestrator, SyncOrchestratorBuilder, SyncStatus, UploadOutcome,
};
pub use reconcile::{LastWriterWins, Reconciler};
