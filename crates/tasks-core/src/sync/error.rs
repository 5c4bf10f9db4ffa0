//! Sync setup errors
//!
//! Runtime remote failures never surface as `Err`; the orchestrator turns
//! them into its last-error string. These cover opening the stores.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),
}

pub type SyncResult<T> = Result<T, SyncError>;
