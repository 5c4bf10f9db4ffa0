//! Remote store errors

use thiserror::Error;

/// Errors reported by a remote store
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The store could not be opened
    #[error("Failed to open remote store: {0}")]
    Open(String),

    /// Querying the owner's rows failed
    #[error("Failed to fetch lists: {0}")]
    Fetch(String),

    /// Inserting a row failed
    #[error("Failed to insert list '{list_id}': {message}")]
    Insert { list_id: String, message: String },

    /// Deleting the owner's rows failed
    #[error("Failed to delete lists: {0}")]
    Delete(String),

    /// Opening a change subscription failed
    #[error("Failed to subscribe to changes: {0}")]
    Subscribe(String),

    /// Items could not be encoded for upload
    #[error("Failed to encode items: {0}")]
    Encode(#[from] serde_json::Error),

    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
