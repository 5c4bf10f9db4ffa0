//! Remote list store
//!
//! A row-oriented table keyed by list id, scoped by owner, with a change
//! subscription so other devices' writes can be pulled in.
//!
//! ## Usage
//!
//! ```ignore
//! let remote = SqliteRemoteStore::open("remote.db")?;
//! let mut changes = remote.subscribe("user-1")?;
//! remote.replace_owner_rows("user-1", &rows).await?;
//! let change = changes.next().await;
//! ```

mod codec;
mod error;
mod schema;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

pub use codec::{decode_items, encode_items, list_to_row, row_to_list};
pub use error::{RemoteError, RemoteResult};
pub use schema::SCHEMA_VERSION;
pub use sqlite::SqliteRemoteStore;

/// One list as stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRow {
    /// List id (primary key)
    pub id: String,
    /// Display name
    pub name: String,
    /// Item payload: a JSON array, a string-encoded array, or junk
    pub items: Value,
    /// Owning user
    pub owner_id: String,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

/// Kind of row-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change notification for one owner's rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChange {
    pub kind: ChangeKind,
    pub owner_id: String,
    /// Affected list, or `None` for owner-wide changes (bulk delete, lag)
    pub list_id: Option<String>,
}

/// Live change feed for one owner
///
/// Dropping the subscription (or calling `unsubscribe`) tears it down.
pub struct RowSubscription {
    owner_id: String,
    rx: broadcast::Receiver<RowChange>,
}

impl RowSubscription {
    pub fn new(owner_id: impl Into<String>, rx: broadcast::Receiver<RowChange>) -> Self {
        Self {
            owner_id: owner_id.into(),
            rx,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Wait for the next change to this owner's rows
    ///
    /// Returns `None` once the store is gone. If notifications were dropped
    /// because this subscriber fell behind, an owner-wide `Update` is
    /// reported instead.
    pub async fn next(&mut self) -> Option<RowChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.owner_id == self.owner_id => return Some(change),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!("Change subscription lagged, {} notifications dropped", missed);
                    return Some(self.owner_wide_update());
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take an already-queued change without waiting
    pub fn try_next(&mut self) -> Option<RowChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) if change.owner_id == self.owner_id => return Some(change),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => return Some(self.owner_wide_update()),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Tear down the subscription
    pub fn unsubscribe(self) {}

    fn owner_wide_update(&self) -> RowChange {
        RowChange {
            kind: ChangeKind::Update,
            owner_id: self.owner_id.clone(),
            list_id: None,
        }
    }
}

/// Remote row store
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// All rows owned by `owner_id`
    async fn fetch_rows(&self, owner_id: &str) -> RemoteResult<Vec<ListRow>>;

    /// Remove every row owned by `owner_id`
    async fn delete_rows(&self, owner_id: &str) -> RemoteResult<()>;

    /// Add one row
    async fn insert_row(&self, row: &ListRow) -> RemoteResult<()>;

    /// Subscribe to row changes scoped to `owner_id`
    fn subscribe(&self, owner_id: &str) -> RemoteResult<RowSubscription>;

    /// Replace all of an owner's rows with `rows`
    ///
    /// The default deletes, then inserts in order, stopping at the first
    /// failed insert; the remote is then left partially replaced. Stores
    /// with transactions should override this to apply atomically.
    async fn replace_owner_rows(&self, owner_id: &str, rows: &[ListRow]) -> RemoteResult<()> {
        self.delete_rows(owner_id).await?;
        for row in rows {
            self.insert_row(row).await?;
        }
        Ok(())
    }
}
