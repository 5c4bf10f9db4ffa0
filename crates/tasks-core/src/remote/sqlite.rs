//! SQLite-backed remote store
//!
//! Every clone of a `SqliteRemoteStore` shares one connection and one change
//! channel, so sessions in the same process see each other's writes as
//! notifications. Processes sharing the database file see the rows but not
//! the notifications.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::error::{RemoteError, RemoteResult};
use super::schema::{init_schema, needs_init};
use super::{ChangeKind, ListRow, RemoteStore, RowChange, RowSubscription};

/// Buffered notifications per subscriber before it is considered lagging
const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct SqliteRemoteStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<RowChange>,
}

impl SqliteRemoteStore {
    /// Open (or create) the remote table at `path`
    pub fn open(path: impl AsRef<Path>) -> RemoteResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RemoteError::Open(format!("cannot create {:?}: {}", parent, e))
                })?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory table, mostly for tests
    pub fn open_in_memory() -> RemoteResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> RemoteResult<Self> {
        if needs_init(&conn) {
            init_schema(&conn)?;
        }
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        })
    }

    /// Number of rows owned by `owner_id`
    pub fn row_count(&self, owner_id: &str) -> RemoteResult<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM todo_lists WHERE owner_id = ?1",
            [owner_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, kind: ChangeKind, owner_id: &str, list_id: Option<&str>) {
        // No receivers is fine: nobody is listening
        let _ = self.changes.send(RowChange {
            kind,
            owner_id: owner_id.to_string(),
            list_id: list_id.map(str::to_string),
        });
    }
}

#[async_trait]
impl RemoteStore for SqliteRemoteStore {
    async fn fetch_rows(&self, owner_id: &str) -> RemoteResult<Vec<ListRow>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, items, owner_id, updated_at FROM todo_lists
                 WHERE owner_id = ?1 ORDER BY rowid",
            )
            .map_err(|e| RemoteError::Fetch(e.to_string()))?;

        let rows = stmt
            .query_map([owner_id], |row| {
                let items: String = row.get(2)?;
                let updated_at: i64 = row.get(4)?;
                Ok(ListRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    items: parse_items_column(items),
                    owner_id: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    updated_at: from_millis(updated_at),
                })
            })
            .map_err(|e| RemoteError::Fetch(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RemoteError::Fetch(e.to_string()))?;

        debug!("Fetched {} rows for {}", rows.len(), owner_id);
        Ok(rows)
    }

    async fn delete_rows(&self, owner_id: &str) -> RemoteResult<()> {
        let deleted = {
            let conn = self.lock();
            conn.execute("DELETE FROM todo_lists WHERE owner_id = ?1", [owner_id])
                .map_err(|e| RemoteError::Delete(e.to_string()))?
        };
        if deleted > 0 {
            self.notify(ChangeKind::Delete, owner_id, None);
        }
        Ok(())
    }

    async fn insert_row(&self, row: &ListRow) -> RemoteResult<()> {
        {
            let conn = self.lock();
            insert(&conn, row)?;
        }
        self.notify(ChangeKind::Insert, &row.owner_id, Some(&row.id));
        Ok(())
    }

    fn subscribe(&self, owner_id: &str) -> RemoteResult<RowSubscription> {
        Ok(RowSubscription::new(owner_id, self.changes.subscribe()))
    }

    /// Delete and re-insert inside one transaction
    async fn replace_owner_rows(&self, owner_id: &str, rows: &[ListRow]) -> RemoteResult<()> {
        let deleted = {
            let mut conn = self.lock();
            let tx = conn
                .transaction()
                .map_err(|e| RemoteError::Delete(e.to_string()))?;
            let deleted = tx
                .execute("DELETE FROM todo_lists WHERE owner_id = ?1", [owner_id])
                .map_err(|e| RemoteError::Delete(e.to_string()))?;
            for row in rows {
                insert(&tx, row)?;
            }
            tx.commit()
                .map_err(|e| RemoteError::Delete(e.to_string()))?;
            deleted
        };

        if deleted > 0 {
            self.notify(ChangeKind::Delete, owner_id, None);
        }
        for row in rows {
            self.notify(ChangeKind::Insert, owner_id, Some(&row.id));
        }
        Ok(())
    }
}

fn insert(conn: &Connection, row: &ListRow) -> RemoteResult<()> {
    let items = serde_json::to_string(&row.items)?;
    let now = Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO todo_lists (id, name, items, owner_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id,
            row.name,
            items,
            row.owner_id,
            now,
            row.updated_at.timestamp_millis()
        ],
    )
    .map_err(|e| RemoteError::Insert {
        list_id: row.id.clone(),
        message: e.to_string(),
    })?;
    Ok(())
}

/// Stored JSON, or the raw text as a string value if it is not JSON
fn parse_items_column(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
