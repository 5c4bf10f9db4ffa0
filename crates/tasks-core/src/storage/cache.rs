//! Typed list cache on top of a `LocalStore`

use std::sync::Arc;

use super::error::{StorageError, StorageResult};
use super::local::LocalStore;
use crate::models::TodoList;

/// Key under which the whole collection is stored
pub const LISTS_KEY: &str = "todoLists";

/// The full collection, stored as JSON under `LISTS_KEY`
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn LocalStore>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Load the cached collection
    ///
    /// Returns `None` if nothing was ever saved.
    pub fn load(&self) -> StorageResult<Option<Vec<TodoList>>> {
        let Some(raw) = self.store.get(LISTS_KEY)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::InvalidFormat {
                key: LISTS_KEY.to_string(),
                source,
            })
    }

    /// Replace the cached collection
    pub fn save(&self, lists: &[TodoList]) -> StorageResult<()> {
        let raw = serde_json::to_string(lists).map_err(|source| StorageError::Encode {
            key: LISTS_KEY.to_string(),
            source,
        })?;
        self.store.set(LISTS_KEY, &raw)
    }
}
