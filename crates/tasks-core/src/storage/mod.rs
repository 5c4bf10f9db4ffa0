//! Local storage layer
//!
//! Durable key-value storage for the offline-first side of sync.
//!
//! ## Architecture
//!
//! - **LocalStore**: get/set of one serialized value per key
//! - **LocalCache**: the whole collection under a fixed key
//!
//! Every collection change is written here before anything goes remote.

pub mod cache;
pub mod error;
pub mod local;

pub use cache::{LocalCache, LISTS_KEY};
pub use error::{StorageError, StorageResult};
pub use local::{FileLocalStore, LocalStore, MemoryLocalStore};
