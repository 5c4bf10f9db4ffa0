//! Tasks Core Library
//!
//! This crate provides the core functionality for Tasks, offline-first task
//! lists that sync to a remote row store when signed in.
//!
//! # Architecture
//!
//! - **Local cache**: every change is persisted locally first
//! - **Remote store**: one row per list, scoped by owner, with change
//!   notifications
//! - **Sync orchestrator**: debounced uploads, last-writer-wins loads
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let auth = AuthHandle::new(AuthState::from_user_id(config.user_id.clone()));
//! let sync = SyncOrchestrator::open_with_config(&config, auth.subscribe())?;
//! sync.start();
//!
//! // Add a list
//! let list_id = sync.apply(|lists| Ok(collection::create_list(lists)))?;
//!
//! // Push now instead of waiting for the debounce
//! sync.sync_now().await;
//! ```
//!
//! # Modules
//!
//! - `sync`: Sync orchestrator (main entry point)
//! - `models`: Lists and items
//! - `collection`: Pure edits over the list collection
//! - `storage`: Local key-value cache
//! - `remote`: Remote row store and payload codec
//! - `auth`: Signed-in state
//! - `config`: Application configuration

pub mod auth;
pub mod collection;
pub mod config;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;

pub use auth::{AuthHandle, AuthState};
pub use collection::{CollectionError, CollectionResult};
pub use config::Config;
pub use models::{Priority, TodoItem, TodoList};
pub use remote::{RemoteError, RemoteStore, SqliteRemoteStore};
pub use storage::{FileLocalStore, LocalCache, LocalStore, MemoryLocalStore, StorageError};
pub use sync::{
    LoadOutcome, SyncError, SyncOrchestrator, SyncStatus, UploadOutcome,
};
