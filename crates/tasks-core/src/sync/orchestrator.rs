//! Sync orchestrator
//!
//! Keeps the in-memory collection, the local cache and the remote table in
//! step:
//! - every replace is written locally right away
//! - uploads are debounced and skipped when nothing changed since the last
//!   successful one
//! - loads reconcile remote data into the collection (last writer wins)
//! - remote change notifications trigger a reload while signed in
//!
//! ## Usage
//!
//! ```ignore
//! let auth = AuthHandle::new(AuthState::from_user_id(config.user_id.clone()));
//! let sync = SyncOrchestrator::open_with_config(&config, auth.subscribe())?;
//! sync.start();
//!
//! let list_id = sync.apply(|lists| Ok(collection::create_list(lists)))?;
//! sync.sync_now().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::SyncResult;
use super::reconcile::{LastWriterWins, Reconciler};
use crate::auth::AuthState;
use crate::collection::CollectionError;
use crate::config::{Config, DEFAULT_DEBOUNCE_MS};
use crate::models::TodoList;
use crate::remote::{list_to_row, row_to_list, RemoteStore, RowSubscription, SqliteRemoteStore};
use crate::storage::{FileLocalStore, LocalCache, StorageError};

/// Result of an upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum UploadOutcome {
    /// Remote rows were replaced
    Uploaded { lists: usize },
    /// Same snapshot as the last successful upload, nothing sent
    Unchanged,
    NotSignedIn,
    /// Another upload holds the guard
    InFlight,
    /// Error recorded as the last error
    Failed,
}

/// Result of a load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum LoadOutcome {
    /// Remote lists replaced the collection
    Loaded { lists: usize },
    /// Remote was empty on first load; local lists were pushed up
    Seeded { lists: usize, upload: UploadOutcome },
    /// Remote was empty after the first load; nothing changed
    Empty,
    /// Remote matched the last sync, local state kept
    Unchanged,
    NotSignedIn,
    /// Fetch failed; collection reloaded from the local cache
    Failed,
}

/// Snapshot of orchestrator state for front-ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub signed_in: bool,
    pub user_id: Option<String>,
    pub remote_configured: bool,
    pub uploading: bool,
    pub upload_pending: bool,
    pub initialized: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadTrigger {
    Explicit,
    RemoteChange,
}

struct State {
    lists: Vec<TodoList>,
    /// Bumped on every local replace
    revision: u64,
    /// Serialized collection of the last successful upload or load
    last_synced: Option<String>,
    pending_upload: Option<JoinHandle<()>>,
    /// Bumped on every arm; a firing timer with an older value is stale
    upload_generation: u64,
    initialized: bool,
    last_error: Option<String>,
    auth_watcher: Option<JoinHandle<()>>,
    change_listener: Option<JoinHandle<()>>,
}

impl State {
    fn note_error(&mut self, message: String) {
        warn!("{}", message);
        self.last_error = Some(message);
    }

    fn cancel_pending_upload(&mut self) {
        if let Some(handle) = self.pending_upload.take() {
            handle.abort();
        }
    }

    fn stop_change_listener(&mut self) {
        if let Some(handle) = self.change_listener.take() {
            handle.abort();
        }
    }

    fn abort_tasks(&mut self) {
        self.cancel_pending_upload();
        self.stop_change_listener();
        if let Some(handle) = self.auth_watcher.take() {
            handle.abort();
        }
    }
}

struct Inner {
    cache: LocalCache,
    remote: Option<Arc<dyn RemoteStore>>,
    reconciler: Box<dyn Reconciler>,
    debounce: Duration,
    auth: watch::Receiver<AuthState>,
    uploading: AtomicBool,
    state: Mutex<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        state.abort_tasks();
    }
}

/// Holds the upload-in-flight flag until dropped
struct UploadGuard<'a>(&'a AtomicBool);

impl<'a> UploadGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Builder for [`SyncOrchestrator`]
pub struct SyncOrchestratorBuilder {
    cache: LocalCache,
    remote: Option<Arc<dyn RemoteStore>>,
    reconciler: Box<dyn Reconciler>,
    debounce: Duration,
    auth: Option<watch::Receiver<AuthState>>,
}

impl SyncOrchestratorBuilder {
    pub fn remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn auth(mut self, auth: watch::Receiver<AuthState>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn reconciler(mut self, reconciler: impl Reconciler) -> Self {
        self.reconciler = Box::new(reconciler);
        self
    }

    /// Build the orchestrator, seeding the collection from the local cache
    ///
    /// An empty or missing cache starts with a single default list. An
    /// unreadable cache does the same and records the error.
    pub fn build(self) -> SyncOrchestrator {
        let mut last_error = None;
        let lists = match self.cache.load() {
            Ok(Some(lists)) if !lists.is_empty() => lists,
            Ok(_) => vec![TodoList::default_list()],
            Err(e) => {
                warn!("Local lists unreadable, starting fresh: {}", e);
                last_error = Some(e.to_string());
                vec![TodoList::default_list()]
            }
        };

        // Signed out for good when no auth source is wired in
        let auth = self
            .auth
            .unwrap_or_else(|| watch::channel(AuthState::SignedOut).1);

        SyncOrchestrator {
            inner: Arc::new(Inner {
                cache: self.cache,
                remote: self.remote,
                reconciler: self.reconciler,
                debounce: self.debounce,
                auth,
                uploading: AtomicBool::new(false),
                state: Mutex::new(State {
                    lists,
                    revision: 0,
                    last_synced: None,
                    pending_upload: None,
                    upload_generation: 0,
                    initialized: false,
                    last_error,
                    auth_watcher: None,
                    change_listener: None,
                }),
            }),
        }
    }
}

/// Coordinates the local cache, the remote store and the auth state
///
/// Cheap to clone; clones share state. Background tasks hold weak
/// references and stop once every handle is dropped.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    pub fn builder(cache: LocalCache) -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder {
            cache,
            remote: None,
            reconciler: Box::new(LastWriterWins),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            auth: None,
        }
    }

    /// Open the file-backed local cache and, when configured, the SQLite
    /// remote table
    pub fn open_with_config(
        config: &Config,
        auth: watch::Receiver<AuthState>,
    ) -> SyncResult<Self> {
        let local = FileLocalStore::open(config.local_store_dir())?;
        let mut builder = Self::builder(LocalCache::new(Arc::new(local)))
            .auth(auth)
            .debounce(config.debounce());

        if let Some(path) = &config.remote_db {
            let remote = SqliteRemoteStore::open(path)?;
            builder = builder.remote(Arc::new(remote));
        }

        Ok(builder.build())
    }

    // ==================== Collection ====================

    /// Current collection
    pub fn lists(&self) -> Vec<TodoList> {
        self.lock_state().lists.clone()
    }

    /// Replace the whole collection
    ///
    /// Writes the local cache immediately. When signed in, any pending
    /// upload is cancelled and a new one is scheduled after the debounce
    /// delay carrying `lists` as it is now.
    pub fn set_lists(&self, lists: Vec<TodoList>) {
        let mut state = self.lock_state();
        if let Err(e) = self.inner.cache.save(&lists) {
            state.note_error(local_save_error(&e));
        }
        state.lists = lists.clone();
        state.revision += 1;

        state.cancel_pending_upload();
        if self.session().is_some() {
            self.arm_upload(&mut state, lists);
        }
    }

    /// Run a collection edit against the current lists and store the result
    ///
    /// A rejected edit leaves everything untouched.
    pub fn apply<T, F>(&self, edit: F) -> Result<T, CollectionError>
    where
        F: FnOnce(&[TodoList]) -> Result<(Vec<TodoList>, T), CollectionError>,
    {
        let current = self.lists();
        let (next, value) = edit(&current)?;
        self.set_lists(next);
        Ok(value)
    }

    // ==================== Remote ====================

    /// Upload the current collection right away
    pub async fn sync_now(&self) -> UploadOutcome {
        let lists = self.lists();
        self.upload(&lists).await
    }

    /// Replace the signed-in user's remote rows with `lists`
    pub async fn upload(&self, lists: &[TodoList]) -> UploadOutcome {
        let Some((remote, user_id)) = self.session() else {
            debug!("Not signed in, skipping upload");
            return UploadOutcome::NotSignedIn;
        };
        let Some(_guard) = UploadGuard::acquire(&self.inner.uploading) else {
            debug!("Upload already in flight, skipping");
            return UploadOutcome::InFlight;
        };

        let snapshot = match snapshot_of(lists) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.record_error(format!("Failed to encode lists: {}", e));
                return UploadOutcome::Failed;
            }
        };
        if self.last_synced_is(&snapshot) {
            debug!("Lists unchanged since last sync, skipping upload");
            return UploadOutcome::Unchanged;
        }

        let now = Utc::now();
        let rows = match lists
            .iter()
            .map(|list| list_to_row(list, &user_id, now))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(rows) => rows,
            Err(e) => {
                self.record_error(format!("Failed to encode items: {}", e));
                return UploadOutcome::Failed;
            }
        };

        match remote.replace_owner_rows(&user_id, &rows).await {
            Ok(()) => {
                self.lock_state().last_synced = Some(snapshot);
                info!("Uploaded {} lists for {}", rows.len(), user_id);
                UploadOutcome::Uploaded { lists: rows.len() }
            }
            Err(e) => {
                self.record_error(e.to_string());
                UploadOutcome::Failed
            }
        }
    }

    /// Pull the signed-in user's lists from the remote store
    ///
    /// Remote data replaces the collection. An empty remote on the first
    /// load is seeded with the local lists instead.
    pub async fn load_from_remote(&self) -> LoadOutcome {
        self.load(LoadTrigger::Explicit).await
    }

    async fn load(&self, trigger: LoadTrigger) -> LoadOutcome {
        let Some((remote, user_id)) = self.session() else {
            debug!("Not signed in, skipping load");
            return LoadOutcome::NotSignedIn;
        };

        let outcome = match remote.fetch_rows(&user_id).await {
            Ok(rows) => {
                let lists: Vec<TodoList> = rows.iter().map(row_to_list).collect();
                if !lists.is_empty() {
                    self.adopt_remote(lists, trigger)
                } else if !self.is_initialized() {
                    self.seed_remote().await
                } else {
                    debug!("Remote has no lists for {}", user_id);
                    LoadOutcome::Empty
                }
            }
            Err(e) => {
                self.record_error(e.to_string());
                self.fall_back_to_local();
                LoadOutcome::Failed
            }
        };

        self.lock_state().initialized = true;
        outcome
    }

    fn adopt_remote(&self, lists: Vec<TodoList>, trigger: LoadTrigger) -> LoadOutcome {
        let snapshot = snapshot_of(&lists).ok();
        let mut state = self.lock_state();

        if trigger == LoadTrigger::RemoteChange
            && snapshot.is_some()
            && state.last_synced == snapshot
        {
            debug!("Remote matches last sync, keeping local lists");
            return LoadOutcome::Unchanged;
        }

        let merged = self.inner.reconciler.reconcile(&state.lists, lists);
        if let Err(e) = self.inner.cache.save(&merged) {
            state.note_error(local_save_error(&e));
        }
        let count = merged.len();
        state.lists = merged;
        state.last_synced = snapshot;
        info!("Loaded {} lists from remote", count);
        LoadOutcome::Loaded { lists: count }
    }

    async fn seed_remote(&self) -> LoadOutcome {
        let (mut seed, revision) = {
            let state = self.lock_state();
            (state.lists.clone(), state.revision)
        };
        if seed.is_empty() {
            seed = vec![TodoList::default_list()];
        }
        info!("Remote is empty, uploading {} local lists", seed.len());

        let upload = self.upload(&seed).await;
        let count = seed.len();
        {
            let mut state = self.lock_state();
            if state.revision != revision {
                // A newer replace is stored locally and has its own upload armed
                debug!("Lists changed during seed upload, keeping local edits");
            } else {
                if let Err(e) = self.inner.cache.save(&seed) {
                    state.note_error(local_save_error(&e));
                }
                state.lists = seed.clone();
                if upload == UploadOutcome::InFlight {
                    warn!("Seed upload blocked by an upload in flight, rescheduling");
                    state.cancel_pending_upload();
                    self.arm_upload(&mut state, seed);
                }
            }
        }
        LoadOutcome::Seeded {
            lists: count,
            upload,
        }
    }

    fn fall_back_to_local(&self) {
        match self.inner.cache.load() {
            Ok(Some(lists)) if !lists.is_empty() => self.lock_state().lists = lists,
            Ok(_) => {}
            Err(e) => warn!("Local lists unreadable, keeping in-memory copy: {}", e),
        }
    }

    // ==================== Debounce ====================

    fn arm_upload(&self, state: &mut State, lists: Vec<TodoList>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime, upload not scheduled");
            return;
        };

        state.upload_generation += 1;
        let generation = state.upload_generation;
        let delay = self.inner.debounce;
        let weak = Arc::downgrade(&self.inner);
        debug!("Upload scheduled in {:?}", delay);

        state.pending_upload = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                SyncOrchestrator { inner }
                    .fire_upload(generation, lists)
                    .await;
            }
        }));
    }

    async fn fire_upload(&self, generation: u64, lists: Vec<TodoList>) {
        {
            let mut state = self.lock_state();
            if state.upload_generation != generation {
                return;
            }
            // Detach: from here on a newer replace must not cancel this upload
            state.pending_upload = None;

            if self.is_uploading() {
                debug!("Upload in flight, rescheduling");
                self.arm_upload(&mut state, lists);
                return;
            }
        }
        self.upload(&lists).await;
    }

    // ==================== Background tasks ====================

    /// Start watching the auth state
    ///
    /// Signing in runs the first load (once per process) and opens the
    /// change subscription; signing out closes it and drops any pending
    /// upload. Calling this again is a no-op.
    pub fn start(&self) {
        let mut state = self.lock_state();
        if state.auth_watcher.is_some() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime, auth watcher not started");
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let auth = self.inner.auth.clone();
        state.auth_watcher = Some(runtime.spawn(watch_auth(weak, auth)));
    }

    /// Abort background tasks and any pending upload
    ///
    /// An upload already running is left to finish.
    pub fn shutdown(&self) {
        self.lock_state().abort_tasks();
    }

    async fn on_auth_changed(&self, auth: AuthState) {
        self.lock_state().stop_change_listener();

        match auth.user_id() {
            Some(user_id) => {
                if !self.is_initialized() {
                    info!("Signed in as {}, loading lists", user_id);
                    self.load_from_remote().await;
                }
                self.listen_for_changes(user_id);
            }
            None => {
                debug!("Signed out, cancelling pending upload");
                self.lock_state().cancel_pending_upload();
            }
        }
    }

    fn listen_for_changes(&self, user_id: &str) {
        let Some(remote) = self.inner.remote.clone() else {
            return;
        };
        match remote.subscribe(user_id) {
            Ok(subscription) => {
                let weak = Arc::downgrade(&self.inner);
                let handle = tokio::spawn(follow_changes(weak, subscription));
                self.lock_state().change_listener = Some(handle);
            }
            Err(e) => self.record_error(e.to_string()),
        }
    }

    // ==================== Status ====================

    pub fn status(&self) -> SyncStatus {
        let user_id = self.inner.auth.borrow().user_id().map(str::to_string);
        let state = self.lock_state();
        SyncStatus {
            signed_in: user_id.is_some(),
            user_id,
            remote_configured: self.inner.remote.is_some(),
            uploading: self.is_uploading(),
            upload_pending: state
                .pending_upload
                .as_ref()
                .is_some_and(|handle| !handle.is_finished()),
            initialized: state.initialized,
            last_error: state.last_error.clone(),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.lock_state().last_error = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_state().initialized
    }

    pub fn is_uploading(&self) -> bool {
        self.inner.uploading.load(Ordering::Acquire)
    }

    // ==================== Internals ====================

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_error(&self, message: String) {
        self.lock_state().note_error(message);
    }

    fn last_synced_is(&self, snapshot: &str) -> bool {
        self.lock_state().last_synced.as_deref() == Some(snapshot)
    }

    /// Remote store and user id, when both are available
    fn session(&self) -> Option<(Arc<dyn RemoteStore>, String)> {
        let remote = self.inner.remote.clone()?;
        let user_id = self.inner.auth.borrow().user_id()?.to_string();
        Some((remote, user_id))
    }
}

fn local_save_error(error: &StorageError) -> String {
    match error.recovery_suggestion() {
        Some(hint) => format!("Failed to save lists locally: {} {}", error, hint),
        None => format!("Failed to save lists locally: {}", error),
    }
}

/// Serialized form used to detect unchanged collections
fn snapshot_of(lists: &[TodoList]) -> serde_json::Result<String> {
    serde_json::to_string(lists)
}

async fn watch_auth(weak: Weak<Inner>, mut auth: watch::Receiver<AuthState>) {
    loop {
        let current = auth.borrow_and_update().clone();
        {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            SyncOrchestrator { inner }.on_auth_changed(current).await;
        }
        if auth.changed().await.is_err() {
            return;
        }
    }
}

async fn follow_changes(weak: Weak<Inner>, mut subscription: RowSubscription) {
    while let Some(change) = subscription.next().await {
        // One upload elsewhere arrives as a burst; reload once for all of it
        while subscription.try_next().is_some() {}

        let Some(inner) = weak.upgrade() else {
            return;
        };
        let sync = SyncOrchestrator { inner };
        if sync.is_uploading() {
            debug!("Ignoring remote change during upload");
            continue;
        }
        debug!(
            "Remote {:?} for {}, reloading",
            change.kind,
            subscription.owner_id()
        );
        sync.load(LoadTrigger::RemoteChange).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthHandle;
    use crate::collection;
    use crate::models::TodoItem;
    use crate::remote::{ListRow, RemoteError, RemoteResult};
    use crate::storage::{LocalStore, MemoryLocalStore, LISTS_KEY};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    const USER: &str = "user-1";

    /// Counts remote calls and can be told to fail or stall
    struct RecordingRemote {
        inner: SqliteRemoteStore,
        fetches: AtomicUsize,
        replaces: AtomicUsize,
        uploads: Mutex<Vec<Vec<ListRow>>>,
        fail_fetch: AtomicBool,
        fail_upload: AtomicBool,
        upload_delay: Duration,
    }

    impl RecordingRemote {
        fn new() -> Self {
            Self::sharing(SqliteRemoteStore::open_in_memory().unwrap())
        }

        fn sharing(inner: SqliteRemoteStore) -> Self {
            Self {
                inner,
                fetches: AtomicUsize::new(0),
                replaces: AtomicUsize::new(0),
                uploads: Mutex::new(Vec::new()),
                fail_fetch: AtomicBool::new(false),
                fail_upload: AtomicBool::new(false),
                upload_delay: Duration::ZERO,
            }
        }

        fn with_upload_delay(mut self, delay: Duration) -> Self {
            self.upload_delay = delay;
            self
        }

        fn replace_count(&self) -> usize {
            self.replaces.load(Ordering::SeqCst)
        }

        fn last_upload_names(&self) -> Vec<String> {
            let uploads = self.uploads.lock().unwrap();
            uploads
                .last()
                .map(|rows| rows.iter().map(|r| r.name.clone()).collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl RemoteStore for RecordingRemote {
        async fn fetch_rows(&self, owner_id: &str) -> RemoteResult<Vec<ListRow>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(RemoteError::Fetch("connection refused".to_string()));
            }
            self.inner.fetch_rows(owner_id).await
        }

        async fn delete_rows(&self, owner_id: &str) -> RemoteResult<()> {
            self.inner.delete_rows(owner_id).await
        }

        async fn insert_row(&self, row: &ListRow) -> RemoteResult<()> {
            self.inner.insert_row(row).await
        }

        fn subscribe(&self, owner_id: &str) -> RemoteResult<RowSubscription> {
            self.inner.subscribe(owner_id)
        }

        async fn replace_owner_rows(&self, owner_id: &str, rows: &[ListRow]) -> RemoteResult<()> {
            self.replaces.fetch_add(1, Ordering::SeqCst);
            if !self.upload_delay.is_zero() {
                tokio::time::sleep(self.upload_delay).await;
            }
            if self.fail_upload.load(Ordering::SeqCst) {
                return Err(RemoteError::Delete("permission denied".to_string()));
            }
            self.uploads.lock().unwrap().push(rows.to_vec());
            self.inner.replace_owner_rows(owner_id, rows).await
        }
    }

    /// Keeps the default delete-then-insert replace; fails the nth insert
    struct FailingInsertRemote {
        inner: SqliteRemoteStore,
        inserts: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl RemoteStore for FailingInsertRemote {
        async fn fetch_rows(&self, owner_id: &str) -> RemoteResult<Vec<ListRow>> {
            self.inner.fetch_rows(owner_id).await
        }

        async fn delete_rows(&self, owner_id: &str) -> RemoteResult<()> {
            self.inner.delete_rows(owner_id).await
        }

        async fn insert_row(&self, row: &ListRow) -> RemoteResult<()> {
            let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_on {
                return Err(RemoteError::Insert {
                    list_id: row.id.clone(),
                    message: "quota exceeded".to_string(),
                });
            }
            self.inner.insert_row(row).await
        }

        fn subscribe(&self, owner_id: &str) -> RemoteResult<RowSubscription> {
            self.inner.subscribe(owner_id)
        }
    }

    struct Harness {
        sync: SyncOrchestrator,
        remote: Arc<RecordingRemote>,
        store: Arc<MemoryLocalStore>,
        auth: AuthHandle,
    }

    fn harness_with(remote: RecordingRemote, auth: AuthState, lists: Option<&[TodoList]>) -> Harness {
        let store = Arc::new(MemoryLocalStore::new());
        let cache = LocalCache::new(store.clone());
        if let Some(lists) = lists {
            cache.save(lists).unwrap();
        }
        let remote = Arc::new(remote);
        let auth = AuthHandle::new(auth);
        let sync = SyncOrchestrator::builder(cache)
            .remote(remote.clone())
            .auth(auth.subscribe())
            .build();
        Harness {
            sync,
            remote,
            store,
            auth,
        }
    }

    fn signed_in() -> Harness {
        harness_with(RecordingRemote::new(), AuthState::signed_in(USER), None)
    }

    fn signed_out() -> Harness {
        harness_with(RecordingRemote::new(), AuthState::SignedOut, None)
    }

    fn cached_lists(store: &Arc<MemoryLocalStore>) -> Vec<TodoList> {
        LocalCache::new(store.clone()).load().unwrap().unwrap()
    }

    fn list_named(name: &str) -> TodoList {
        TodoList::new(name)
    }

    fn remote_row(id: &str, name: &str, items: Value) -> ListRow {
        ListRow {
            id: id.to_string(),
            name: name.to_string(),
            items,
            owner_id: USER.to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_seeds_default_list() {
        let h = signed_out();
        let lists = h.sync.lists();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "My Tasks");
        assert!(h.sync.last_error().is_none());
    }

    #[test]
    fn test_build_seeds_from_cache() {
        let cached = vec![list_named("Groceries"), list_named("Work")];
        let h = harness_with(RecordingRemote::new(), AuthState::SignedOut, Some(cached.as_slice()));
        assert_eq!(h.sync.lists(), cached);
    }

    #[test]
    fn test_build_with_corrupt_cache_records_error() {
        let store = Arc::new(MemoryLocalStore::new());
        store.set(LISTS_KEY, "{broken").unwrap();
        let sync = SyncOrchestrator::builder(LocalCache::new(store)).build();

        assert_eq!(sync.lists().len(), 1);
        assert!(sync.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_out_mutations_persist_locally() {
        let h = signed_out();

        let list_id = h.sync.apply(|lists| Ok(collection::create_list(lists))).unwrap();
        assert_eq!(h.sync.lists(), cached_lists(&h.store));

        h.sync
            .apply(|lists| collection::rename_list(lists, &list_id, "Errands").map(|l| (l, ())))
            .unwrap();
        assert_eq!(h.sync.lists(), cached_lists(&h.store));

        let item_id = h
            .sync
            .apply(|lists| collection::add_item(lists, &list_id))
            .unwrap();
        h.sync
            .apply(|lists| {
                collection::update_item(lists, &list_id, &item_id, |item| {
                    item.set_title("Post office");
                    Ok(())
                })
                .map(|l| (l, ()))
            })
            .unwrap();
        assert_eq!(h.sync.lists(), cached_lists(&h.store));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.remote.replace_count(), 0);
        assert!(!h.sync.status().upload_pending);
    }

    #[tokio::test]
    async fn test_upload_twice_short_circuits() {
        let h = signed_in();
        let lists = h.sync.lists();

        assert_eq!(h.sync.upload(&lists).await, UploadOutcome::Uploaded { lists: 1 });
        assert_eq!(h.sync.upload(&lists).await, UploadOutcome::Unchanged);
        assert_eq!(h.remote.replace_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_signed_out_is_skipped() {
        let h = signed_out();
        assert_eq!(h.sync.sync_now().await, UploadOutcome::NotSignedIn);
        assert_eq!(h.sync.load_from_remote().await, LoadOutcome::NotSignedIn);
        assert_eq!(h.remote.replace_count(), 0);
        assert_eq!(h.remote.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_without_remote_is_skipped() {
        let auth = AuthHandle::new(AuthState::signed_in(USER));
        let sync = SyncOrchestrator::builder(LocalCache::new(Arc::new(MemoryLocalStore::new())))
            .auth(auth.subscribe())
            .build();
        assert_eq!(sync.sync_now().await, UploadOutcome::NotSignedIn);
        assert!(!sync.status().remote_configured);
    }

    #[tokio::test]
    async fn test_first_load_seeds_empty_remote() {
        let h = signed_in();
        assert!(!h.sync.is_initialized());

        let outcome = h.sync.load_from_remote().await;
        assert_eq!(
            outcome,
            LoadOutcome::Seeded {
                lists: 1,
                upload: UploadOutcome::Uploaded { lists: 1 }
            }
        );
        assert_eq!(h.remote.replace_count(), 1);
        assert_eq!(h.remote.last_upload_names(), vec!["My Tasks".to_string()]);
        assert_eq!(h.remote.inner.row_count(USER).unwrap(), 1);
        assert!(h.sync.is_initialized());
        assert_eq!(cached_lists(&h.store), h.sync.lists());

        // Remote now has data: a second load adopts it, no upload
        assert_eq!(h.sync.load_from_remote().await, LoadOutcome::Loaded { lists: 1 });
        assert_eq!(h.remote.replace_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_remote_after_first_load_changes_nothing() {
        let h = signed_in();
        h.sync.load_from_remote().await;
        h.remote.inner.delete_rows(USER).await.unwrap();

        assert_eq!(h.sync.load_from_remote().await, LoadOutcome::Empty);
        assert_eq!(h.remote.replace_count(), 1);
        assert_eq!(h.sync.lists().len(), 1);
    }

    #[tokio::test]
    async fn test_load_overwrites_local_with_remote() {
        let local = vec![list_named("Local only")];
        let h = harness_with(
            RecordingRemote::new(),
            AuthState::signed_in(USER),
            Some(local.as_slice()),
        );
        let mut remote_list = list_named("From phone");
        remote_list.items.push(TodoItem::new("Call dentist"));
        let row = list_to_row(&remote_list, USER, Utc::now()).unwrap();
        h.remote.inner.insert_row(&row).await.unwrap();

        assert_eq!(h.sync.load_from_remote().await, LoadOutcome::Loaded { lists: 1 });
        assert_eq!(h.sync.lists(), vec![remote_list]);
        assert_eq!(cached_lists(&h.store), h.sync.lists());

        // What was just loaded counts as synced
        assert_eq!(h.sync.sync_now().await, UploadOutcome::Unchanged);
        assert_eq!(h.remote.replace_count(), 0);
    }

    #[tokio::test]
    async fn test_garbage_items_load_as_empty_list() {
        let h = signed_in();
        h.remote
            .inner
            .insert_row(&remote_row("l1", "Garbage", Value::String("not json".into())))
            .await
            .unwrap();

        h.sync.load_from_remote().await;
        let lists = h.sync.lists();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Garbage");
        assert!(lists[0].items.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_local_cache() {
        let h = signed_in();
        h.remote.fail_fetch.store(true, Ordering::SeqCst);

        // Someone else wrote the cache after we started
        let on_disk = vec![list_named("On disk")];
        LocalCache::new(h.store.clone()).save(&on_disk).unwrap();

        assert_eq!(h.sync.load_from_remote().await, LoadOutcome::Failed);
        assert_eq!(h.sync.lists(), on_disk);
        assert!(h.sync.last_error().unwrap().contains("connection refused"));
        assert!(h.sync.is_initialized());
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_last_synced() {
        let h = signed_in();
        let lists = h.sync.lists();
        h.remote.fail_upload.store(true, Ordering::SeqCst);

        assert_eq!(h.sync.upload(&lists).await, UploadOutcome::Failed);
        assert!(h.sync.last_error().unwrap().contains("permission denied"));
        assert!(!h.sync.is_uploading());

        h.remote.fail_upload.store(false, Ordering::SeqCst);
        assert_eq!(h.sync.upload(&lists).await, UploadOutcome::Uploaded { lists: 1 });

        h.sync.clear_error();
        assert!(h.sync.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_remote_partially_replaced() {
        let inner = SqliteRemoteStore::open_in_memory().unwrap();
        inner
            .insert_row(&remote_row("old", "Old", Value::Array(vec![])))
            .await
            .unwrap();
        let remote = Arc::new(FailingInsertRemote {
            inner: inner.clone(),
            inserts: AtomicUsize::new(0),
            fail_on: 2,
        });
        let auth = AuthHandle::new(AuthState::signed_in(USER));
        let sync = SyncOrchestrator::builder(LocalCache::new(Arc::new(MemoryLocalStore::new())))
            .remote(remote)
            .auth(auth.subscribe())
            .build();
        let lists = vec![list_named("First"), list_named("Second")];

        assert_eq!(sync.upload(&lists).await, UploadOutcome::Failed);

        let names: Vec<_> = inner
            .fetch_rows(USER)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.name)
            .collect();
        assert_eq!(names, vec!["First".to_string()]);
        assert!(sync.last_error().unwrap().contains("quota exceeded"));
        assert!(sync.lock_state().last_synced.is_none());
        assert!(!sync.is_uploading());

        // Guard released: the retry goes through
        assert_eq!(sync.upload(&lists).await, UploadOutcome::Uploaded { lists: 2 });
        assert_eq!(inner.row_count(USER).unwrap(), 2);
    }

    #[test]
    fn test_delete_last_list_is_rejected() {
        let h = signed_out();
        let before = h.sync.lists();

        let err = h
            .sync
            .apply(|lists| collection::delete_list(lists, &lists[0].id).map(|l| (l, ())))
            .unwrap_err();

        assert_eq!(err, CollectionError::LastList);
        assert_eq!(err.to_string(), "You must have at least one list.");
        assert_eq!(h.sync.lists(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_replacements() {
        let h = signed_in();

        h.sync.set_lists(vec![list_named("First")]);
        assert!(h.sync.status().upload_pending);
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.sync.set_lists(vec![list_named("Second")]);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.remote.replace_count(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.remote.replace_count(), 1);
        assert_eq!(h.remote.last_upload_names(), vec!["Second".to_string()]);
        assert!(!h.sync.status().upload_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_upload() {
        let h = signed_in();
        h.sync.set_lists(vec![list_named("Never sent")]);
        h.sync.shutdown();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.remote.replace_count(), 0);
        // Local write already happened
        assert_eq!(cached_lists(&h.store)[0].name, "Never sent");
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_in_flight_is_guarded() {
        let h = harness_with(
            RecordingRemote::new().with_upload_delay(Duration::from_secs(5)),
            AuthState::signed_in(USER),
            None,
        );

        let background = h.sync.clone();
        let first = tokio::spawn(async move { background.sync_now().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.sync.is_uploading());
        assert!(h.sync.status().uploading);

        h.sync.set_lists(vec![list_named("Changed")]);
        assert_eq!(h.sync.sync_now().await, UploadOutcome::InFlight);

        assert_eq!(first.await.unwrap(), UploadOutcome::Uploaded { lists: 1 });
        assert!(!h.sync.is_uploading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_rearms_while_upload_in_flight() {
        let h = harness_with(
            RecordingRemote::new().with_upload_delay(Duration::from_secs(5)),
            AuthState::signed_in(USER),
            None,
        );

        // Fires at 2s and runs until 7s
        h.sync.set_lists(vec![list_named("A")]);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.sync.is_uploading());

        // Fires at 5s while the first upload is still running
        h.sync.set_lists(vec![list_named("B")]);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(h.remote.replace_count(), 2);
        assert_eq!(h.remote.last_upload_names(), vec!["B".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_in_seeds_then_debounces() {
        let h = signed_out();
        h.sync.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.remote.fetches.load(Ordering::SeqCst), 0);

        h.auth.sign_in(USER);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.sync.is_initialized());
        assert_eq!(h.remote.replace_count(), 1);
        assert_eq!(h.remote.last_upload_names(), vec!["My Tasks".to_string()]);

        let list_id = h.sync.lists()[0].id.clone();
        h.sync
            .apply(|lists| collection::add_item(lists, &list_id))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.remote.replace_count(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.remote.replace_count(), 2);
        // The upload's own notifications do not clobber local state
        assert_eq!(h.sync.lists()[0].items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_seed_upload_is_kept() {
        let h = harness_with(
            RecordingRemote::new().with_upload_delay(Duration::from_secs(5)),
            AuthState::SignedOut,
            None,
        );
        h.sync.start();
        h.auth.sign_in(USER);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.sync.is_uploading());
        h.sync.set_lists(vec![list_named("Edited during seed")]);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let expected = vec!["Edited during seed".to_string()];
        let names = |lists: Vec<TodoList>| lists.into_iter().map(|l| l.name).collect::<Vec<_>>();
        assert_eq!(names(h.sync.lists()), expected);
        assert_eq!(names(cached_lists(&h.store)), expected);
        assert_eq!(h.remote.last_upload_names(), expected);
        assert_eq!(h.remote.replace_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_blocked_by_upload_in_flight_is_rescheduled() {
        let h = harness_with(
            RecordingRemote::new().with_upload_delay(Duration::from_secs(5)),
            AuthState::signed_in(USER),
            None,
        );

        let background = h.sync.clone();
        let other = tokio::spawn(async move { background.upload(&[list_named("Other")]).await });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let outcome = h.sync.load_from_remote().await;
        assert_eq!(
            outcome,
            LoadOutcome::Seeded {
                lists: 1,
                upload: UploadOutcome::InFlight
            }
        );
        assert!(h.sync.status().upload_pending);

        assert_eq!(other.await.unwrap(), UploadOutcome::Uploaded { lists: 1 });
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(h.remote.replace_count(), 2);
        assert_eq!(h.remote.last_upload_names(), vec!["My Tasks".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_load_runs_once_per_process() {
        let h = signed_out();
        h.sync.start();

        h.auth.sign_in(USER);
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.auth.sign_out();
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.auth.sign_in(USER);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(h.remote.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_cancels_pending_upload() {
        let h = signed_in();
        h.sync.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.remote.replace_count(), 1);

        h.sync.set_lists(vec![list_named("Unsent")]);
        h.auth.sign_out();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(h.remote.replace_count(), 1);
        assert!(!h.sync.status().signed_in);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_change_reloads_other_device() {
        let shared = SqliteRemoteStore::open_in_memory().unwrap();
        let phone = harness_with(
            RecordingRemote::sharing(shared.clone()),
            AuthState::signed_in(USER),
            None,
        );
        phone.sync.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let laptop = harness_with(
            RecordingRemote::sharing(shared),
            AuthState::signed_in(USER),
            Some(&[list_named("Laptop")][..]),
        );
        laptop.sync.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Laptop adopted the phone's seed
        assert_eq!(laptop.sync.lists(), phone.sync.lists());

        phone.sync.set_lists(vec![list_named("Shopping"), list_named("Chores")]);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let names: Vec<_> = laptop.sync.lists().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Shopping", "Chores"]);
        assert_eq!(laptop.remote.replace_count(), 0);
    }

    #[tokio::test]
    async fn test_open_with_config_uses_files() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().join("data"),
            remote_db: Some(temp_dir.path().join("remote").join("tasks.db")),
            ..Config::default()
        };
        let auth = AuthHandle::new(AuthState::signed_in(USER));

        let sync = SyncOrchestrator::open_with_config(&config, auth.subscribe()).unwrap();
        assert!(sync.status().remote_configured);
        assert!(matches!(
            sync.load_from_remote().await,
            LoadOutcome::Seeded { .. }
        ));

        let reopened = SyncOrchestrator::open_with_config(&config, auth.subscribe()).unwrap();
        assert_eq!(reopened.lists(), sync.lists());
        assert_eq!(
            reopened.load_from_remote().await,
            LoadOutcome::Loaded { lists: 1 }
        );
    }
}
