//! Debounced local persistence for the session store.
//!
//! Every session mutation schedules a snapshot write; a debounce window
//! coalesces bursts into a single write so dispatch is never blocked by
//! storage I/O. Storage keys are namespaced per room (and per local user
//! where known) so concurrent sessions on one device do not collide.
//!
//! Two fields — `theme` and `hint` — are *protect-once*: the first non-empty
//! value received for each is cached under a separate key and always
//! preferred over a later blank, because downstream phases must still
//! display the round's theme/hint after the server stops re-sending them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use web_time::SystemTime;

use crate::error::{DecoyDenError, Result};
use crate::protocol::{RoomId, UserId};
use crate::session::Session;

const SESSION_PREFIX: &str = "decoy-den.session.";
const PROTECTED_PREFIX: &str = "decoy-den.protected.";

/// Storage key for a room's session snapshot, scoped per user where known.
pub fn session_key(room_id: RoomId, user_id: Option<UserId>) -> String {
    match user_id {
        Some(user) => format!("{SESSION_PREFIX}{room_id}.{user}"),
        None => format!("{SESSION_PREFIX}{room_id}"),
    }
}

/// Storage key for a room's protect-once field cache.
pub fn protected_key(room_id: RoomId) -> String {
    format!("{PROTECTED_PREFIX}{room_id}")
}

/// One persisted snapshot: the full session plus a write timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: Session,
    pub saved_at: SystemTime,
}

/// Protect-once cache for server-issued round framing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtectedFields {
    pub theme: Option<String>,
    pub hint: Option<String>,
}

impl ProtectedFields {
    /// Cache the first non-empty value seen for each field. Later values
    /// never overwrite an existing cache entry (one-way rule).
    pub fn absorb(&mut self, session: &Session) -> bool {
        let mut changed = false;
        if self.theme.is_none() {
            if let Some(theme) = session.theme.as_ref().filter(|t| !t.trim().is_empty()) {
                self.theme = Some(theme.clone());
                changed = true;
            }
        }
        if self.hint.is_none() {
            if let Some(hint) = session.hint.as_ref().filter(|h| !h.trim().is_empty()) {
                self.hint = Some(hint.clone());
                changed = true;
            }
        }
        changed
    }

    /// Fill blank session fields from the cache.
    pub fn apply_to(&self, session: &mut Session) {
        if session.theme.as_deref().is_none_or(|t| t.trim().is_empty()) {
            session.theme.clone_from(&self.theme);
        }
        if session.hint.as_deref().is_none_or(|h| h.trim().is_empty()) {
            session.hint.clone_from(&self.hint);
        }
    }
}

// ── Store trait ─────────────────────────────────────────────────────

/// A durable key/value store for session snapshots.
///
/// Implementations must be cheap to call from `spawn_blocking`; the client
/// never invokes them on the dispatch path.
pub trait SnapshotStore: Send + Sync + 'static {
    /// Write (or overwrite) a value.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Read a value, `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Enumerate all stored keys.
    fn keys(&self) -> Result<Vec<String>>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| DecoyDenError::Storage(format!("memory store poisoned: {e}")))
    }
}

impl SnapshotStore for MemoryStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`DecoyDenError::Io`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are dot-separated namespace segments and UUIDs; they are
        // already safe file names.
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStore for FileStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            if let Some(key) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                keys.push(key.to_owned());
            }
        }
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Adapter ─────────────────────────────────────────────────────────

/// Snapshot/restore/reset logic over a [`SnapshotStore`].
pub struct PersistenceAdapter {
    store: std::sync::Arc<dyn SnapshotStore>,
    protected: Mutex<ProtectedFields>,
}

impl PersistenceAdapter {
    pub fn new(store: std::sync::Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            protected: Mutex::new(ProtectedFields::default()),
        }
    }

    fn protected_lock(&self) -> Result<std::sync::MutexGuard<'_, ProtectedFields>> {
        self.protected
            .lock()
            .map_err(|e| DecoyDenError::Storage(format!("protected cache poisoned: {e}")))
    }

    /// Write one snapshot of `session`, updating the protect-once cache
    /// first. Sessions without a room are not persisted (nothing to key by).
    pub fn snapshot(&self, session: &Session) -> Result<()> {
        let Some(room_id) = session.room_id else {
            return Ok(());
        };

        {
            let mut protected = self.protected_lock()?;
            if protected.absorb(session) {
                let cache = serde_json::to_string(&*protected)?;
                self.store.put(&protected_key(room_id), &cache)?;
            }
        }

        let record = SessionRecord {
            session: session.clone(),
            saved_at: SystemTime::now(),
        };
        self.store
            .put(&session_key(room_id, session.local_user_id), &serde_json::to_string(&record)?)?;
        tracing::debug!(%room_id, "session snapshot written");
        Ok(())
    }

    /// Restore the most recent snapshot for `room_id` (or, absent a room,
    /// the most recently written snapshot of any room), applying the
    /// protect-once cache. Returns `None` when nothing usable is stored —
    /// storage failures are logged, never fatal.
    pub fn restore(&self, room_id: Option<RoomId>, user_id: Option<UserId>) -> Option<Session> {
        let record = match self.load_record(room_id, user_id) {
            Ok(record) => record?,
            Err(e) => {
                tracing::warn!("snapshot restore failed: {e}");
                return None;
            }
        };

        let mut session = record.session;
        if let Some(room) = session.room_id {
            match self.load_protected(room) {
                Ok(Some(cache)) => {
                    cache.apply_to(&mut session);
                    if let Ok(mut protected) = self.protected_lock() {
                        *protected = cache;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("protected cache restore failed: {e}"),
            }
        }
        tracing::debug!(room = ?session.room_id, "session restored from snapshot");
        Some(session)
    }

    /// Delete every key scoped to `room_id`, including the protect-once
    /// cache, and clear the in-memory cache. This is the only path that
    /// returns the session to its empty initial state.
    pub fn reset(&self, room_id: RoomId) -> Result<()> {
        let room_session_prefix = format!("{SESSION_PREFIX}{room_id}");
        for key in self.store.keys()? {
            if key.starts_with(&room_session_prefix) || key == protected_key(room_id) {
                self.store.delete(&key)?;
            }
        }
        *self.protected_lock()? = ProtectedFields::default();
        tracing::info!(%room_id, "room-scoped storage cleared");
        Ok(())
    }

    fn load_record(
        &self,
        room_id: Option<RoomId>,
        user_id: Option<UserId>,
    ) -> Result<Option<SessionRecord>> {
        if let Some(room) = room_id {
            // Exact per-user key first, then any snapshot for the room.
            if let Some(raw) = self.store.get(&session_key(room, user_id))? {
                return Ok(Some(serde_json::from_str(&raw)?));
            }
            let room_prefix = format!("{SESSION_PREFIX}{room}");
            return self.newest_matching(|key| key.starts_with(&room_prefix));
        }
        self.newest_matching(|key| key.starts_with(SESSION_PREFIX))
    }

    fn newest_matching(
        &self,
        matches: impl Fn(&str) -> bool,
    ) -> Result<Option<SessionRecord>> {
        let mut newest: Option<SessionRecord> = None;
        for key in self.store.keys()? {
            if !matches(&key) {
                continue;
            }
            let Some(raw) = self.store.get(&key)? else {
                continue;
            };
            let record: SessionRecord = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(%key, "discarding unreadable snapshot: {e}");
                    continue;
                }
            };
            if newest
                .as_ref()
                .is_none_or(|current| record.saved_at > current.saved_at)
            {
                newest = Some(record);
            }
        }
        Ok(newest)
    }

    fn load_protected(&self, room_id: RoomId) -> Result<Option<ProtectedFields>> {
        match self.store.get(&protected_key(room_id))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter")
            .field("protected", &self.protected)
            .finish_non_exhaustive()
    }
}

// ── Debounced writer task ───────────────────────────────────────────

/// Commands for the debounced writer.
#[cfg(feature = "tokio-runtime")]
pub(crate) enum PersistCmd {
    /// Schedule a snapshot write (coalesced per debounce window).
    Snapshot(Session),
    /// Clear room-scoped storage. Processed in queue order, so it also
    /// discards any snapshot still pending in the debounce window — a write
    /// scheduled before a reset must never resurrect the cleared keys.
    Reset(RoomId),
}

/// Spawn the debounced writer. Snapshots sent on the returned channel are
/// coalesced per debounce window; the latest snapshot wins. Writes run on
/// the blocking pool and never block dispatch. Dropping the sender flushes
/// the final pending snapshot and ends the task.
#[cfg(feature = "tokio-runtime")]
pub(crate) fn spawn_writer(
    adapter: std::sync::Arc<PersistenceAdapter>,
    debounce: std::time::Duration,
) -> (
    tokio::sync::mpsc::UnboundedSender<PersistCmd>,
    tokio::task::JoinHandle<()>,
) {
    async fn run_reset(adapter: &std::sync::Arc<PersistenceAdapter>, room_id: RoomId) {
        let writer = std::sync::Arc::clone(adapter);
        match tokio::task::spawn_blocking(move || writer.reset(room_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("storage reset failed: {e}"),
            Err(e) => tracing::warn!("storage reset task failed: {e}"),
        }
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<PersistCmd>();
    let task = tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            let mut latest = match cmd {
                PersistCmd::Snapshot(session) => session,
                PersistCmd::Reset(room_id) => {
                    run_reset(&adapter, room_id).await;
                    continue;
                }
            };

            let mut flush_and_exit = false;
            let mut discarded = false;
            loop {
                match tokio::time::timeout(debounce, rx.recv()).await {
                    Ok(Some(PersistCmd::Snapshot(newer))) => latest = newer,
                    Ok(Some(PersistCmd::Reset(room_id))) => {
                        // The pending snapshot predates the reset; drop it.
                        run_reset(&adapter, room_id).await;
                        discarded = true;
                        break;
                    }
                    Ok(None) => {
                        flush_and_exit = true;
                        break;
                    }
                    Err(_elapsed) => break,
                }
            }

            if !discarded {
                let writer = std::sync::Arc::clone(&adapter);
                let result =
                    tokio::task::spawn_blocking(move || writer.snapshot(&latest)).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!("snapshot write failed: {e}"),
                    Err(e) => tracing::warn!("snapshot writer task failed: {e}"),
                }
            }

            if flush_and_exit {
                break;
            }
        }
        tracing::debug!("snapshot writer exited");
    });
    (tx, task)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::session::LocalIdentity;
    use std::sync::Arc;
    use uuid::Uuid;

    fn sample_session() -> Session {
        let identity = LocalIdentity::host(
            Uuid::from_u128(5),
            "AAAAAA",
            Uuid::from_u128(1),
            "Hana",
        );
        let mut session = Session::seeded(&identity);
        session.theme = Some("人物".into());
        session.hint = Some("出身地、性別、やったこと".into());
        session
    }

    #[test]
    fn round_trip_restores_all_fields() {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::new()));
        let session = sample_session();
        adapter.snapshot(&session).unwrap();

        let restored = adapter
            .restore(session.room_id, session.local_user_id)
            .unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn restore_without_room_picks_most_recent_snapshot() {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::new()));

        let older = sample_session();
        adapter.snapshot(&older).unwrap();

        let mut newer = sample_session();
        newer.room_id = Some(Uuid::from_u128(6));
        newer.topic = Some("Movies".into());
        // SystemTime resolution is fine-grained enough that sequential
        // writes order correctly.
        adapter.snapshot(&newer).unwrap();

        let restored = adapter.restore(None, None).unwrap();
        assert_eq!(restored.room_id, Some(Uuid::from_u128(6)));
        assert_eq!(restored.topic.as_deref(), Some("Movies"));
    }

    #[test]
    fn protect_once_survives_blanked_snapshot() {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::new()));
        let mut session = sample_session();
        adapter.snapshot(&session).unwrap();

        // A later snapshot where the server stopped re-sending theme/hint.
        session.theme = None;
        session.hint = Some(String::new());
        adapter.snapshot(&session).unwrap();

        let restored = adapter
            .restore(session.room_id, session.local_user_id)
            .unwrap();
        assert_eq!(restored.theme.as_deref(), Some("人物"));
        assert_eq!(
            restored.hint.as_deref(),
            Some("出身地、性別、やったこと")
        );
    }

    #[test]
    fn protected_cache_is_one_way() {
        let mut cache = ProtectedFields::default();
        let mut session = sample_session();
        assert!(cache.absorb(&session));

        // A different non-empty value later must not displace the cache.
        session.theme = Some("場所".into());
        assert!(!cache.absorb(&session));
        assert_eq!(cache.theme.as_deref(), Some("人物"));
    }

    #[test]
    fn reset_clears_room_scoped_keys() {
        let store = Arc::new(MemoryStore::new());
        let adapter = PersistenceAdapter::new(Arc::clone(&store) as Arc<dyn SnapshotStore>);
        let session = sample_session();
        let room = session.room_id.unwrap();
        adapter.snapshot(&session).unwrap();

        // A snapshot for an unrelated room must survive the reset.
        let mut other = sample_session();
        other.room_id = Some(Uuid::from_u128(77));
        adapter.snapshot(&other).unwrap();

        adapter.reset(room).unwrap();

        assert!(adapter.restore(Some(room), session.local_user_id).is_none());
        assert!(adapter
            .restore(Some(Uuid::from_u128(77)), other.local_user_id)
            .is_some());
    }

    #[test]
    fn sessions_without_a_room_are_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let adapter = PersistenceAdapter::new(Arc::clone(&store) as Arc<dyn SnapshotStore>);
        adapter.snapshot(&Session::default()).unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put("decoy-den.session.test", "{\"x\":1}").unwrap();
        assert_eq!(
            store.get("decoy-den.session.test").unwrap().as_deref(),
            Some("{\"x\":1}")
        );
        assert_eq!(store.keys().unwrap(), vec!["decoy-den.session.test"]);
        store.delete("decoy-den.session.test").unwrap();
        assert!(store.get("decoy-den.session.test").unwrap().is_none());
        // Deleting again is not an error.
        store.delete("decoy-den.session.test").unwrap();
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn writer_coalesces_bursts() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(PersistenceAdapter::new(
            Arc::clone(&store) as Arc<dyn SnapshotStore>
        ));
        let (tx, task) = spawn_writer(Arc::clone(&adapter), std::time::Duration::from_millis(50));

        let mut session = sample_session();
        for i in 0..10u8 {
            session.topic = Some(format!("draft {i}"));
            tx.send(PersistCmd::Snapshot(session.clone())).unwrap();
        }
        drop(tx);
        task.await.unwrap();

        let restored = adapter
            .restore(session.room_id, session.local_user_id)
            .unwrap();
        // Only the last draft of the burst should have been written.
        assert_eq!(restored.topic.as_deref(), Some("draft 9"));
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn queued_reset_discards_pending_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(PersistenceAdapter::new(
            Arc::clone(&store) as Arc<dyn SnapshotStore>
        ));
        let (tx, task) = spawn_writer(Arc::clone(&adapter), std::time::Duration::from_millis(100));

        let session = sample_session();
        let room = session.room_id.unwrap();
        tx.send(PersistCmd::Snapshot(session.clone())).unwrap();
        // The reset lands inside the debounce window: the pending snapshot
        // must be dropped, not written after the keys are cleared.
        tx.send(PersistCmd::Reset(room)).unwrap();
        drop(tx);
        task.await.unwrap();

        assert!(store.keys().unwrap().is_empty());
        assert!(adapter.restore(Some(room), session.local_user_id).is_none());
    }
}
