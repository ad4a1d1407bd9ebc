//! Client-side persistence for an in-progress plaque build.
//!
//! The store merges partial edits into a single [`BuildSession`], coalesces
//! physical writes behind a 500 ms debounce window, and treats anything it
//! cannot read back (missing, corrupt, wrong schema version, or older than
//! seven days) as "no session". Storage and time are injected so expiry and
//! debounce behavior are deterministic under test.

pub mod recovery;

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rosterframe_core::clock::Clock;
use rosterframe_core::{BuildSession, SESSION_SCHEMA_VERSION, SessionPatch};

/// Fixed key the session blob is stored under.
pub const STORAGE_KEY: &str = "rosterframe_build_session";

/// Rapid successive saves within this window coalesce into one write.
pub const DEBOUNCE_MS: i64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Notification delivered to subscribers on logical updates and clears.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Saved(BuildSession),
    Cleared,
}

/// Raw key-value persistence underneath the store.
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory backend for tests and embedded use. Tracks physical write count
/// so debounce coalescing is observable.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<AtomicU64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Directory-backed storage: each key becomes `<dir>/<key>.json`.
#[derive(Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

struct Inner {
    loaded: bool,
    current: Option<BuildSession>,
    flush_deadline: Option<DateTime<Utc>>,
}

type Subscriber = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Debounced, expiring store for the single in-progress [`BuildSession`].
pub struct SessionStore<S: StorageBackend, C: Clock> {
    backend: S,
    clock: C,
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl<S: StorageBackend, C: Clock> SessionStore<S, C> {
    pub fn new(backend: S, clock: C) -> Self {
        Self {
            backend,
            clock,
            inner: Mutex::new(Inner {
                loaded: false,
                current: None,
                flush_deadline: None,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer for save/clear notifications.
    pub fn subscribe(&self, f: impl Fn(&SessionEvent) + Send + Sync + 'static) {
        self.subscribers.lock().unwrap().push(Box::new(f));
    }

    fn notify(&self, event: &SessionEvent) {
        for subscriber in self.subscribers.lock().unwrap().iter() {
            subscriber(event);
        }
    }

    /// Read the stored blob if the in-memory copy is cold. Anything
    /// unreadable degrades to `None`; an expired blob is removed.
    fn hydrate(&self, inner: &mut Inner, now: DateTime<Utc>) {
        if !inner.loaded {
            inner.loaded = true;
            inner.current = match self.backend.read(STORAGE_KEY) {
                Ok(Some(raw)) => decode_session(&raw),
                Ok(None) | Err(_) => None,
            };
        }
        if let Some(session) = &inner.current {
            if session.is_expired(now) {
                let _ = self.backend.remove(STORAGE_KEY);
                inner.current = None;
                inner.flush_deadline = None;
            }
        }
    }

    /// Merge a patch into the session (creating one on first save), stamp
    /// `last_updated`, and arm the debounce deadline. Returns the merged
    /// snapshot. The physical write happens at flush time.
    pub fn save(&self, patch: SessionPatch) -> BuildSession {
        let now = self.clock.now();
        let snapshot = {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;
            self.hydrate(inner, now);
            let session = inner
                .current
                .get_or_insert_with(|| BuildSession::new(uuid::Uuid::new_v4().to_string(), now));
            session.apply(patch, now);
            inner.flush_deadline = Some(now + Duration::milliseconds(DEBOUNCE_MS));
            session.clone()
        };
        self.notify(&SessionEvent::Saved(snapshot.clone()));
        snapshot
    }

    /// Current session, or `None` if absent or expired. Expiry clears the
    /// stored blob as a side effect.
    pub fn get(&self) -> Option<BuildSession> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();
        self.hydrate(&mut inner, now);
        inner.current.clone()
    }

    /// Whether a resumable session exists: non-expired and not on the
    /// terminal step.
    pub fn has_session(&self) -> bool {
        let now = self.clock.now();
        self.get().is_some_and(|s| s.is_resumable(now))
    }

    /// Drop the session, best-effort remove the stored blob, and notify.
    pub fn clear(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.current = None;
            inner.flush_deadline = None;
            inner.loaded = true;
            let _ = self.backend.remove(STORAGE_KEY);
        }
        self.notify(&SessionEvent::Cleared);
    }

    /// Perform the pending write if the debounce deadline has passed.
    pub fn flush_if_due(&self) -> Result<(), StoreError> {
        let now = self.clock.now();
        let due = {
            let inner = self.inner.lock().unwrap();
            matches!(inner.flush_deadline, Some(deadline) if now >= deadline)
        };
        if due { self.flush() } else { Ok(()) }
    }

    /// Force the pending write regardless of the debounce deadline.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.flush_deadline.take().is_none() {
            return Ok(());
        }
        if let Some(session) = &inner.current {
            let raw = serde_json::to_string(session).expect("session serializes");
            self.backend.write(STORAGE_KEY, &raw)?;
        }
        Ok(())
    }
}

fn decode_session(raw: &str) -> Option<BuildSession> {
    let session: BuildSession = serde_json::from_str(raw).ok()?;
    if session.version != SESSION_SCHEMA_VERSION {
        return None;
    }
    Some(session)
}
