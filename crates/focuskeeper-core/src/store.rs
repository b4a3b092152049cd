//! Durable timer store.
//!
//! Owns the single [`TimerState`] record. Mutations land in memory first,
//! are then written through to a [`StateBackend`], and finally dispatched to
//! subscribers. A failed write never rolls back the in-memory transition:
//! the store marks itself dirty and retries on the next mutation or
//! [`TimerStore::flush`].

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::StorageError;
use crate::observer::{Listeners, Subscription};
use crate::storage::Database;
use crate::timer::TimerState;

/// kv key holding the serialized record.
pub const TIMER_STATE_KEY: &str = "timer_state";

pub trait StateBackend: Send {
    fn read(&self) -> Result<Option<TimerState>, StorageError>;
    fn write(&mut self, state: &TimerState) -> Result<(), StorageError>;
    fn erase(&mut self) -> Result<(), StorageError>;
}

/// Keeps the record as one JSON document in the database's kv table.
pub struct SqliteBackend {
    db: Database,
}

impl SqliteBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// # Errors
    /// Returns an error if the default database cannot be opened.
    pub fn open_default() -> Result<Self, StorageError> {
        Ok(Self::new(Database::open()?))
    }
}

impl StateBackend for SqliteBackend {
    fn read(&self) -> Result<Option<TimerState>, StorageError> {
        match self.db.kv_get(TIMER_STATE_KEY)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StorageError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    fn write(&mut self, state: &TimerState) -> Result<(), StorageError> {
        let json =
            serde_json::to_string(state).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        self.db.kv_set(TIMER_STATE_KEY, &json)?;
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.db.kv_delete(TIMER_STATE_KEY)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    document: Option<String>,
    fail_writes: bool,
    writes: usize,
}

/// In-memory backend. Clones share the same document, so dropping a store
/// and opening a new one over a clone behaves like a process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_writes = fail;
        }
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().map(|i| i.writes).unwrap_or(0)
    }

    /// Raw stored document, if any.
    pub fn document(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|i| i.document.clone())
    }

    fn with_inner<R>(
        &self,
        f: impl FnOnce(&mut MemoryInner) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StorageError::WriteRejected("memory backend poisoned".into()))?;
        f(&mut inner)
    }
}

impl StateBackend for MemoryBackend {
    fn read(&self) -> Result<Option<TimerState>, StorageError> {
        self.with_inner(|inner| match &inner.document {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| StorageError::Corrupt(e.to_string())),
            None => Ok(None),
        })
    }

    fn write(&mut self, state: &TimerState) -> Result<(), StorageError> {
        let json =
            serde_json::to_string(state).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        self.with_inner(|inner| {
            if inner.fail_writes {
                return Err(StorageError::WriteRejected("simulated write failure".into()));
            }
            inner.document = Some(json);
            inner.writes += 1;
            Ok(())
        })
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.with_inner(|inner| {
            if inner.fail_writes {
                return Err(StorageError::WriteRejected("simulated write failure".into()));
            }
            inner.document = None;
            inner.writes += 1;
            Ok(())
        })
    }
}

pub struct TimerStore {
    backend: Box<dyn StateBackend>,
    current: Option<TimerState>,
    dirty: bool,
    listeners: Listeners<Option<TimerState>>,
}

impl TimerStore {
    /// Wrap a backend. Nothing is read until [`TimerStore::load`].
    pub fn new(backend: impl StateBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            current: None,
            dirty: false,
            listeners: Listeners::new(),
        }
    }

    /// Read the durable record into memory.
    ///
    /// A backend failure or a corrupt document leaves the in-memory copy as
    /// it was and is logged.
    pub fn load(&mut self) -> Option<TimerState> {
        match self.backend.read() {
            Ok(state) => {
                debug!(present = state.is_some(), "timer record loaded");
                self.current = state;
                self.dirty = false;
            }
            Err(e) => warn!("failed to load timer record: {e}"),
        }
        self.current.clone()
    }

    pub fn get(&self) -> Option<&TimerState> {
        self.current.as_ref()
    }

    /// Replace the record.
    pub fn save(&mut self, state: TimerState) {
        self.current = Some(state);
        self.persist();
        self.dispatch();
    }

    /// Mutate the record in place. Returns `None` when there is no record.
    pub fn update<R>(&mut self, patch: impl FnOnce(&mut TimerState) -> R) -> Option<R> {
        let state = self.current.as_mut()?;
        let result = patch(state);
        self.persist();
        self.dispatch();
        Some(result)
    }

    /// Destroy the record.
    pub fn clear(&mut self) {
        self.current = None;
        self.persist();
        self.dispatch();
    }

    /// Register a passive reader. Called with the new record after every
    /// mutation (`None` once cleared).
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&Option<TimerState>) + Send + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// True while the durable copy lags the in-memory one.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Retry a failed write. Returns whether durable storage is now current.
    pub fn flush(&mut self) -> bool {
        if self.dirty {
            self.persist();
        }
        !self.dirty
    }

    fn persist(&mut self) {
        let result = match &self.current {
            Some(state) => self.backend.write(state),
            None => self.backend.erase(),
        };
        match result {
            Ok(()) => {
                if self.dirty {
                    debug!("timer record flushed after earlier failure");
                }
                self.dirty = false;
            }
            Err(e) => {
                warn!("timer record not persisted, will retry: {e}");
                self.dirty = true;
            }
        }
    }

    fn dispatch(&self) {
        self.listeners.notify(&self.current);
    }
}

impl std::fmt::Debug for TimerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerStore")
            .field("current", &self.current)
            .field("dirty", &self.dirty)
            .field("listeners", &self.listeners)
            .finish()
    }
}
