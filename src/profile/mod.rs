// Profile management module
//
// This module provides the ProfileManager which owns the cached profile snapshot,
// routes every read and write through a StateStore, and emits change events.

use crate::metrics::ProfileMetrics;
use crate::models::State;
use crate::store::{StateStore, StoreError};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors surfaced by [`ProfileManager`].
#[derive(Error, Debug)]
pub enum ProfileError {
    /// The snapshot was requested before [`ProfileManager::load`] ran.
    #[error("Profile is not initialized; load() must run first")]
    NotInitialized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a load fell back to the default document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryReason {
    /// No document existed yet.
    Missing,
    /// A document existed but could not be decoded.
    Corrupt,
    /// The store failed for another reason (permissions, I/O).
    Unreadable,
}

impl From<&StoreError> for RecoveryReason {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::Missing,
            StoreError::Parse { .. } => Self::Corrupt,
            StoreError::Serialize(_) | StoreError::Io { .. } => Self::Unreadable,
        }
    }
}

/// Result of [`ProfileManager::load`]. Loading never fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A stored document was read and merged with defaults.
    Loaded,

    /// The default document was used instead.
    Recovered {
        reason: RecoveryReason,
        /// Whether the default document was written back to the store.
        healed: bool,
    },
}

/// Change events emitted by [`ProfileManager`]
#[derive(Clone, Debug, PartialEq)]
pub enum ProfileChange {
    /// A stored document was loaded into the cache
    Loaded,

    /// The cache was seeded with defaults after a failed read
    Recovered { reason: RecoveryReason },

    /// A new document reached the store
    Persisted,

    /// The cache advanced but the store rejected the write
    PersistFailed { message: String },
}

/// Owner of the cached profile snapshot.
///
/// Starts uninitialized; [`load()`](Self::load) always leaves it initialized,
/// falling back to the default document when the store has nothing usable.
///
/// # Usage
///
/// - [`load()`](Self::load) once at startup
/// - [`snapshot()`](Self::snapshot) for a cheap shared, immutable view
/// - [`persist()`](Self::persist) or [`update()`](Self::update) for whole-document replacement
/// - [`subscribe()`](Self::subscribe) for change notifications
///
/// Callers must not run `persist` concurrently with `load`, or two `persist`
/// calls at once; the last store write to finish decides what is on disk.
pub struct ProfileManager {
    store: Arc<dyn StateStore>,

    /// `None` until the first load or persist
    cache: Arc<RwLock<Option<Arc<State>>>>,

    change_tx: broadcast::Sender<ProfileChange>,

    metrics: Arc<ProfileMetrics>,
}

impl ProfileManager {
    /// Create an uninitialized manager over `store`.
    pub fn new<S: StateStore + 'static>(store: S) -> Self {
        Self::with_store(Arc::new(store))
    }

    /// Create an uninitialized manager over a store chosen at runtime.
    pub fn with_store(store: Arc<dyn StateStore>) -> Self {
        let (change_tx, _) = broadcast::channel(32);
        Self {
            store,
            cache: Arc::new(RwLock::new(None)),
            change_tx,
            metrics: Arc::new(ProfileMetrics::new()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Shared view of the cached document.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotInitialized`] before the first load.
    pub fn snapshot(&self) -> Result<Arc<State>, ProfileError> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ProfileError::NotInitialized)
    }

    /// Execute a function with read access to the cached document
    ///
    /// # Example
    /// ```ignore
    /// let interval = profile.read(|state| state.monitor_interval)?;
    /// ```
    pub fn read<F, R>(&self, f: F) -> Result<R, ProfileError>
    where
        F: FnOnce(&State) -> R,
    {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.as_deref().map(f).ok_or(ProfileError::NotInitialized)
    }

    /// Load the stored document into the cache.
    ///
    /// On success the cache holds the defaults overlaid with the stored
    /// fields. On any store failure a warning is logged and the default
    /// document is persisted, healing the store. Corrupt documents are
    /// offered to [`StateStore::preserve_corrupt`] first.
    pub async fn load(&self) -> LoadOutcome {
        self.metrics.record_load();

        let err = match self.store.read().await {
            Ok(stored) => {
                self.replace_cache(State::default().merged_with(stored));
                tracing::info!("Loaded profile");
                self.emit(ProfileChange::Loaded);
                return LoadOutcome::Loaded;
            }
            Err(err) => err,
        };

        let reason = RecoveryReason::from(&err);
        self.metrics.record_recovery();
        tracing::warn!(
            "Failed to read profile, creating a new one with defaults. ({})",
            err
        );

        if reason == RecoveryReason::Corrupt {
            match self.store.preserve_corrupt().await {
                Ok(Some(backup)) => tracing::info!("Kept unreadable profile at {}", backup),
                Ok(None) => {}
                Err(e) => tracing::warn!("Could not back up unreadable profile: {}", e),
            }
        }

        let healed = match self.persist(State::default()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to write default profile, continuing in memory: {}", e);
                false
            }
        };

        self.emit(ProfileChange::Recovered { reason });
        LoadOutcome::Recovered { reason, healed }
    }

    /// Replace the cached document with `state`, then write it to the store.
    ///
    /// # Errors
    ///
    /// The store's error is returned unchanged. The cache has already
    /// advanced at that point, so cache and store disagree until a later
    /// persist succeeds.
    pub async fn persist(&self, state: State) -> Result<(), ProfileError> {
        let snapshot = self.replace_cache(state);
        let started = Instant::now();

        match self.store.write(&snapshot).await {
            Ok(()) => {
                self.metrics.record_persist(started.elapsed());
                tracing::debug!("Persisted profile");
                self.emit(ProfileChange::Persisted);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_persist_failure();
                self.emit(ProfileChange::PersistFailed {
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Apply `update_fn` to a copy of the snapshot and persist the result.
    ///
    /// # Example
    /// ```ignore
    /// profile.update(|state| state.monitor_interval = 1000).await?;
    /// ```
    pub async fn update<F>(&self, update_fn: F) -> Result<Arc<State>, ProfileError>
    where
        F: FnOnce(&mut State),
    {
        let mut next = State::clone(&*self.snapshot()?);
        update_fn(&mut next);
        self.persist(next).await?;
        self.snapshot()
    }

    /// Subscribe to profile change events
    pub fn subscribe(&self) -> broadcast::Receiver<ProfileChange> {
        self.change_tx.subscribe()
    }

    pub fn metrics(&self) -> &ProfileMetrics {
        &self.metrics
    }

    fn replace_cache(&self, state: State) -> Arc<State> {
        let snapshot = Arc::new(state);
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        snapshot
    }

    fn emit(&self, change: ProfileChange) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.change_tx.send(change);
    }
}

// Make ProfileManager cloneable for sharing across tasks
impl Clone for ProfileManager {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            change_tx: self.change_tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}
