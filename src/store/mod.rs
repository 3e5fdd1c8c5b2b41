//! Storage backends for the profile document.
//!
//! A [`StateStore`] knows how to read and durably write one document. It keeps
//! no cache of its own; caching and default-merging belong to
//! [`ProfileManager`](crate::profile::ProfileManager).
//!
//! # Backends
//!
//! - [`InMemoryStateStore`]: volatile, never fails. For tests and ephemeral runs.
//! - [`FileStateStore`]: one file on disk, written with a swap-then-rename protocol
//!   so a crash mid-write never leaves a truncated document behind.

pub mod file;
pub mod memory;

use crate::models::{State, StoredState};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use thiserror::Error;

pub use file::{DocumentFormat, FileStateStore};
pub use memory::InMemoryStateStore;

/// Errors raised by a [`StateStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No profile document at {0}")]
    NotFound(Utf8PathBuf),

    #[error("Malformed profile document at {path}: {message}")]
    Parse { path: Utf8PathBuf, message: String },

    #[error("Failed to encode profile document: {0}")]
    Serialize(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when no document exists yet (the normal first-run condition).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when a document exists but could not be decoded.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

/// Capability contract shared by every storage backend.
///
/// `read` fails with [`StoreError::NotFound`] or [`StoreError::Parse`] when no
/// valid document exists. `write` must be crash-atomic: a later `read` sees
/// either the previous document or the new one, never a partial one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the stored document without applying defaults.
    async fn read(&self) -> Result<StoredState, StoreError>;

    /// Replace the stored document with `state`.
    async fn write(&self, state: &State) -> Result<(), StoreError>;

    /// Keep a copy of an unreadable document before it is overwritten.
    ///
    /// Returns the backup location when one was made. Backends that cannot
    /// hold corrupt data keep the default, which does nothing.
    async fn preserve_corrupt(&self) -> Result<Option<Utf8PathBuf>, StoreError> {
        Ok(None)
    }
}
