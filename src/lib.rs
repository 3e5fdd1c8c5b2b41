// Monitor Profile - durable profile state for a game-state monitor/exporter
//
// This is the library crate containing the persistence core: the profile document,
// its storage backends and the manager that caches it.
// The binary crate (main.rs) loads the profile and prints it.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod profile;
pub mod store;

// Re-export commonly used types for convenience
pub use crate::config::AppConfig;
pub use models::{LoginState, RankState, State, StoredState};
pub use profile::{LoadOutcome, ProfileChange, ProfileError, ProfileManager, RecoveryReason};
pub use store::{DocumentFormat, FileStateStore, InMemoryStateStore, StateStore, StoreError};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
