//! Data models for the profile document.
//!
//! - [`State`]: the complete profile with every default applied
//! - [`StoredState`]: a document as decoded from storage, before defaults are merged in
//! - [`LoginState`] / [`RankState`]: nested records carried by the profile
//!
//! # Architecture Note
//!
//! `State` values are never mutated in place once handed out by
//! [`ProfileManager`](crate::profile::ProfileManager). Callers clone, edit the
//! clone, and persist it as a whole-document replacement.

pub mod state;

pub use state::{
    DEFAULT_CACHE_DIR, DEFAULT_F_GEN, DEFAULT_FILE_EXPORT_PATH, DEFAULT_MONITOR_INTERVAL, FIELD_NAMES,
    LoginState, RankState, State, StoredState,
};
