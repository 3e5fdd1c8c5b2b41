use super::{StateStore, StoreError};
use crate::models::{State, StoredState};
use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};

/// Volatile backend holding a single document in process memory.
///
/// Reads always succeed. Writes replace the held value immediately.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    state: RwLock<State>,
}

impl InMemoryStateStore {
    /// Create a store seeded with the default document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `state`.
    pub fn with_state(state: State) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy of the currently held document.
    pub fn current(&self) -> State {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn read(&self) -> Result<StoredState, StoreError> {
        Ok(StoredState::from(self.current()))
    }

    async fn write(&self, state: &State) -> Result<(), StoreError> {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) =
            state.without_shadowed_extra().into_owned();
        Ok(())
    }
}
