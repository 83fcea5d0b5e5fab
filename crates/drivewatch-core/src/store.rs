//! Durable cursor storage.
//!
//! The cursor is the only state that survives a restart. Implementations
//! must replace the stored value atomically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serde(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persisted monitor state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    /// Last acknowledged change cursor
    #[serde(rename = "pageToken", alias = "cursor", default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl CursorState {
    pub fn with_cursor(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
        }
    }
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the stored state; a store that was never written is empty.
    async fn load(&self) -> Result<CursorState>;

    /// Durably replace the stored state.
    async fn save(&self, state: &CursorState) -> Result<()>;
}

#[async_trait]
impl<T: CursorStore + ?Sized> CursorStore for std::sync::Arc<T> {
    async fn load(&self) -> Result<CursorState> {
        (**self).load().await
    }

    async fn save(&self, state: &CursorState) -> Result<()> {
        (**self).save(state).await
    }
}

/// In-memory store for testing.
#[derive(Default)]
pub struct InMemoryCursorStore {
    state: RwLock<CursorState>,
    history: RwLock<Vec<String>>,
    failing_writes: RwLock<usize>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `cursor`, as after a previous run.
    pub fn with_cursor(cursor: &str) -> Self {
        let store = Self::new();
        *store.state.write().unwrap() = CursorState::with_cursor(cursor);
        store
    }

    /// Make the next `count` saves fail.
    pub fn fail_next_writes(&self, count: usize) {
        *self.failing_writes.write().unwrap() = count;
    }

    pub fn cursor(&self) -> Option<String> {
        self.state.read().unwrap().cursor.clone()
    }

    /// Every cursor successfully saved, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.read().unwrap().clone()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn load(&self) -> Result<CursorState> {
        Ok(self.state.read().unwrap().clone())
    }

    async fn save(&self, state: &CursorState) -> Result<()> {
        {
            let mut failing = self.failing_writes.write().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::Io("simulated write failure".to_string()));
            }
        }

        if let Some(cursor) = &state.cursor {
            self.history.write().unwrap().push(cursor.clone());
        }
        *self.state.write().unwrap() = state.clone();
        Ok(())
    }
}
