//! Cursor persistence in a JSON state file.
//!
//! The file holds a single object, `{"pageToken": "<cursor>"}`. Writes go
//! to a sibling temporary file that is synced and then renamed over the
//! target, so a crash never leaves a half-written cursor behind.

use async_trait::async_trait;
use drivewatch_core::store::Result;
use drivewatch_core::{CursorState, CursorStore, StoreError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// JSON-file cursor store.
pub struct JsonFileStore {
    /// Path to the state file.
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(e: std::io::Error) -> StoreError {
    StoreError::Io(e.to_string())
}

#[async_trait]
impl CursorStore for JsonFileStore {
    /// Missing file means empty state. An unreadable or corrupt file is
    /// logged and also treated as empty.
    async fn load(&self) -> Result<CursorState> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("State file not found at {:?}, starting with empty state", self.path);
                return Ok(CursorState::default());
            }
            Err(e) => {
                error!("Failed to read state file {:?}: {}", self.path, e);
                return Ok(CursorState::default());
            }
        };

        match serde_json::from_str::<CursorState>(&contents) {
            Ok(state) => {
                debug!("State loaded: {:?}", state);
                Ok(state)
            }
            Err(e) => {
                error!("Failed to parse state file {:?}: {}", self.path, e);
                Ok(CursorState::default())
            }
        }
    }

    async fn save(&self, state: &CursorState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let contents = serde_json::to_string(state).map_err(|e| StoreError::Serde(e.to_string()))?;
        let temp = self.temp_path();

        let mut file = fs::File::create(&temp).await.map_err(io_error)?;
        file.write_all(contents.as_bytes()).await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;
        drop(file);

        fs::rename(&temp, &self.path).await.map_err(io_error)?;
        debug!("State saved: {:?}", state);
        Ok(())
    }
}
