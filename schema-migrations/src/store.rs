//! Durable storage for the schema state and applied migration versions.

use crate::error::{MigrationError, Result};
use async_trait::async_trait;
use auth_rules::SchemaState;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Load the persisted state; a store that was never written yields the empty state
    async fn load(&self) -> Result<SchemaState>;

    /// Persist the state, replacing what was stored
    async fn save(&self, state: &SchemaState) -> Result<()>;
}

/// Volatile store for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryMigrationStore {
    state: Mutex<SchemaState>,
}

impl InMemoryMigrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SchemaState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl MigrationStore for InMemoryMigrationStore {
    async fn load(&self) -> Result<SchemaState> {
        Ok(self.state.lock().clone())
    }

    async fn save(&self, state: &SchemaState) -> Result<()> {
        *self.state.lock() = state.clone();
        Ok(())
    }
}

/// Pretty-printed JSON file, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct JsonFileMigrationStore {
    path: PathBuf,
}

impl JsonFileMigrationStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl MigrationStore for JsonFileMigrationStore {
    async fn load(&self) -> Result<SchemaState> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No schema state at {}, starting empty", self.path.display());
                Ok(SchemaState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &SchemaState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(state)?;
        let staging = self.staging_path();
        fs::write(&staging, &bytes).await?;
        fs::rename(&staging, &self.path).await.map_err(|e| {
            MigrationError::Store(format!(
                "Failed to move {} into place: {}",
                staging.display(),
                e
            ))
        })?;

        debug!(
            version = ?state.version(),
            "Persisted schema state to {}",
            self.path.display()
        );
        Ok(())
    }
}
