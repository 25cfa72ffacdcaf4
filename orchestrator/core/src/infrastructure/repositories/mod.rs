// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Key-Value Store Implementations
//!
//! Infrastructure implementations of [`KeyValueStore`] used to persist the
//! Event Log and the Exception Registry.
//!
//! # Available Implementations
//!
//! - **InMemoryStore** - HashMap-backed storage for tests
//! - **FileStore** - one JSON file per key inside a directory, used by the CLI
//!
//! # Usage
//!
//! ```no_run
//! use farmer_core::infrastructure::repositories::FileStore;
//!
//! let store = FileStore::new("/var/lib/farmer")?;
//! # Ok::<(), farmer_core::domain::repository::PersistenceError>(())
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::repository::{KeyValueStore, PersistenceError};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    values: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        self.values.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Directory-backed store: key `farmer.logs` lives in `<dir>/farmer.logs.json`.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
            && !key.starts_with('.');
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        // Write-then-rename keeps the previous blob intact on a crash
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
