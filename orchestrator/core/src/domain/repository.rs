// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Persistence Interface
//!
//! The Event Log and the Exception Registry are persisted as opaque blobs
//! under fixed keys. Both are loaded once when the engine is initialised and
//! written back on every mutation.
//!
//! | Key | Contents |
//! |-----|----------|
//! | [`LOGS_KEY`] | Event Log entries, oldest first |
//! | [`EXCEPTIONS_KEY`] | Exception Registry entries |
//!
//! Implementations: `InMemoryStore` for tests, `FileStore` for the CLI.

use async_trait::async_trait;
use thiserror::Error;

pub const LOGS_KEY: &str = "farmer.logs";
pub const EXCEPTIONS_KEY: &str = "farmer.exceptions";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
    async fn save(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError>;
}
