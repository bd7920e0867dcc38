pub mod memory;
pub mod sqlite;

use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Collection names for the documents the core persists.
pub mod collections {
    pub const STREAMS: &str = "streams";
    pub const ACCOUNTS: &str = "accounts";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Opaque document store keyed by (collection, key).
///
/// Records are plain JSON values; their schema belongs to whoever put them
/// there. `get` on an absent key is the distinguished `NotFound` error,
/// `delete` on an absent key is not an error at all.
pub trait Storage: Send + Sync {
    fn get(&self, collection: &str, key: &str) -> Result<Value, StorageError>;
    fn put(&self, collection: &str, key: &str, record: &Value) -> Result<(), StorageError>;
    fn delete(&self, collection: &str, key: &str) -> Result<(), StorageError>;
    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StorageError>;
}
