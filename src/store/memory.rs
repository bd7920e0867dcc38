use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::store::{Storage, StorageError};

/// In-memory storage for tests and throwaway profiles.
#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<(String, String), Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, collection: &str, key: &str) -> Result<Value, StorageError> {
        let records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        records
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            })
    }

    fn put(&self, collection: &str, key: &str, record: &Value) -> Result<(), StorageError> {
        let mut records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        records.insert((collection.to_string(), key.to_string()), record.clone());
        Ok(())
    }

    fn delete(&self, collection: &str, key: &str) -> Result<(), StorageError> {
        let mut records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        records.remove(&(collection.to_string(), key.to_string()));
        Ok(())
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StorageError> {
        let records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries: Vec<(String, Value)> = records
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(entries)
    }
}
