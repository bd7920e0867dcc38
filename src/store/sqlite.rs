use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};
use serde_json::Value;

use crate::store::{Storage, StorageError};

/// Document store over a single sqlite table.
///
/// One row per document: (collection, key, doc). The doc column holds
/// serialized JSON whose schema the core never inspects.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|_| StorageError::Database(rusqlite::Error::InvalidQuery))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl Storage for SqliteStorage {
    fn get(&self, collection: &str, key: &str) -> Result<Value, StorageError> {
        let conn = self.lock()?;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()?;

        match doc {
            Some(doc) => Ok(serde_json::from_str(&doc)?),
            None => Err(StorageError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn put(&self, collection: &str, key: &str, record: &Value) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (collection, key, doc) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, key) DO UPDATE SET doc = ?3",
            params![collection, key, record.to_string()],
        )?;

        Ok(())
    }

    fn delete(&self, collection: &str, key: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
            params![collection, key],
        )?;

        Ok(())
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, doc FROM documents WHERE collection = ?1 ORDER BY key",
        )?;

        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, doc)| Ok((key, serde_json::from_str(&doc)?)))
            .collect()
    }
}
