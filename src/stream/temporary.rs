use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tempfile::TempDir;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::app::{CoreError, Result};
use crate::client::FeedClient;
use crate::domain::Source;
use crate::stream::{SharedStream, Stream, StreamSnapshot};

struct Inner {
    by_id: HashMap<u64, SharedStream>,
    scratch: Option<TempDir>,
}

/// Directory of ephemeral streams keyed by a session-unique numeric id.
///
/// Temporary streams and their scratch storage live only as long as the
/// registry: `clear` (or dropping the registry) releases the whole lot,
/// streams and scratch root alike, as one unit.
pub struct TemporaryStreamRegistry {
    next_id: AtomicU64,
    inner: Mutex<Inner>,
}

impl Default for TemporaryStreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporaryStreamRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                by_id: HashMap::new(),
                scratch: None,
            }),
        }
    }

    /// Allocate the next stream id. Safe under concurrent callers: ids are
    /// issued 0, 1, 2, … with no repeats and no gaps.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Build and index a volatile single-source stream, returning its id.
    pub fn create(&self, source: Source) -> Result<u64> {
        let id = self.next_id();
        let stream = Stream::new(format!("temporary-{id}"), vec![source], false);
        self.insert(id, stream)?;
        debug!(id, "temporary stream created");
        Ok(id)
    }

    /// Index an existing stream under a fresh id.
    pub fn store(&self, stream: Stream) -> Result<u64> {
        let id = self.next_id();
        self.insert(id, stream)?;
        Ok(id)
    }

    pub fn get(&self, id: u64) -> Option<SharedStream> {
        self.lock().by_id.get(&id).map(Arc::clone)
    }

    /// Scratch directory reserved for one stream's session, if the stream
    /// is still registered.
    pub fn scratch_path(&self, id: u64) -> Option<PathBuf> {
        let inner = self.lock();
        if !inner.by_id.contains_key(&id) {
            return None;
        }
        inner
            .scratch
            .as_ref()
            .map(|root| root.path().join(format!("stream-{id}")))
    }

    /// Messages for a temporary stream, optionally refreshing first.
    pub async fn messages(
        &self,
        id: u64,
        refresh: bool,
        client: &dyn FeedClient,
    ) -> Result<StreamSnapshot> {
        let shared = self
            .get(id)
            .ok_or_else(|| CoreError::StreamNotFound(format!("temporary-{id}")))?;
        let mut stream = shared.lock().await;
        if refresh {
            stream.refresh(client).await;
        }
        Ok(stream.snapshot())
    }

    /// Drop a temporary stream and its scratch directory. Removing an id
    /// that is already gone is a no-op: UI-driven cleanup is allowed to
    /// race with stream completion.
    pub fn remove(&self, id: u64) {
        let mut inner = self.lock();
        if inner.by_id.remove(&id).is_none() {
            debug!(id, "temporary stream already removed");
            return;
        }
        if let Some(root) = &inner.scratch {
            let dir = root.path().join(format!("stream-{id}"));
            if dir.exists() {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    warn!(id, error = %err, "failed to remove scratch directory");
                }
            }
        }
    }

    /// Number of live temporary streams.
    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_id.is_empty()
    }

    /// Release every temporary stream and the shared scratch root.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let count = inner.by_id.len();
        inner.by_id.clear();
        inner.scratch = None;
        if count > 0 {
            info!(count, "temporary streams released");
        }
    }

    fn insert(&self, id: u64, stream: Stream) -> Result<()> {
        let mut inner = self.lock();
        if inner.scratch.is_none() {
            inner.scratch = Some(TempDir::new()?);
        }
        if let Some(root) = &inner.scratch {
            std::fs::create_dir_all(root.path().join(format!("stream-{id}")))?;
        }
        inner.by_id.insert(id, Arc::new(AsyncMutex::new(stream)));
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceSpec;
    use crate::stream::tests::{message, ScriptedClient};

    fn hashtag(tag: &str) -> Source {
        Source::new(SourceSpec::Hashtag { tag: tag.into() })
    }

    #[test]
    fn test_concurrent_ids_are_unique_and_gapless() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 250;

        let registry = Arc::new(TemporaryStreamRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..THREADS {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| registry.next_id())
                    .collect::<Vec<u64>>()
            }));
        }

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();

        let expected: Vec<u64> = (0..THREADS * PER_THREAD).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_create_get_remove_lifecycle() {
        let registry = TemporaryStreamRegistry::new();
        let id = registry.create(hashtag("rust")).unwrap();
        assert_eq!(id, 0);
        assert!(registry.get(id).is_some());

        let scratch = registry.scratch_path(id).unwrap();
        assert!(scratch.is_dir());

        registry.remove(id);
        assert!(registry.get(id).is_none());
        assert!(!scratch.exists());

        // Removing again must be a quiet no-op.
        registry.remove(id);
    }

    #[test]
    fn test_clear_releases_everything() {
        let registry = TemporaryStreamRegistry::new();
        let a = registry.create(hashtag("a")).unwrap();
        let b = registry.create(hashtag("b")).unwrap();
        let scratch_a = registry.scratch_path(a).unwrap();

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get(a).is_none());
        assert!(registry.get(b).is_none());
        assert!(!scratch_a.exists());
    }

    #[tokio::test]
    async fn test_messages_with_refresh() {
        let registry = TemporaryStreamRegistry::new();
        let client = ScriptedClient::new([ScriptedClient::page(
            vec![message("m1", 2), message("m2", 1)],
            "c1",
        )]);

        let id = registry.create(hashtag("rust")).unwrap();
        let snapshot = registry.messages(id, true, &client).await.unwrap();
        assert_eq!(snapshot.messages.len(), 2);

        let err = registry
            .messages(999, false, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StreamNotFound(_)));
    }
}
