use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::app::{CoreError, Result};
use crate::client::FeedClient;
use crate::config::InitialStream;
use crate::domain::Source;
use crate::events::{CoreEvent, EventHub};
use crate::store::{collections, Storage, StorageError};
use crate::stream::{RefreshOutcome, Stream, StreamRecord, StreamSnapshot};

/// A stream shared between the registry and in-flight operations. The
/// async mutex is what serializes racing refreshes on one stream.
pub type SharedStream = Arc<AsyncMutex<Stream>>;

struct Entry {
    position: u64,
    stream: SharedStream,
}

struct Inner {
    order: Vec<String>,
    by_name: HashMap<String, Entry>,
    next_position: u64,
}

/// Directory of named, persistent streams.
///
/// The registry is the single source of truth for persistent streams:
/// every structural change is written to storage first and then announced
/// on the event hub. The registry lock covers only directory mutations —
/// refreshes run under the per-stream lock so observers never wait on a
/// slow fetch.
pub struct StreamRegistry {
    storage: Arc<dyn Storage>,
    events: Arc<EventHub>,
    inner: Mutex<Inner>,
}

impl StreamRegistry {
    /// Load every persisted stream from storage, oldest first.
    pub fn open(storage: Arc<dyn Storage>, events: Arc<EventHub>) -> Result<Self> {
        let mut records: Vec<StreamRecord> = Vec::new();
        for (key, value) in storage.list(collections::STREAMS)? {
            match serde_json::from_value::<StreamRecord>(value) {
                Ok(record) => records.push(record),
                Err(err) => warn!(key = %key, error = %err, "skipping malformed stream record"),
            }
        }
        records.sort_by_key(|r| r.position);

        let mut inner = Inner {
            order: Vec::new(),
            by_name: HashMap::new(),
            next_position: 0,
        };
        for record in records {
            inner.next_position = inner.next_position.max(record.position + 1);
            inner.order.push(record.name.clone());
            inner.by_name.insert(
                record.name.clone(),
                Entry {
                    position: record.position,
                    stream: Arc::new(AsyncMutex::new(Stream::from_record(record))),
                },
            );
        }
        info!(streams = inner.order.len(), "stream registry opened");

        Ok(Self {
            storage,
            events,
            inner: Mutex::new(inner),
        })
    }

    /// Seed the registry with a default stream set. Only acts on an empty
    /// registry, so repeated startup calls cannot double-seed. Returns how
    /// many streams were added.
    pub fn add_initial_streams(&self, seeds: &[InitialStream]) -> Result<usize> {
        if !self.lock().order.is_empty() {
            return Ok(0);
        }

        let mut added = 0;
        for seed in seeds {
            match self.create(&seed.name, seed.sources.clone()) {
                Ok(_) => added += 1,
                Err(CoreError::DuplicateStreamName(name)) => {
                    warn!(name = %name, "duplicate name in initial stream set, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        if added > 0 {
            info!(added, "seeded initial streams");
        }
        Ok(added)
    }

    /// Create a new persistent stream. Names are unique; a collision is an
    /// error and the existing stream is left untouched.
    pub fn create(&self, name: &str, sources: Vec<Source>) -> Result<SharedStream> {
        let stream = Stream::new(name, sources, true);
        let shared = {
            let mut inner = self.lock();
            if inner.by_name.contains_key(name) {
                return Err(CoreError::DuplicateStreamName(name.to_string()));
            }
            let position = inner.next_position;
            self.persist(&stream, position)?;
            inner.next_position += 1;

            let shared = Arc::new(AsyncMutex::new(stream));
            inner.order.push(name.to_string());
            inner.by_name.insert(
                name.to_string(),
                Entry {
                    position,
                    stream: Arc::clone(&shared),
                },
            );
            shared
        };

        self.events.emit(CoreEvent::StreamListChanged);
        Ok(shared)
    }

    /// Delete a stream by name. Returns whether anything existed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let existed = {
            let mut inner = self.lock();
            match inner.by_name.remove(name) {
                Some(_) => {
                    inner.order.retain(|n| n != name);
                    true
                }
                None => false,
            }
        };

        if existed {
            self.storage.delete(collections::STREAMS, name)?;
            self.events.emit(CoreEvent::StreamListChanged);
        }
        Ok(existed)
    }

    /// Streams in insertion order, stable across calls.
    pub fn list(&self) -> Vec<SharedStream> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|name| inner.by_name.get(name))
            .map(|entry| Arc::clone(&entry.stream))
            .collect()
    }

    /// Stream names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.lock().order.clone()
    }

    pub fn get(&self, name: &str) -> Option<SharedStream> {
        self.lock()
            .by_name
            .get(name)
            .map(|entry| Arc::clone(&entry.stream))
    }

    /// Refresh one stream and persist its cached slice.
    ///
    /// Racing refreshes on the same stream queue on the per-stream lock; a
    /// second caller merges only what the first one left behind.
    pub async fn refresh(&self, name: &str, client: &dyn FeedClient) -> Result<RefreshOutcome> {
        let (shared, position) = self.entry(name)?;
        let mut stream = shared.lock().await;
        let outcome = stream.refresh(client).await;
        self.persist(&stream, position)?;
        Ok(outcome)
    }

    /// Messages for one stream, optionally refreshing first — the
    /// list-messages surface the presentation layer calls.
    pub async fn messages(
        &self,
        name: &str,
        refresh: bool,
        client: &dyn FeedClient,
    ) -> Result<StreamSnapshot> {
        let (shared, position) = self.entry(name)?;
        let mut stream = shared.lock().await;
        if refresh {
            stream.refresh(client).await;
            self.persist(&stream, position)?;
        }
        Ok(stream.snapshot())
    }

    /// Select the active message of a stream, persisting the choice.
    pub async fn set_active_message(&self, name: &str, kind: &str, id: &str) -> Result<()> {
        let (shared, position) = self.entry(name)?;
        let mut stream = shared.lock().await;
        stream.set_active_message(kind, id)?;
        self.persist(&stream, position)?;
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<(SharedStream, u64)> {
        self.lock()
            .by_name
            .get(name)
            .map(|entry| (Arc::clone(&entry.stream), entry.position))
            .ok_or_else(|| CoreError::StreamNotFound(name.to_string()))
    }

    fn persist(&self, stream: &Stream, position: u64) -> Result<()> {
        let record = stream.to_record(position);
        let value = serde_json::to_value(&record).map_err(StorageError::from)?;
        self.storage.put(collections::STREAMS, stream.name(), &value)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
