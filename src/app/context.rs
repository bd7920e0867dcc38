use std::path::PathBuf;
use std::sync::Arc;

use crate::account::AccountCacheManager;
use crate::app::Result;
use crate::client::{FeedClient, MediaUploader};
use crate::config::{ConfigError, CoreConfig};
use crate::events::EventHub;
use crate::store::{MemoryStorage, SqliteStorage, Storage};
use crate::stream::{StreamRegistry, TemporaryStreamRegistry};
use crate::task::TaskTracker;
use crate::upload::{spawn_upload_worker, UploadWorkerHandle};

const MAIN_DB_FILE: &str = "main.db";

/// Wires the core together: storage, event hub, registries, caches and
/// workers, constructed once at process start and handed to the
/// presentation layer.
pub struct CoreContext {
    pub config: CoreConfig,
    pub storage: Arc<dyn Storage>,
    pub client: Arc<dyn FeedClient>,
    pub events: Arc<EventHub>,
    pub streams: Arc<StreamRegistry>,
    pub temporary_streams: Arc<TemporaryStreamRegistry>,
    pub accounts: Arc<AccountCacheManager>,
    pub tasks: Arc<TaskTracker>,
    pub uploads: UploadWorkerHandle,
}

impl CoreContext {
    /// Open (or create) the on-disk profile and wire every component.
    ///
    /// Must run inside a tokio runtime: the upload worker is spawned here.
    pub fn new(
        config: CoreConfig,
        client: Arc<dyn FeedClient>,
        uploader: Arc<dyn MediaUploader>,
    ) -> Result<Self> {
        let db_path = match &config.data_dir {
            Some(dir) => dir.join(MAIN_DB_FILE),
            None => Self::default_profile_dir()?.join(MAIN_DB_FILE),
        };
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(&db_path)?);
        Self::with_storage(config, storage, client, uploader)
    }

    /// Fully in-memory context for tests and throwaway sessions.
    pub fn in_memory(
        config: CoreConfig,
        client: Arc<dyn FeedClient>,
        uploader: Arc<dyn MediaUploader>,
    ) -> Result<Self> {
        Self::with_storage(config, Arc::new(MemoryStorage::new()), client, uploader)
    }

    /// Wire the components over an already-opened storage backend.
    pub fn with_storage(
        config: CoreConfig,
        storage: Arc<dyn Storage>,
        client: Arc<dyn FeedClient>,
        uploader: Arc<dyn MediaUploader>,
    ) -> Result<Self> {
        let events = Arc::new(EventHub::new());

        let streams = Arc::new(StreamRegistry::open(
            Arc::clone(&storage),
            Arc::clone(&events),
        )?);
        streams.add_initial_streams(&config.initial_stream_seeds())?;

        let temporary_streams = Arc::new(TemporaryStreamRegistry::new());
        let accounts = Arc::new(AccountCacheManager::new(
            Arc::clone(&storage),
            Arc::clone(&events),
        ));
        let tasks = Arc::new(TaskTracker::new(Arc::clone(&events)));
        let uploads = spawn_upload_worker(
            uploader,
            Arc::clone(&events),
            config.upload.chunk_size_bytes,
        );

        Ok(Self {
            config,
            storage,
            client,
            events,
            streams,
            temporary_streams,
            accounts,
            tasks,
            uploads,
        })
    }

    /// Drain background work and release session-scoped resources. The
    /// upload worker finishes its queue before exiting; temporary streams
    /// and their scratch storage go away as a unit.
    pub fn shutdown(&self) {
        self.uploads.shutdown();
        self.temporary_streams.clear();
    }

    fn default_profile_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(data_dir.join("hirundo"))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::client::{FetchPage, FeedError};
    use crate::domain::{RawList, SourceSpec, UserProfile};

    struct NullClient;

    #[async_trait]
    impl FeedClient for NullClient {
        async fn fetch_messages(
            &self,
            _spec: &SourceSpec,
            _cursor: Option<&str>,
        ) -> std::result::Result<FetchPage, FeedError> {
            Ok(FetchPage {
                messages: Vec::new(),
                cursor: None,
            })
        }

        async fn fetch_user_info(
            &self,
            _username: &str,
        ) -> std::result::Result<UserProfile, FeedError> {
            Err(FeedError::Unauthorized)
        }

        async fn fetch_owned_lists(
            &self,
            _username: &str,
        ) -> std::result::Result<Vec<RawList>, FeedError> {
            Err(FeedError::Unauthorized)
        }
    }

    struct NullUploader;

    #[async_trait]
    impl MediaUploader for NullUploader {
        async fn begin(
            &self,
            _filename: &str,
            _total_bytes: u64,
            _sha256: &str,
        ) -> anyhow::Result<String> {
            Ok("session".into())
        }

        async fn append(
            &self,
            _session: &str,
            _chunk: &[u8],
            _index: usize,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn finalize(&self, _session: &str) -> anyhow::Result<String> {
            Ok("media".into())
        }
    }

    #[tokio::test]
    async fn test_in_memory_context_seeds_from_config() {
        let config = CoreConfig {
            default_account: Some("alice".into()),
            ..Default::default()
        };

        let ctx =
            CoreContext::in_memory(config, Arc::new(NullClient), Arc::new(NullUploader)).unwrap();
        assert_eq!(ctx.streams.names(), vec!["home", "favorites"]);
        assert!(ctx.temporary_streams.is_empty());

        ctx.shutdown();
    }

    #[tokio::test]
    async fn test_on_disk_context_reopens_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig {
            data_dir: Some(dir.path().to_path_buf()),
            default_account: Some("alice".into()),
            ..Default::default()
        };

        {
            let ctx = CoreContext::new(
                config.clone(),
                Arc::new(NullClient),
                Arc::new(NullUploader),
            )
            .unwrap();
            assert_eq!(ctx.streams.names().len(), 2);
            ctx.shutdown();
        }

        // Second start finds the seeded streams and does not re-seed.
        let ctx =
            CoreContext::new(config, Arc::new(NullClient), Arc::new(NullUploader)).unwrap();
        assert_eq!(ctx.streams.names(), vec!["home", "favorites"]);
        ctx.shutdown();
    }
}
