//! Per-account cached profile and list data.
//!
//! One cache document per account username, held in memory once loaded and
//! backed by durable storage so it survives restarts. Validity is
//! event-driven: caches never expire on a timer, they are invalidated (or
//! incrementally updated) explicitly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::app::Result;
use crate::client::FeedClient;
use crate::domain::{ListSummary, RawList, UserProfile};
use crate::events::{CoreEvent, EventHub};
use crate::store::{collections, Storage, StorageError};

/// Cached profile and list data for one account. `valid` is false until
/// the first successful fetch and after explicit invalidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub username: String,
    pub user_info: Option<UserProfile>,
    pub private_lists: Vec<ListSummary>,
    pub public_lists: Vec<ListSummary>,
    pub valid: bool,
}

impl AccountInfo {
    pub fn empty(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            user_info: None,
            private_lists: Vec::new(),
            public_lists: Vec::new(),
            valid: false,
        }
    }
}

pub type SharedAccountInfo = Arc<AsyncMutex<AccountInfo>>;

/// In-memory registry of per-account caches, backed by durable storage.
///
/// Each account has exactly one in-memory instance; callers share it, so a
/// refresh through one path is visible to every other holder.
pub struct AccountCacheManager {
    storage: Arc<dyn Storage>,
    events: Arc<EventHub>,
    accounts: Mutex<HashMap<String, SharedAccountInfo>>,
}

impl AccountCacheManager {
    pub fn new(storage: Arc<dyn Storage>, events: Arc<EventHub>) -> Self {
        Self {
            storage,
            events,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Cache for `username`: the in-memory instance if present, otherwise
    /// loaded from storage. A storage miss is not an error — a fresh
    /// invalid cache is constructed, persisted, and returned.
    pub fn get(&self, username: &str) -> Result<SharedAccountInfo> {
        if let Some(existing) = self.lock().get(username).map(Arc::clone) {
            return Ok(existing);
        }

        let info = match self.storage.get(collections::ACCOUNTS, username) {
            Ok(value) => serde_json::from_value(value).map_err(StorageError::from)?,
            Err(StorageError::NotFound { .. }) => {
                debug!(username, "no cached account info, starting fresh");
                let info = AccountInfo::empty(username);
                self.persist(&info)?;
                info
            }
            Err(err) => return Err(err.into()),
        };

        let mut accounts = self.lock();
        let shared = accounts
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(info)));
        Ok(Arc::clone(shared))
    }

    /// Make sure the cache for `username` is populated and valid,
    /// refetching profile and lists from the client when it is not.
    ///
    /// On a failed fetch the cache stays invalid (and cleared); the error
    /// propagates so the caller can report it.
    pub async fn ensure_fresh(&self, username: &str, client: &dyn FeedClient) -> Result<()> {
        let shared = self.get(username)?;
        let mut info = shared.lock().await;
        if info.valid {
            debug!(username, "account cache already valid");
            return Ok(());
        }

        // Stale content goes before the refetch, not after: a failed fetch
        // must not leave half-old data behind a valid-looking cache.
        info.user_info = None;
        info.private_lists.clear();
        info.public_lists.clear();

        let profile = client.fetch_user_info(username).await?;
        let lists = client.fetch_owned_lists(username).await?;

        info.user_info = Some(profile);
        for list in lists {
            let RawList {
                id,
                name,
                member_count,
                mode,
            } = list;
            let summary = ListSummary {
                id,
                name,
                member_count,
            };
            match mode.as_str() {
                "private" => info.private_lists.push(summary),
                "public" => info.public_lists.push(summary),
                other => warn!(
                    username,
                    mode = other,
                    list = %summary.name,
                    "dropping list with unrecognized mode"
                ),
            }
        }
        info.valid = true;
        self.persist(&info)?;
        info!(
            username,
            private = info.private_lists.len(),
            public = info.public_lists.len(),
            "account cache refreshed"
        );
        Ok(())
    }

    /// Append a freshly created list to the right partition without a full
    /// refetch. The caller already holds the authoritative data, so this is
    /// the one mutation that does not invalidate the cache.
    pub async fn on_list_created(
        &self,
        username: &str,
        private: bool,
        list: ListSummary,
    ) -> Result<()> {
        let shared = self.get(username)?;
        let mut info = shared.lock().await;
        if private {
            info.private_lists.push(list);
        } else {
            info.public_lists.push(list);
        }
        self.persist(&info)?;
        self.events.emit(CoreEvent::UserListCreated {
            account: username.to_string(),
        });
        Ok(())
    }

    /// Remove a destroyed list from its partition; absent ids are ignored.
    pub async fn on_list_destroyed(
        &self,
        username: &str,
        private: bool,
        list_id: &str,
    ) -> Result<()> {
        let shared = self.get(username)?;
        let mut info = shared.lock().await;
        let partition = if private {
            &mut info.private_lists
        } else {
            &mut info.public_lists
        };
        partition.retain(|l| l.id != list_id);
        self.persist(&info)?;
        self.events.emit(CoreEvent::UserListDestroyed {
            account: username.to_string(),
        });
        Ok(())
    }

    /// Mark a cache stale so the next `ensure_fresh` refetches.
    pub async fn invalidate(&self, username: &str) -> Result<()> {
        let shared = self.get(username)?;
        let mut info = shared.lock().await;
        info.valid = false;
        self.persist(&info)?;
        Ok(())
    }

    /// Drop an account's cache from memory and storage.
    pub fn forget(&self, username: &str) -> Result<()> {
        self.lock().remove(username);
        self.storage.delete(collections::ACCOUNTS, username)?;
        self.events.emit(CoreEvent::AccountListChanged);
        Ok(())
    }

    fn persist(&self, info: &AccountInfo) -> Result<()> {
        let value = serde_json::to_value(info).map_err(StorageError::from)?;
        self.storage
            .put(collections::ACCOUNTS, &info.username, &value)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedAccountInfo>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
