//! Collaborator seams for the wire-level social-media client.
//!
//! The core never talks HTTP itself: fetching messages, profile data, and
//! media uploads all go through the traits here, implemented by the
//! excluded transport layer.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Message, RawList, SourceSpec, UserProfile};

/// One page of messages pulled from an upstream feed, newest first, plus
/// the position marker to resume from next time.
#[derive(Debug, Clone)]
pub struct FetchPage {
    pub messages: Vec<Message>,
    pub cursor: Option<String>,
}

/// Upstream failures as the aggregation layer distinguishes them. All
/// three degrade to "zero new messages from that source" during a refresh.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("upstream rate limit hit")]
    RateLimited,

    #[error("request not authorized")]
    Unauthorized,

    #[error("upstream failure: {0}")]
    Unknown(String),
}

#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch messages for one source, starting after `cursor`.
    async fn fetch_messages(
        &self,
        spec: &SourceSpec,
        cursor: Option<&str>,
    ) -> Result<FetchPage, FeedError>;

    /// Fetch the profile snapshot for an account.
    async fn fetch_user_info(&self, username: &str) -> Result<UserProfile, FeedError>;

    /// Fetch the lists an account owns, modes uninterpreted.
    async fn fetch_owned_lists(&self, username: &str) -> Result<Vec<RawList>, FeedError>;
}

/// Chunked media upload protocol: one session per file, chunks appended in
/// order, then finalized into a media id. The upload worker drives this
/// serially; implementations do not need to tolerate concurrent sessions
/// for the same file.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Open an upload session. `sha256` is the hex digest of the full
    /// payload, for upstream integrity checks.
    async fn begin(
        &self,
        filename: &str,
        total_bytes: u64,
        sha256: &str,
    ) -> anyhow::Result<String>;

    /// Append one chunk to a session. Chunks arrive with increasing
    /// `index` and no gaps.
    async fn append(&self, session: &str, chunk: &[u8], index: usize) -> anyhow::Result<()>;

    /// Close the session and return the media id assigned upstream.
    async fn finalize(&self, session: &str) -> anyhow::Result<String>;
}
