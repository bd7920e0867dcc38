use thiserror::Error;

use crate::client::FeedError;
use crate::config::ConfigError;
use crate::store::StorageError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("a stream named '{0}' already exists")]
    DuplicateStreamName(String),

    #[error("unsupported message kind: {0}")]
    UnsupportedMessageKind(String),

    #[error("upstream failure: {0}")]
    Upstream(#[from] FeedError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
