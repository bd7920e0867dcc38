//! Core configuration.
//!
//! Read from `~/.config/hirundo/config.toml` at startup. A missing file
//! just means defaults; a present but malformed file is an error.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{Source, SourceSpec};
use crate::upload::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a config directory")]
    NoConfigDir,

    #[error("could not locate a data directory")]
    NoDataDir,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Main configuration struct. Every field has a default so hosts can ship
/// an empty file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Profile directory holding the main database. `None` means the
    /// platform data dir.
    pub data_dir: Option<PathBuf>,

    /// Account used to derive the default stream seeds when
    /// `initial_streams` is not given explicitly.
    pub default_account: Option<String>,

    pub upload: UploadConfig,

    /// Streams seeded into an empty registry on first start.
    pub initial_streams: Vec<InitialStream>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub chunk_size_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// One stream in the initial seed set.
#[derive(Debug, Clone, Deserialize)]
pub struct InitialStream {
    pub name: String,
    pub sources: Vec<Source>,
}

impl CoreConfig {
    /// Load configuration from the default path; a missing file yields
    /// defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse { path, source: e })
    }

    /// Get the default config file path: `~/.config/hirundo/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("hirundo").join("config.toml"))
    }

    /// The seed set for `StreamRegistry::add_initial_streams`: the explicit
    /// `initial_streams` list when given, otherwise the classic home and
    /// favorites pair for `default_account`, otherwise nothing.
    pub fn initial_stream_seeds(&self) -> Vec<InitialStream> {
        if !self.initial_streams.is_empty() {
            return self.initial_streams.clone();
        }

        let Some(account) = &self.default_account else {
            return Vec::new();
        };

        vec![
            InitialStream {
                name: "home".into(),
                sources: vec![Source::new(SourceSpec::UserTweets {
                    username: account.clone(),
                })
                .cached()],
            },
            InitialStream {
                name: "favorites".into(),
                sources: vec![Source::new(SourceSpec::UserFavorites {
                    username: account.clone(),
                })],
            },
        ]
    }
}
