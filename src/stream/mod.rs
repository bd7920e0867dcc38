//! Stream aggregation: merging one or more feed sources into a single
//! ordered, deduplicated message sequence.

pub mod registry;
pub mod temporary;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::{CoreError, Result};
use crate::client::{FeedClient, FeedError};
use crate::domain::{Message, MessageKind, Source};

pub use registry::{SharedStream, StreamRegistry};
pub use temporary::TemporaryStreamRegistry;

/// Read-only view of a stream handed to the presentation layer: the full
/// message sequence plus the resolved position of the active message.
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    pub messages: Vec<Message>,
    pub active_index: Option<usize>,
}

/// One source that contributed nothing to a refresh because the upstream
/// call failed. The refresh as a whole carries on without it.
#[derive(Debug)]
pub struct SourceFailure {
    pub source_index: usize,
    pub error: FeedError,
}

/// Outcome of one refresh: the messages merged in this round (newest
/// first) and any sources that failed.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub new_messages: Vec<Message>,
    pub failures: Vec<SourceFailure>,
}

/// Persisted shape of a stream. Only messages from caching sources make it
/// into the record; everything else is session-volatile.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StreamRecord {
    pub(crate) name: String,
    pub(crate) position: u64,
    pub(crate) sources: Vec<Source>,
    pub(crate) active_message: Option<(MessageKind, String)>,
    pub(crate) messages: Vec<Message>,
}

/// An ordered, deduplicated aggregation of one or more feed sources.
///
/// Messages are kept newest first and unique by id for the lifetime of the
/// stream. Refreshing is incremental: each source resumes from its stored
/// cursor and only genuinely new messages are merged and reported.
#[derive(Debug)]
pub struct Stream {
    name: String,
    persistent: bool,
    sources: Vec<Source>,
    messages: Vec<Message>,
    seen: HashSet<String>,
    cacheable: HashSet<String>,
    active: Option<(MessageKind, String)>,
}

impl Stream {
    pub fn new(name: impl Into<String>, sources: Vec<Source>, persistent: bool) -> Self {
        Self {
            name: name.into(),
            persistent,
            sources,
            messages: Vec::new(),
            seen: HashSet::new(),
            cacheable: HashSet::new(),
            active: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Accumulated messages, newest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn active_message(&self) -> Option<(MessageKind, &str)> {
        self.active.as_ref().map(|(kind, id)| (*kind, id.as_str()))
    }

    /// Pull every source forward from its cursor and merge the results.
    ///
    /// Per-source failures are absorbed: the source contributes zero new
    /// messages this round, its cursor stays put, and the failure is
    /// recorded in the outcome. Messages whose id was already seen are
    /// dropped.
    pub async fn refresh(&mut self, client: &dyn FeedClient) -> RefreshOutcome {
        let mut failures = Vec::new();
        let mut fresh: Vec<Message> = Vec::new();

        for (source_index, source) in self.sources.iter_mut().enumerate() {
            match client.fetch_messages(&source.spec, source.cursor.as_deref()).await {
                Ok(page) => {
                    if let Some(cursor) = page.cursor {
                        source.cursor = Some(cursor);
                    }
                    for message in page.messages {
                        if !self.seen.insert(message.id.clone()) {
                            continue;
                        }
                        if source.cache_messages {
                            self.cacheable.insert(message.id.clone());
                        }
                        fresh.push(message);
                    }
                }
                Err(error) => {
                    warn!(
                        stream = %self.name,
                        source = %source.spec,
                        error = %error,
                        "source fetch failed, continuing with remaining sources"
                    );
                    failures.push(SourceFailure {
                        source_index,
                        error,
                    });
                }
            }
        }

        // Order the round's haul newest first before it goes on top.
        fresh.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut merged = fresh.clone();
        merged.append(&mut self.messages);
        self.messages = merged;

        RefreshOutcome {
            new_messages: fresh,
            failures,
        }
    }

    /// Select the active message by kind and id.
    ///
    /// The kind must be one the stream recognizes; an unknown kind is
    /// rejected and the previous selection stays in place.
    pub fn set_active_message(&mut self, kind: &str, id: &str) -> Result<()> {
        let kind = MessageKind::parse(kind)
            .ok_or_else(|| CoreError::UnsupportedMessageKind(kind.to_string()))?;
        self.active = Some((kind, id.to_string()));
        Ok(())
    }

    /// Index of the active message within `messages()`. A selection that
    /// matches nothing is a valid state, not an error.
    pub fn active_index(&self) -> Option<usize> {
        let (kind, id) = self.active.as_ref()?;
        self.messages
            .iter()
            .position(|m| m.kind == *kind && m.id == *id)
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            messages: self.messages.clone(),
            active_index: self.active_index(),
        }
    }

    pub(crate) fn to_record(&self, position: u64) -> StreamRecord {
        StreamRecord {
            name: self.name.clone(),
            position,
            sources: self.sources.clone(),
            active_message: self.active.clone(),
            messages: self
                .messages
                .iter()
                .filter(|m| self.cacheable.contains(&m.id))
                .cloned()
                .collect(),
        }
    }

    pub(crate) fn from_record(record: StreamRecord) -> Self {
        let seen: HashSet<String> = record.messages.iter().map(|m| m.id.clone()).collect();
        Self {
            name: record.name,
            persistent: true,
            sources: record.sources,
            cacheable: seen.clone(),
            seen,
            messages: record.messages,
            active: record.active_message,
        }
    }
}
