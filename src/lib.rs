//! # Hirundo
//!
//! Stream aggregation and caching core for a social-media client.
//!
//! ## Architecture
//!
//! ```text
//! FeedClient → Stream → StreamRegistry → EventHub → UI shell
//!                  ↘ Storage ↙
//! ```
//!
//! The crate owns the subsystems with real invariants — stream merging and
//! deduplication, registry uniqueness, the single upload worker, cache
//! validity, task correlation — and treats everything around them as a
//! collaborator behind a trait: the wire-level client ([`client`]), the
//! document store ([`store`]), and the presentation layer (a subscriber on
//! [`events`]).
//!
//! ## Modules
//!
//! - [`app`]: context wiring and the error taxonomy
//! - [`config`]: `~/.config/hirundo/config.toml`
//! - [`domain`]: core models (Message, Source, account data)
//! - [`client`]: wire-client and media-uploader collaborator traits
//! - [`store`]: opaque document storage (sqlite and in-memory backends)
//! - [`events`]: change-notification hub consumed by the UI shell
//! - [`stream`]: the aggregator plus persistent and temporary registries
//! - [`account`]: per-account cached profile/list data
//! - [`upload`]: the serialized media-upload worker
//! - [`task`]: cancelable async job tracking

/// Context wiring and error handling.
///
/// [`CoreContext`](app::CoreContext) constructs storage, registries,
/// caches and workers once at process start.
pub mod app;

/// Per-account cached profile and list data with explicit, event-driven
/// invalidation.
pub mod account;

/// Collaborator traits for the wire-level client: message fetching,
/// account data, chunked media upload.
pub mod client;

/// Configuration management.
///
/// Loads from `~/.config/hirundo/config.toml`; everything defaults so an
/// absent file is fine.
pub mod config;

/// Core domain models.
///
/// - [`Message`](domain::Message): one feed message, unique by id
/// - [`SourceSpec`](domain::SourceSpec): descriptor of one upstream feed
/// - [`MessageKind`](domain::MessageKind): the closed set of message kinds
pub mod domain;

/// Change-notification hub. Components emit
/// [`CoreEvent`](events::CoreEvent)s after a mutation commits; the UI
/// shell subscribes and is never able to block the mutation path.
pub mod events;

/// Tracing initialization for host shells without their own subscriber.
pub mod logging;

/// Opaque document storage.
///
/// - [`Storage`](store::Storage): trait the core programs against
/// - [`SqliteStorage`](store::SqliteStorage): durable backend
/// - [`MemoryStorage`](store::MemoryStorage): tests and throwaway profiles
pub mod store;

/// Stream aggregation: merging feed sources into ordered, deduplicated
/// message sequences, plus the persistent and temporary registries.
pub mod stream;

/// Cancelable asynchronous job tracking keyed by opaque handles.
pub mod task;

/// The serialized media-upload worker and its FIFO queue.
pub mod upload;
