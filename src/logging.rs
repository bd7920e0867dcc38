//! Tracing initialization for host shells.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber: fmt layer plus the `RUST_LOG`
/// environment filter.
///
/// Host shells that already install their own subscriber should skip
/// this. Calling it more than once is safe; later calls are ignored.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init();
}
