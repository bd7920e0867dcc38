pub mod context;
pub mod error;

pub use context::CoreContext;
pub use error::{CoreError, Result};
