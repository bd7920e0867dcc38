pub mod account;
pub mod message;
pub mod source;

pub use account::{ListSummary, RawList, UserProfile};
pub use message::{Message, MessageKind};
pub use source::{Source, SourceSpec};
