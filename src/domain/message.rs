use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kinds of messages the aggregation layer recognizes.
///
/// This is a closed set: wire data carrying any other kind tag is rejected
/// at the boundary rather than passed through untyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Tweet,
    Retweet,
    DirectMessage,
}

impl MessageKind {
    /// Parse a wire-format kind name. Returns `None` for unknown kinds;
    /// callers decide whether that is an error.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tweet" => Some(MessageKind::Tweet),
            "retweet" => Some(MessageKind::Retweet),
            "direct-message" => Some(MessageKind::DirectMessage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Tweet => "tweet",
            MessageKind::Retweet => "retweet",
            MessageKind::DirectMessage => "direct-message",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message pulled from an upstream feed.
///
/// Immutable after creation; the `id` is unique within the source that
/// produced it and is what streams dedup on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        author: impl Into<String>,
        created_at: DateTime<Utc>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            author: author.into(),
            created_at,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_kinds() {
        assert_eq!(MessageKind::parse("tweet"), Some(MessageKind::Tweet));
        assert_eq!(MessageKind::parse("retweet"), Some(MessageKind::Retweet));
        assert_eq!(
            MessageKind::parse("direct-message"),
            Some(MessageKind::DirectMessage)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert_eq!(MessageKind::parse("unknown-kind"), None);
        assert_eq!(MessageKind::parse(""), None);
        assert_eq!(MessageKind::parse("Tweet"), None);
    }

    #[test]
    fn test_kind_round_trips_through_name() {
        for kind in [
            MessageKind::Tweet,
            MessageKind::Retweet,
            MessageKind::DirectMessage,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
    }
}
