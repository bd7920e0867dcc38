use std::fmt;

use serde::{Deserialize, Serialize};

/// Descriptor of one upstream feed, carrying its kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceSpec {
    Hashtag { tag: String },
    UserTweets { username: String },
    UserFavorites { username: String },
    List { owner: String, slug: String },
    Search { query: String },
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Hashtag { tag } => write!(f, "hashtag #{tag}"),
            SourceSpec::UserTweets { username } => write!(f, "tweets of @{username}"),
            SourceSpec::UserFavorites { username } => write!(f, "favorites of @{username}"),
            SourceSpec::List { owner, slug } => write!(f, "list @{owner}/{slug}"),
            SourceSpec::Search { query } => write!(f, "search '{query}'"),
        }
    }
}

/// A feed descriptor plus the state a stream keeps for it: whether fetched
/// messages should be persisted, and the opaque position marker for
/// incremental refresh (`None` means never fetched).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub spec: SourceSpec,
    #[serde(default)]
    pub cache_messages: bool,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl Source {
    pub fn new(spec: SourceSpec) -> Self {
        Self {
            spec,
            cache_messages: false,
            cursor: None,
        }
    }

    /// Mark fetched messages for persistence in the owning stream's record.
    pub fn cached(mut self) -> Self {
        self.cache_messages = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_source_has_no_cursor() {
        let source = Source::new(SourceSpec::Hashtag { tag: "rust".into() });
        assert!(source.cursor.is_none());
        assert!(!source.cache_messages);
    }

    #[test]
    fn test_cached_builder_sets_flag() {
        let source = Source::new(SourceSpec::UserTweets {
            username: "alice".into(),
        })
        .cached();
        assert!(source.cache_messages);
    }

    #[test]
    fn test_spec_serializes_with_kind_tag() {
        let spec = SourceSpec::List {
            owner: "alice".into(),
            slug: "reading".into(),
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["kind"], "list");
        assert_eq!(value["owner"], "alice");
    }
}
