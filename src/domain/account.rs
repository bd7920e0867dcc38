use serde::{Deserialize, Serialize};

/// Profile snapshot for one account, as last fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub display_name: String,
    pub description: Option<String>,
    pub followers_count: u64,
    pub friends_count: u64,
}

/// Summary of one list owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSummary {
    pub id: String,
    pub name: String,
    pub member_count: u64,
}

/// A list as it arrives from the wire client, its `mode` field not yet
/// interpreted. The cache layer partitions by mode and drops anything it
/// does not recognize.
#[derive(Debug, Clone)]
pub struct RawList {
    pub id: String,
    pub name: String,
    pub member_count: u64,
    pub mode: String,
}
