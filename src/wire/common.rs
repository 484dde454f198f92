//! Shared pieces of the line-delimited JSON protocol: one JSON object per
//! line for both requests and responses, dispatched on the `type` field.

use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 9000;

/// A request line larger than this closes the connection.
pub const MAX_REQUEST_BYTES: usize = 2 * 1024 * 1024;

fn default_partitions() -> i64 {
    i64::from(crate::DEFAULT_PARTITIONS)
}

fn default_limit() -> i64 {
    10
}

fn default_auto_commit() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateTopicRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_partitions")]
    pub partitions: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProduceRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub partition: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub partition: i64,
    #[serde(default)]
    pub next_offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct FetchGroupRequest {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub partition: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,
}

#[derive(Debug, Deserialize)]
pub struct GroupStatsRequest {
    #[serde(default)]
    pub group: String,
}

/// Server-side limit clamp: non-positive means the default of 10, anything
/// above 1000 is capped.
pub fn clamp_limit(limit: i64) -> usize {
    if limit <= 0 {
        10
    } else {
        limit.min(1000) as usize
    }
}
