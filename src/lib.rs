use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub mod error;
pub mod storage;
pub mod telemetry;
pub mod wire;

pub use error::StorageError;

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};

use storage::offset_store::OffsetStore;
use storage::topic_log::TopicLog;

/// Partition count assigned to a topic that is first referenced implicitly
/// instead of being created via `create_topic`.
pub const DEFAULT_PARTITIONS: u32 = 3;
/// Upper bound on the partition count accepted by `create_topic`.
pub const MAX_PARTITIONS: u32 = 128;

const DEFAULT_FETCH_LIMIT: usize = 10;
const MAX_FETCH_LIMIT: usize = 1000;

// =============================================================================
// CORE DATA STRUCTURES
// =============================================================================

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FetchedRecord {
    pub partition: u32,
    pub offset: u64,
    pub ts_ms: u64,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchResult {
    pub records: Vec<FetchedRecord>,
    pub next_offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchGroupResult {
    pub start_offset: u64,
    pub next_offset: u64,
    pub auto_commit: bool,
    pub commit_ok: bool,
    pub committed_offset_after: u64,
    pub records: Vec<FetchedRecord>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PartitionStats {
    pub partition: u32,
    pub end_offset: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TopicSummary {
    pub topic: String,
    pub partitions: u32,
    pub partition_stats: Vec<PartitionStats>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PartitionLag {
    pub partition: u32,
    pub end_offset: u64,
    pub committed_offset: u64,
    pub lag: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GroupTopicStats {
    pub topic: String,
    pub partitions: u32,
    pub partitions_stats: Vec<PartitionLag>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GroupStats {
    pub group: String,
    pub topics: Vec<GroupTopicStats>,
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

// =============================================================================
// STORE
// =============================================================================

/// The storage engine and group-offset manager.
///
/// All topic state, indices, and the committed-offsets map sit behind one
/// exclusive lock; every public operation holds it for its full duration,
/// file I/O included. That single critical section is what makes
/// `fetch_group` atomic with respect to concurrent produces.
pub struct Store {
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    data_dir: PathBuf,
    topics: BTreeMap<String, TopicLog>,
    offsets: OffsetStore,
}

impl Store {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| StorageError::write_failed(e, "create data directory"))?;

        Ok(Store {
            inner: Mutex::new(StoreInner {
                offsets: OffsetStore::new(&data_dir),
                topics: BTreeMap::new(),
                data_dir,
            }),
        })
    }

    /// Register a topic with a fixed partition count. Returns `false` if the
    /// name is empty, the partition count is out of `[1, 128]`, or the topic
    /// already exists in memory. Existing log files are opened append-only
    /// but not scanned.
    pub fn create_topic(&self, topic: &str, partitions: u32) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.offsets.ensure_loaded();
        inner.create_topic(topic, partitions)
    }

    /// Append one record, auto-creating the topic on first reference.
    /// Returns the selected partition and the record's offset.
    pub fn produce(&self, topic: &str, key: &str, value: &str) -> Result<(u32, u64), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.offsets.ensure_loaded();
        inner.produce(topic, key, value)
    }

    /// Read up to `limit` records from `(topic, partition)` starting at
    /// `offset`. An out-of-range partition yields an empty batch with
    /// `next_offset == offset`; an offset at or past the end yields an empty
    /// batch with `next_offset` equal to the end offset.
    pub fn fetch(
        &self,
        topic: &str,
        partition: u32,
        offset: u64,
        limit: usize,
    ) -> Result<FetchResult, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.offsets.ensure_loaded();
        inner.fetch(topic, partition, offset, limit)
    }

    /// Durably record a consumer group's next offset for `(topic, partition)`,
    /// clamped to the partition's end offset. Returns `false` on an empty
    /// group or topic name or an out-of-range partition.
    pub fn commit_offset(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        next_offset: u64,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.offsets.ensure_loaded();
        inner.commit_offset(group, topic, partition, next_offset)
    }

    pub fn get_committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.offsets.ensure_loaded();
        inner.get_committed_offset(group, topic, partition)
    }

    /// Committed-offset lookup, fetch, and optional commit in one critical
    /// section, so a concurrent produce cannot slip between the fetch and
    /// the commit.
    pub fn fetch_group(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        limit: usize,
        auto_commit: bool,
    ) -> Result<FetchGroupResult, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.offsets.ensure_loaded();
        inner.fetch_group(group, topic, partition, limit, auto_commit)
    }

    pub fn list_topics(&self) -> Vec<TopicSummary> {
        let mut inner = self.inner.lock().unwrap();
        inner.offsets.ensure_loaded();
        inner.list_topics()
    }

    pub fn group_stats(&self, group: &str) -> GroupStats {
        let mut inner = self.inner.lock().unwrap();
        inner.offsets.ensure_loaded();
        inner.group_stats(group)
    }
}

impl StoreInner {
    fn ensure_topic(&mut self, topic: &str) -> Result<&mut TopicLog, StorageError> {
        match self.topics.entry(topic.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let log = TopicLog::open(&self.data_dir, topic, DEFAULT_PARTITIONS)
                    .map_err(|e| StorageError::read_failed(e, &format!("load topic '{topic}'")))?;
                Ok(entry.insert(log))
            }
        }
    }

    fn create_topic(&mut self, topic: &str, partitions: u32) -> Result<bool, StorageError> {
        if topic.is_empty() || partitions < 1 || partitions > MAX_PARTITIONS {
            return Ok(false);
        }
        if self.topics.contains_key(topic) {
            return Ok(false);
        }

        let log = TopicLog::create(&self.data_dir, topic, partitions)
            .map_err(|e| StorageError::write_failed(e, &format!("create topic '{topic}'")))?;
        self.topics.insert(topic.to_string(), log);
        info!("created topic '{topic}' with {partitions} partitions");
        Ok(true)
    }

    fn produce(&mut self, topic: &str, key: &str, value: &str) -> Result<(u32, u64), StorageError> {
        let log = self.ensure_topic(topic)?;
        let partition = log.select_partition(key.as_bytes());
        let offset = log.append(partition, now_ms(), key.as_bytes(), value.as_bytes())?;
        Ok((partition, offset))
    }

    fn fetch(
        &mut self,
        topic: &str,
        partition: u32,
        offset: u64,
        limit: usize,
    ) -> Result<FetchResult, StorageError> {
        let log = self.ensure_topic(topic)?;
        if partition >= log.partition_count() {
            return Ok(FetchResult {
                records: Vec::new(),
                next_offset: offset,
            });
        }

        let limit = if limit == 0 {
            DEFAULT_FETCH_LIMIT
        } else {
            limit.min(MAX_FETCH_LIMIT)
        };
        log.read_batch(partition, offset, limit)
    }

    fn commit_offset(
        &mut self,
        group: &str,
        topic: &str,
        partition: u32,
        next_offset: u64,
    ) -> Result<bool, StorageError> {
        if group.is_empty() || topic.is_empty() {
            return Ok(false);
        }

        let log = self.ensure_topic(topic)?;
        let partition_count = log.partition_count();
        if partition >= partition_count {
            return Ok(false);
        }
        let end_offset = log.end_offset(partition);

        let clamped = next_offset.min(end_offset);
        self.offsets
            .commit(group, topic, partition, clamped, partition_count)?;
        debug!("committed {group}/{topic}/p{partition} at {clamped}");
        Ok(true)
    }

    fn get_committed_offset(
        &mut self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<u64, StorageError> {
        self.ensure_topic(topic)?;
        Ok(self.offsets.get(group, topic, partition))
    }

    fn fetch_group(
        &mut self,
        group: &str,
        topic: &str,
        partition: u32,
        limit: usize,
        auto_commit: bool,
    ) -> Result<FetchGroupResult, StorageError> {
        let start_offset = self.get_committed_offset(group, topic, partition)?;
        let batch = self.fetch(topic, partition, start_offset, limit)?;

        let (commit_ok, committed_offset_after) = if auto_commit {
            let ok = self.commit_offset(group, topic, partition, batch.next_offset)?;
            (ok, batch.next_offset)
        } else {
            (true, start_offset)
        };

        Ok(FetchGroupResult {
            start_offset,
            next_offset: batch.next_offset,
            auto_commit,
            commit_ok,
            committed_offset_after,
            records: batch.records,
        })
    }

    fn list_topics(&self) -> Vec<TopicSummary> {
        self.topics.values().map(TopicLog::summary).collect()
    }

    fn group_stats(&self, group: &str) -> GroupStats {
        let topics = self
            .topics
            .iter()
            .map(|(name, log)| {
                let partitions_stats = (0..log.partition_count())
                    .map(|partition| {
                        let end_offset = log.end_offset(partition);
                        let committed_offset =
                            self.offsets.get(group, name, partition).min(end_offset);
                        PartitionLag {
                            partition,
                            end_offset,
                            committed_offset,
                            lag: end_offset - committed_offset,
                        }
                    })
                    .collect();
                GroupTopicStats {
                    topic: name.clone(),
                    partitions: log.partition_count(),
                    partitions_stats,
                }
            })
            .collect();

        GroupStats {
            group: group.to_string(),
            topics,
        }
    }
}
