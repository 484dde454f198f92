//! Per-topic partition logs: append-only files plus in-memory offset indices.

use crate::error::StorageError;
use crate::storage::codec::{self, RECORD_HEADER_LEN};
use crate::{FetchResult, FetchedRecord, PartitionStats, TopicSummary};
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over raw bytes, used for keyed partition routing.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// One topic's partitioned log.
///
/// Each partition is backed by a single append-only file `p<N>.log` and an
/// index of byte positions, one entry per record. A record's offset is its
/// position in that index; `end_offset` equals the index length. File handles
/// are opened per operation and never cached.
pub struct TopicLog {
    name: String,
    partitions: u32,
    rr_counter: u64,
    log_paths: Vec<PathBuf>,
    index: Vec<Vec<u64>>,
}

impl TopicLog {
    /// Create the topic's directory and empty-or-existing log files without
    /// scanning them. Records already present in the files stay invisible
    /// until the topic is reloaded through `open` after a restart.
    pub fn create(data_dir: &Path, name: &str, partitions: u32) -> Result<Self, std::io::Error> {
        Self::init(data_dir, name, partitions)
    }

    /// Materialize a topic from disk, rebuilding every partition's index by
    /// scanning its log file.
    #[tracing::instrument(level = "info", skip_all, fields(topic = %name))]
    pub fn open(data_dir: &Path, name: &str, partitions: u32) -> Result<Self, std::io::Error> {
        let mut log = Self::init(data_dir, name, partitions)?;

        for partition in 0..log.partitions {
            let path = &log.log_paths[partition as usize];
            log.index[partition as usize] = rebuild_partition_index(path)?;
        }

        info!(
            "loaded topic '{}' ({} partitions, end offsets {:?})",
            log.name,
            log.partitions,
            log.index.iter().map(Vec::len).collect::<Vec<_>>()
        );
        Ok(log)
    }

    fn init(data_dir: &Path, name: &str, partitions: u32) -> Result<Self, std::io::Error> {
        let dir = data_dir.join(name);
        std::fs::create_dir_all(&dir)?;

        let mut log_paths = Vec::with_capacity(partitions as usize);
        for partition in 0..partitions {
            let path = dir.join(format!("p{partition}.log"));
            // Open in create+append mode so existing data is preserved.
            OpenOptions::new().create(true).append(true).open(&path)?;
            log_paths.push(path);
        }

        Ok(TopicLog {
            name: name.to_string(),
            partitions,
            rr_counter: 0,
            log_paths,
            index: vec![Vec::new(); partitions as usize],
        })
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions
    }

    pub fn end_offset(&self, partition: u32) -> u64 {
        self.index
            .get(partition as usize)
            .map(|positions| positions.len() as u64)
            .unwrap_or(0)
    }

    /// Pick the partition for a produce: FNV-1a of the key when present,
    /// round-robin otherwise.
    pub fn select_partition(&mut self, key: &[u8]) -> u32 {
        if key.is_empty() {
            let partition = (self.rr_counter % u64::from(self.partitions)) as u32;
            self.rr_counter += 1;
            partition
        } else {
            (fnv1a_64(key) % u64::from(self.partitions)) as u32
        }
    }

    /// Append one record and return its offset.
    ///
    /// The indexed byte position is the file size observed before the write;
    /// the index entry is recorded only once the write has succeeded, so a
    /// failed append leaves the index untouched.
    #[tracing::instrument(level = "debug", skip_all, fields(topic = %self.name, partition = %partition))]
    pub fn append(
        &mut self,
        partition: u32,
        ts_ms: u64,
        key: &[u8],
        value: &[u8],
    ) -> Result<u64, StorageError> {
        let path = &self.log_paths[partition as usize];
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                StorageError::write_failed(e, &format!("open {}/p{partition} for append", self.name))
            })?;

        let position = file
            .metadata()
            .map_err(|e| {
                StorageError::write_failed(e, &format!("stat {}/p{partition}", self.name))
            })?
            .len();

        let buf = codec::encode_record(ts_ms, key, value);
        file.write_all(&buf).map_err(|e| {
            StorageError::write_failed(e, &format!("append to {}/p{partition}", self.name))
        })?;

        let offset = self.index[partition as usize].len() as u64;
        self.index[partition as usize].push(position);

        debug!(
            "appended to {}/p{partition}: offset {offset} at byte {position}",
            self.name
        );
        Ok(offset)
    }

    /// Read up to `limit` records starting at `offset`.
    ///
    /// A short or invalid read truncates the batch without surfacing an
    /// error; `next_offset` is the first offset not returned.
    pub fn read_batch(
        &self,
        partition: u32,
        offset: u64,
        limit: usize,
    ) -> Result<FetchResult, StorageError> {
        let positions = &self.index[partition as usize];
        let end_offset = positions.len() as u64;
        if offset >= end_offset {
            return Ok(FetchResult {
                records: Vec::new(),
                next_offset: end_offset,
            });
        }

        let path = &self.log_paths[partition as usize];
        let mut file = File::open(path).map_err(|e| {
            StorageError::read_failed(e, &format!("open {}/p{partition} for read", self.name))
        })?;

        let stop = end_offset.min(offset + limit as u64);
        let mut records = Vec::with_capacity((stop - offset) as usize);
        let mut i = offset;
        while i < stop {
            if file
                .seek(SeekFrom::Start(positions[i as usize]))
                .is_err()
            {
                break;
            }
            match codec::read_record(&mut file) {
                Ok(record) => records.push(FetchedRecord {
                    partition,
                    offset: i,
                    ts_ms: record.ts_ms,
                    key: String::from_utf8_lossy(&record.key).into_owned(),
                    value: String::from_utf8_lossy(&record.value).into_owned(),
                }),
                Err(e) => {
                    warn!(
                        "stopping fetch on {}/p{partition} at offset {i}: {e}",
                        self.name
                    );
                    break;
                }
            }
            i += 1;
        }

        Ok(FetchResult {
            records,
            next_offset: i,
        })
    }

    pub fn summary(&self) -> TopicSummary {
        TopicSummary {
            topic: self.name.clone(),
            partitions: self.partitions,
            partition_stats: (0..self.partitions)
                .map(|partition| PartitionStats {
                    partition,
                    end_offset: self.end_offset(partition),
                })
                .collect(),
        }
    }
}

/// Scan one partition file sequentially, collecting the byte position of each
/// record. Stops at EOF, at a header whose declared lengths exceed the codec
/// limits, or at a record whose declared body runs past the end of the file;
/// everything from the first bad record onward is treated as absent.
fn rebuild_partition_index(path: &Path) -> Result<Vec<u64>, std::io::Error> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let mut positions = Vec::new();
    let mut pos = 0u64;
    while pos + RECORD_HEADER_LEN as u64 <= file_len {
        file.seek(SeekFrom::Start(pos))?;
        let header = match codec::read_header(&mut file) {
            Ok(header) => header,
            Err(_) => break,
        };
        if header.exceeds_limits() {
            warn!(
                "truncating index rebuild of {} at byte {pos}: declared lengths exceed limits",
                path.display()
            );
            break;
        }
        let total = header.total_len();
        if pos + total > file_len {
            debug!(
                "ignoring truncated trailing record in {} at byte {pos}",
                path.display()
            );
            break;
        }
        positions.push(pos);
        pos += total;
    }

    Ok(positions)
}
