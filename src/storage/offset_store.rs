//! Durable consumer-group offsets.
//!
//! The full `group -> topic -> [next_offset per partition]` map lives in one
//! JSON sidecar next to the topic directories. It is loaded at most once per
//! process and rewritten whole, via temp file and atomic rename, on every
//! commit.

use crate::error::StorageError;
use log::{debug, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const OFFSETS_FILE_NAME: &str = "_offsets.json";

pub struct OffsetStore {
    path: PathBuf,
    committed: BTreeMap<String, BTreeMap<String, Vec<u64>>>,
    loaded: bool,
}

impl OffsetStore {
    pub fn new(data_dir: &Path) -> Self {
        OffsetStore {
            path: data_dir.join(OFFSETS_FILE_NAME),
            committed: BTreeMap::new(),
            loaded: false,
        }
    }

    /// Load the sidecar on first access. A missing or unparseable file leaves
    /// the map empty; malformed entries (non-object group, non-array topic,
    /// any non-unsigned element) cause that topic's vector to be skipped.
    pub fn ensure_loaded(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return,
        };
        let root: Value = match serde_json::from_str(&contents) {
            Ok(root) => root,
            Err(e) => {
                warn!("ignoring unparseable offsets file {}: {e}", self.path.display());
                return;
            }
        };
        let Value::Object(groups) = root else {
            warn!("ignoring offsets file {}: not a JSON object", self.path.display());
            return;
        };

        for (group, topics) in groups {
            let Value::Object(topics) = topics else {
                continue;
            };
            for (topic, offsets) in topics {
                let Value::Array(items) = offsets else {
                    continue;
                };
                let mut vec = Vec::with_capacity(items.len());
                for item in &items {
                    match item.as_u64() {
                        Some(offset) => vec.push(offset),
                        None => {
                            vec.clear();
                            break;
                        }
                    }
                }
                if !vec.is_empty() {
                    self.committed
                        .entry(group.clone())
                        .or_default()
                        .insert(topic, vec);
                }
            }
        }

        debug!(
            "loaded committed offsets for {} groups from {}",
            self.committed.len(),
            self.path.display()
        );
    }

    pub fn get(&self, group: &str, topic: &str, partition: u32) -> u64 {
        self.committed
            .get(group)
            .and_then(|topics| topics.get(topic))
            .and_then(|offsets| offsets.get(partition as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Record a committed offset and persist the whole map synchronously.
    /// The per-topic vector is zero-extended to the topic's partition count.
    pub fn commit(
        &mut self,
        group: &str,
        topic: &str,
        partition: u32,
        next_offset: u64,
        partition_count: u32,
    ) -> Result<(), StorageError> {
        let offsets = self
            .committed
            .entry(group.to_string())
            .or_default()
            .entry(topic.to_string())
            .or_default();
        if offsets.len() < partition_count as usize {
            offsets.resize(partition_count as usize, 0);
        }
        offsets[partition as usize] = next_offset;

        self.persist()
    }

    fn persist(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::write_failed(e, "create offsets directory"))?;
        }

        let json = serde_json::to_string_pretty(&self.committed)
            .map_err(|e| StorageError::from_serialization_error(e, "offsets sidecar"))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json)
            .map_err(|e| StorageError::write_failed(e, "write offsets temp file"))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            warn!(
                "rename {} -> {} failed ({e}), overwriting in place",
                tmp.display(),
                self.path.display()
            );
            fs::write(&self.path, &json)
                .map_err(|e| StorageError::write_failed(e, "overwrite offsets file"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> OffsetStore {
        let mut store = OffsetStore::new(dir);
        store.ensure_loaded();
        store
    }

    #[test]
    fn test_unknown_triple_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert_eq!(store.get("g", "t", 0), 0);
        assert_eq!(store.get("g", "t", 99), 0);
    }

    #[test]
    fn test_commit_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = store_in(dir.path());
        store.commit("workers", "events", 2, 7, 4).unwrap();

        let reloaded = store_in(dir.path());
        assert_eq!(reloaded.get("workers", "events", 2), 7);
        assert_eq!(reloaded.get("workers", "events", 0), 0);
        assert_eq!(reloaded.get("workers", "events", 3), 0);
    }

    #[test]
    fn test_commit_extends_vector_to_partition_count() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = store_in(dir.path());
        store.commit("g", "t", 0, 5, 3).unwrap();
        store.commit("g", "t", 2, 9, 3).unwrap();

        assert_eq!(store.get("g", "t", 0), 5);
        assert_eq!(store.get("g", "t", 1), 0);
        assert_eq!(store.get("g", "t", 2), 9);
    }

    #[test]
    fn test_sidecar_is_pretty_printed_object() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = store_in(dir.path());
        store.commit("g", "t", 0, 1, 1).unwrap();

        let contents = fs::read_to_string(dir.path().join(OFFSETS_FILE_NAME)).unwrap();
        assert!(contents.contains("\n  \"g\""));
        let parsed: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["g"]["t"], serde_json::json!([1]));
    }

    #[test]
    fn test_garbage_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(OFFSETS_FILE_NAME), "{not json").unwrap();

        let mut store = store_in(dir.path());
        assert_eq!(store.get("g", "t", 0), 0);

        // Commits after a bad load overwrite the file cleanly.
        store.commit("g", "t", 0, 3, 1).unwrap();
        let reloaded = store_in(dir.path());
        assert_eq!(reloaded.get("g", "t", 0), 3);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let contents = serde_json::json!({
            "good": { "t": [1, 2], "bad_array": [1, -2], "bad_type": "nope" },
            "bad_group": 42
        });
        fs::write(
            dir.path().join(OFFSETS_FILE_NAME),
            serde_json::to_string_pretty(&contents).unwrap(),
        )
        .unwrap();

        let store = store_in(dir.path());
        assert_eq!(store.get("good", "t", 1), 2);
        assert_eq!(store.get("good", "bad_array", 0), 0);
        assert_eq!(store.get("good", "bad_type", 0), 0);
        assert_eq!(store.get("bad_group", "t", 0), 0);
    }

    #[test]
    fn test_non_object_root_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(OFFSETS_FILE_NAME), "[1, 2, 3]").unwrap();

        let store = store_in(dir.path());
        assert_eq!(store.get("g", "t", 0), 0);
    }
}
