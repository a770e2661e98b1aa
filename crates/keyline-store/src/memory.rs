//! In-memory record store.
//!
//! [`InMemoryRecordStore`] keeps every record in its persisted encoding
//! behind a `RwLock`, so reads always return a fresh, independent record
//! and the placement-stripping of the persisted form is exercised exactly
//! as a durable backend would.

use std::collections::BTreeMap;

use keyline_codec::PersistedCodec;
use keyline_meta::{BucketRecord, KeyRecord};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{RecordStore, WritePrecondition};

/// One stored record: its encoded bytes plus the generation (keys) or
/// update id (buckets) checked by write preconditions.
#[derive(Clone, Debug)]
struct Stored {
    generation: u64,
    bytes: Vec<u8>,
}

/// An in-memory implementation of [`RecordStore`].
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    keys: RwLock<BTreeMap<String, Stored>>,
    buckets: RwLock<BTreeMap<String, Stored>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys across all buckets.
    pub fn key_count(&self) -> usize {
        self.keys.read().len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}

fn bucket_path(volume: &str, bucket: &str) -> String {
    format!("/{volume}/{bucket}")
}

fn key_path(volume: &str, bucket: &str, key: &str) -> String {
    format!("/{volume}/{bucket}/{key}")
}

fn check_precondition(
    name: &str,
    current: Option<&Stored>,
    precondition: WritePrecondition,
) -> StoreResult<()> {
    let actual = current.map(|s| s.generation);
    let expected = match precondition {
        WritePrecondition::Unconditional => return Ok(()),
        WritePrecondition::Absent if actual.is_none() => return Ok(()),
        WritePrecondition::Absent => None,
        WritePrecondition::Generation(g) if actual == Some(g) => return Ok(()),
        WritePrecondition::Generation(g) => Some(g),
    };
    debug!(name, ?expected, ?actual, "write precondition failed");
    Err(StoreError::ConcurrentModification {
        name: name.to_string(),
        expected,
        actual,
    })
}

impl RecordStore for InMemoryRecordStore {
    fn read_key(&self, volume: &str, bucket: &str, key: &str) -> StoreResult<Option<KeyRecord>> {
        let keys = self.keys.read();
        keys.get(&key_path(volume, bucket, key))
            .map(|s| PersistedCodec::decode_key(&s.bytes).map_err(StoreError::from))
            .transpose()
    }

    fn write_key(&self, key: &KeyRecord, precondition: WritePrecondition) -> StoreResult<()> {
        let path = key_path(key.volume(), key.bucket(), key.key_name());
        let bytes = PersistedCodec::encode_key(key)?;
        let mut keys = self.keys.write();
        check_precondition(&path, keys.get(&path), precondition)?;
        keys.insert(
            path,
            Stored {
                generation: key.generation(),
                bytes,
            },
        );
        Ok(())
    }

    fn delete_key(
        &self,
        volume: &str,
        bucket: &str,
        key: &str,
        precondition: WritePrecondition,
    ) -> StoreResult<Option<KeyRecord>> {
        let path = key_path(volume, bucket, key);
        let mut keys = self.keys.write();
        check_precondition(&path, keys.get(&path), precondition)?;
        let removed = keys.remove(&path);
        drop(keys);
        removed
            .map(|s| PersistedCodec::decode_key(&s.bytes).map_err(StoreError::from))
            .transpose()
    }

    fn list_keys(&self, volume: &str, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let base = format!("{}/", bucket_path(volume, bucket));
        let start = format!("{base}{prefix}");
        let keys = self.keys.read();
        Ok(keys
            .range(start.clone()..)
            .take_while(|(path, _)| path.starts_with(&start))
            .map(|(path, _)| path[base.len()..].to_string())
            .collect())
    }

    fn read_bucket(&self, volume: &str, bucket: &str) -> StoreResult<Option<BucketRecord>> {
        let buckets = self.buckets.read();
        buckets
            .get(&bucket_path(volume, bucket))
            .map(|s| PersistedCodec::decode_bucket(&s.bytes).map_err(StoreError::from))
            .transpose()
    }

    fn write_bucket(
        &self,
        bucket: &BucketRecord,
        precondition: WritePrecondition,
    ) -> StoreResult<()> {
        let path = bucket_path(bucket.volume(), bucket.bucket());
        let bytes = PersistedCodec::encode_bucket(bucket)?;
        let mut buckets = self.buckets.write();
        check_precondition(&path, buckets.get(&path), precondition)?;
        buckets.insert(
            path,
            Stored {
                generation: bucket.update_id(),
                bytes,
            },
        );
        Ok(())
    }

    fn create_bucket(&self, bucket: &BucketRecord) -> StoreResult<()> {
        let path = bucket_path(bucket.volume(), bucket.bucket());
        let bytes = PersistedCodec::encode_bucket(bucket)?;
        let mut buckets = self.buckets.write();
        if buckets.contains_key(&path) {
            return Err(StoreError::BucketAlreadyExists {
                volume: bucket.volume().to_string(),
                bucket: bucket.bucket().to_string(),
            });
        }
        buckets.insert(
            path,
            Stored {
                generation: bucket.update_id(),
                bytes,
            },
        );
        Ok(())
    }
}
