//! Collaborator interfaces used by the commit coordinator.

use keyline_meta::{BucketRecord, KeyRecord};
use keyline_types::{BlockLocation, ReplicationConfig};

use crate::error::StoreResult;

/// Condition a write or delete places on the record currently stored under
/// the same name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WritePrecondition {
    #[default]
    Unconditional,
    /// Nothing may be stored under the name.
    Absent,
    /// A record must be stored with exactly this generation (keys) or
    /// update id (buckets).
    Generation(u64),
}

/// Durable storage for key and bucket records.
///
/// Every method is individually atomic. Implementations must be thread-safe
/// (`Send + Sync`). Records are returned as independent copies; mutating a
/// returned record never affects the stored one until it is written back.
pub trait RecordStore: Send + Sync {
    /// Read a key. Returns `Ok(None)` if it does not exist.
    fn read_key(&self, volume: &str, bucket: &str, key: &str) -> StoreResult<Option<KeyRecord>>;

    /// Create or replace a key.
    ///
    /// If `precondition` does not hold for the stored key the write fails
    /// with [`StoreError::ConcurrentModification`] and nothing is written.
    ///
    /// [`StoreError::ConcurrentModification`]: crate::StoreError::ConcurrentModification
    fn write_key(&self, key: &KeyRecord, precondition: WritePrecondition) -> StoreResult<()>;

    /// Remove a key, returning the removed record if it existed. A failed
    /// `precondition` removes nothing.
    fn delete_key(
        &self,
        volume: &str,
        bucket: &str,
        key: &str,
        precondition: WritePrecondition,
    ) -> StoreResult<Option<KeyRecord>>;

    /// List the names of keys in a bucket whose name starts with `prefix`,
    /// sorted.
    fn list_keys(&self, volume: &str, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;

    /// Read a bucket. Returns `Ok(None)` if it does not exist.
    fn read_bucket(&self, volume: &str, bucket: &str) -> StoreResult<Option<BucketRecord>>;

    /// Create or replace a bucket, with the same precondition semantics as
    /// [`write_key`](Self::write_key) applied to the bucket's update id.
    fn write_bucket(&self, bucket: &BucketRecord, precondition: WritePrecondition)
        -> StoreResult<()>;

    /// Create a bucket, failing with
    /// [`StoreError::BucketAlreadyExists`](crate::StoreError::BucketAlreadyExists)
    /// if one exists under the same name.
    fn create_bucket(&self, bucket: &BucketRecord) -> StoreResult<()>;
}

/// Source of new blocks and sink for blocks no longer referenced.
pub trait BlockAllocator: Send + Sync {
    /// Allocate `count` blocks of `block_size` bytes for `key_name`.
    ///
    /// A block identity is never handed out twice, not even after the block
    /// has been deleted.
    fn allocate_blocks(
        &self,
        key_name: &str,
        replication: ReplicationConfig,
        count: usize,
        block_size: u64,
    ) -> StoreResult<Vec<BlockLocation>>;

    /// Schedule blocks for deletion on the storage nodes.
    fn delete_blocks(&self, blocks: &[BlockLocation]) -> StoreResult<()>;
}
