//! The open → allocate → commit flow for keys.
//!
//! A writer opens a key and receives an [`OpenKeySession`] holding a private
//! copy of the key with a fresh, pre-allocated version. It may ask for more
//! blocks while writing, then commits the blocks it actually wrote. Commit
//! reconciles the report against the allocation, enforces the bucket quota,
//! and writes the key under a generation precondition so that of two writers
//! that opened the same key only the first to commit wins. Blocks that end
//! up unreferenced are handed back to the allocator.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use keyline_meta::{
    BucketRecord, BucketRecordBuilder, CommitOptions, KeyRecord, Reconciliation,
};
use keyline_types::{now_millis, Acl, BlockLocation, ReplicationConfig};
use tracing::{debug, info, warn};

use crate::config::KeylineConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockAllocator, RecordStore, WritePrecondition};

/// Parameters for [`CommitCoordinator::open_key`].
#[derive(Clone, Debug, Default)]
pub struct OpenKeyRequest {
    pub volume: String,
    pub bucket: String,
    pub key: String,
    /// Expected object size; sizes the initial allocation when non-zero.
    pub size_hint: u64,
    /// Overrides the bucket's default replication.
    pub replication: Option<ReplicationConfig>,
    pub owner: Option<String>,
    pub acls: Vec<Acl>,
    pub metadata: BTreeMap<String, String>,
}

impl OpenKeyRequest {
    pub fn new(volume: impl Into<String>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }
}

/// An open key being written.
#[derive(Debug)]
pub struct OpenKeySession {
    id: u64,
    key: KeyRecord,
    version: u64,
    versioning: bool,
    previous: Option<KeyRecord>,
}

impl OpenKeySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The session's private copy of the key.
    pub fn key(&self) -> &KeyRecord {
        &self.key
    }

    /// Version being written.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Blocks allocated to this session so far.
    pub fn allocated_blocks(&self) -> Vec<BlockLocation> {
        self.key
            .latest_version_locations()
            .map(|g| g.into_blocks())
            .unwrap_or_default()
    }
}

/// Result of a successful commit.
#[derive(Debug)]
pub struct CommittedKey {
    pub key: KeyRecord,
    pub reconciliation: Reconciliation,
    /// Blocks handed to the allocator for deletion.
    pub released_blocks: Vec<BlockLocation>,
}

/// Drives key writes against a [`RecordStore`] and a [`BlockAllocator`].
pub struct CommitCoordinator<S: RecordStore, A: BlockAllocator> {
    store: Arc<S>,
    allocator: Arc<A>,
    config: KeylineConfig,
    next_session: AtomicU64,
    next_object_id: AtomicU64,
    next_generation: AtomicU64,
}

impl<S: RecordStore, A: BlockAllocator> CommitCoordinator<S, A> {
    pub fn new(store: Arc<S>, allocator: Arc<A>, config: KeylineConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            allocator,
            config,
            next_session: AtomicU64::new(1),
            next_object_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn allocator(&self) -> &Arc<A> {
        &self.allocator
    }

    pub fn config(&self) -> &KeylineConfig {
        &self.config
    }

    /// Create a bucket. The object id, timestamps and update id are assigned
    /// here; a caller-supplied link target is kept as is.
    pub fn create_bucket(&self, builder: BucketRecordBuilder) -> StoreResult<BucketRecord> {
        let now = now_millis();
        let bucket = BucketRecordBuilder {
            object_id: self.next_object_id.fetch_add(1, Ordering::Relaxed),
            update_id: self.next_generation.fetch_add(1, Ordering::Relaxed),
            creation_time: Some(now),
            modification_time: Some(now),
            ..builder
        }
        .build()?;
        self.store.create_bucket(&bucket)?;
        info!(
            volume = bucket.volume(),
            bucket = bucket.bucket(),
            versioning = bucket.is_versioning_enabled(),
            link = bucket.is_link(),
            "created bucket"
        );
        Ok(bucket)
    }

    /// Open a key for writing and pre-allocate its first blocks.
    ///
    /// If the key exists the session starts from a copy of it: with bucket
    /// versioning the new version is appended to its history, otherwise the
    /// history is replaced. The commit will only succeed if the stored key
    /// still has the generation seen here.
    pub fn open_key(&self, request: OpenKeyRequest) -> StoreResult<OpenKeySession> {
        let bucket = self.resolve_bucket(&request.volume, &request.bucket)?;
        let versioning = bucket.is_versioning_enabled();
        let replication = request
            .replication
            .or(bucket.default_replication())
            .unwrap_or(self.config.default_replication);

        let previous = self
            .store
            .read_key(bucket.volume(), bucket.bucket(), &request.key)?;
        let mut key = match &previous {
            Some(existing) => {
                let mut key = existing.clone();
                key.set_replication(replication);
                key.set_expected_generation(Some(existing.generation()));
                for acl in request.acls {
                    key.add_acl(acl);
                }
                key
            }
            None => {
                let mut builder = KeyRecord::builder()
                    .volume(bucket.volume())
                    .bucket(bucket.bucket())
                    .key_name(request.key.as_str())
                    .replication(replication)
                    .is_file(true)
                    .object_id(self.next_object_id.fetch_add(1, Ordering::Relaxed))
                    .parent_object_id(bucket.object_id())
                    .acls(request.acls)
                    .acls(bucket.acls().iter().cloned());
                if let Some(owner) = request.owner {
                    builder = builder.owner(owner);
                }
                builder.build()?
            }
        };
        for (k, v) in request.metadata {
            key.add_metadata(k, v);
        }

        let wanted = if request.size_hint == 0 {
            self.config.preallocate_blocks
        } else {
            usize::try_from(request.size_hint.div_ceil(self.config.block_size))
                .unwrap_or(usize::MAX)
        };
        let count = wanted.min(self.config.max_preallocate_blocks);
        let blocks =
            self.allocator
                .allocate_blocks(&request.key, replication, count, self.config.block_size)?;
        let version = key.add_new_version(blocks, true, versioning);

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        debug!(
            session = id,
            key = %request.key,
            version,
            versioning,
            overwrite = previous.is_some(),
            "opened key"
        );
        Ok(OpenKeySession {
            id,
            key,
            version,
            versioning,
            previous,
        })
    }

    /// Allocate one more block to the session's version.
    pub fn allocate_block(&self, session: &mut OpenKeySession) -> StoreResult<BlockLocation> {
        let mut blocks = self.allocator.allocate_blocks(
            session.key.key_name(),
            session.key.replication(),
            1,
            self.config.block_size,
        )?;
        let block = blocks.pop().ok_or_else(|| {
            StoreError::Config("allocator returned no block".into())
        })?;
        session.key.append_new_blocks(vec![block.clone()], true)?;
        Ok(block)
    }

    /// Commit the blocks a writer actually wrote.
    ///
    /// A commit that fails leaves the store as it was: either the key write
    /// was rejected, or it is undone when the bucket usage update fails.
    pub fn commit_key(
        &self,
        session: OpenKeySession,
        reported: Vec<BlockLocation>,
        data_size: u64,
    ) -> StoreResult<CommittedKey> {
        self.commit_key_with(session, reported, data_size, CommitOptions::default())
    }

    /// [`commit_key`](Self::commit_key) with explicit reconciliation options.
    pub fn commit_key_with(
        &self,
        session: OpenKeySession,
        reported: Vec<BlockLocation>,
        data_size: u64,
        opts: CommitOptions,
    ) -> StoreResult<CommittedKey> {
        if opts.skip_block_id_check && !self.config.allow_skip_block_id_check {
            return Err(StoreError::Config(
                "committing without block id check is disabled".into(),
            ));
        }
        let allocated = session.allocated_blocks();
        let OpenKeySession {
            id,
            mut key,
            versioning,
            previous,
            ..
        } = session;

        let reconciliation = key.commit_blocks(reported, opts)?;
        key.set_data_size(data_size);
        key.set_modification_time(now_millis());

        // Allocated blocks the committed version does not reference. A
        // verbatim commit reports none of them as uncommitted.
        let mut unreferenced = reconciliation.uncommitted.clone();
        if opts.skip_block_id_check {
            let kept: HashSet<_> = reconciliation
                .committed
                .iter()
                .map(BlockLocation::block_id)
                .collect();
            unreferenced.extend(
                allocated
                    .into_iter()
                    .filter(|b| !kept.contains(&b.block_id())),
            );
        }

        // Usage is charged per committed version; an overwrite without
        // versioning frees everything the previous record held.
        let replaced = match (&previous, versioning) {
            (Some(old), false) => old.visible_blocks(true),
            _ => Vec::new(),
        };
        let bytes_delta = charged_bytes(&key, &reconciliation.committed)
            - charged_bytes(previous.as_ref().unwrap_or(&key), &replaced);
        let namespace_delta = if previous.is_some() { 0 } else { 1 };

        let mut orphaned = reconciliation.committed.clone();
        orphaned.extend(unreferenced.iter().cloned());

        if let Err(err) = self.write_committed(&mut key, bytes_delta, namespace_delta) {
            warn!(session = id, key = key.key_name(), error = %err, "commit rejected");
            self.allocator.delete_blocks(&orphaned)?;
            return Err(err);
        }
        if let Err(err) =
            self.update_bucket_usage(key.volume(), key.bucket(), bytes_delta, namespace_delta)
        {
            warn!(
                session = id,
                key = key.key_name(),
                error = %err,
                "bucket usage update failed, rolling back key"
            );
            match self.roll_back(&key, previous.as_ref()) {
                Ok(()) => self.allocator.delete_blocks(&orphaned)?,
                Err(rollback) => {
                    // The written key may still reference its committed blocks.
                    warn!(session = id, key = key.key_name(), error = %rollback, "rollback failed");
                    self.allocator.delete_blocks(&unreferenced)?;
                }
            }
            return Err(err);
        }

        let mut released = unreferenced;
        released.extend(replaced);
        self.allocator.delete_blocks(&released)?;

        info!(
            session = id,
            volume = key.volume(),
            bucket = key.bucket(),
            key = key.key_name(),
            version = reconciliation.version,
            generation = key.generation(),
            size = data_size,
            "committed key"
        );
        Ok(CommittedKey {
            key,
            reconciliation,
            released_blocks: released,
        })
    }

    /// Delete a key, release its quota and all of its blocks.
    pub fn delete_key(&self, volume: &str, bucket: &str, key: &str) -> StoreResult<KeyRecord> {
        let resolved = self.resolve_bucket(volume, bucket)?;
        let mut record = self
            .store
            .delete_key(
                resolved.volume(),
                resolved.bucket(),
                key,
                WritePrecondition::Unconditional,
            )?
            .ok_or_else(|| StoreError::KeyNotFound {
                volume: volume.to_string(),
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        record.clear_encryption_info();

        let blocks = record.visible_blocks(true);
        let bytes_delta = -charged_bytes(&record, &blocks);
        self.update_bucket_usage(resolved.volume(), resolved.bucket(), bytes_delta, -1)?;
        self.allocator.delete_blocks(&blocks)?;

        info!(volume, bucket, key, blocks = blocks.len(), "deleted key");
        Ok(record)
    }

    /// Read a bucket, following one level of link.
    pub fn resolve_bucket(&self, volume: &str, bucket: &str) -> StoreResult<BucketRecord> {
        let record = self
            .store
            .read_bucket(volume, bucket)?
            .ok_or_else(|| StoreError::BucketNotFound {
                volume: volume.to_string(),
                bucket: bucket.to_string(),
            })?;
        let (Some(src_volume), Some(src_bucket)) = (record.source_volume(), record.source_bucket())
        else {
            return Ok(record);
        };

        let source = self
            .store
            .read_bucket(src_volume, src_bucket)?
            .ok_or_else(|| StoreError::BucketNotFound {
                volume: src_volume.to_string(),
                bucket: src_bucket.to_string(),
            })?;
        if source.is_link() {
            return Err(StoreError::UnresolvedLink {
                volume: volume.to_string(),
                bucket: bucket.to_string(),
            });
        }
        debug!(volume, bucket, src_volume, src_bucket, "resolved bucket link");
        Ok(source)
    }

    /// Quota check, then the conditional key write.
    fn write_committed(
        &self,
        key: &mut KeyRecord,
        bytes_delta: i64,
        namespace_delta: i64,
    ) -> StoreResult<()> {
        if self.config.enforce_quota {
            let bucket = self.resolve_bucket(key.volume(), key.bucket())?;
            bucket.check_quota_bytes(bytes_delta)?;
            bucket.check_quota_namespace(namespace_delta)?;
        }

        // A key opened without a stored record must still be absent.
        let precondition = match key.expected_generation() {
            Some(generation) => WritePrecondition::Generation(generation),
            None => WritePrecondition::Absent,
        };
        let generation = self.next_generation(key.generation());
        key.advance_generation(generation)?;
        key.set_expected_generation(None);
        self.store.write_key(key, precondition)
    }

    /// Restore the record a commit replaced, provided nothing has been
    /// written over the committed key since.
    fn roll_back(&self, key: &KeyRecord, previous: Option<&KeyRecord>) -> StoreResult<()> {
        let precondition = WritePrecondition::Generation(key.generation());
        match previous {
            Some(old) => self.store.write_key(old, precondition),
            None => self
                .store
                .delete_key(key.volume(), key.bucket(), key.key_name(), precondition)
                .map(|_| ()),
        }
    }

    /// Apply usage deltas with an optimistic retry loop on the bucket's
    /// update id.
    fn update_bucket_usage(
        &self,
        volume: &str,
        bucket: &str,
        bytes_delta: i64,
        namespace_delta: i64,
    ) -> StoreResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let record = self.resolve_bucket(volume, bucket)?;
            let expected = record.update_id();
            record.incr_used_bytes(bytes_delta);
            record.incr_used_namespace(namespace_delta);
            record.set_update_id(self.next_generation(expected));
            record.set_modification_time(now_millis());

            match self
                .store
                .write_bucket(&record, WritePrecondition::Generation(expected))
            {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < self.config.bucket_update_retries => {
                    debug!(volume, bucket, attempt, "bucket usage update raced, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// A transaction id strictly above `current`.
    fn next_generation(&self, current: u64) -> u64 {
        let candidate = self.next_generation.fetch_add(1, Ordering::AcqRel);
        let generation = candidate.max(current + 1);
        self.next_generation.fetch_max(generation + 1, Ordering::AcqRel);
        generation
    }
}

/// Replicated bytes charged to the bucket for `blocks` of `key`.
fn charged_bytes(key: &KeyRecord, blocks: &[BlockLocation]) -> i64 {
    let raw: u64 = blocks.iter().map(BlockLocation::length).sum();
    i64::try_from(key.replication().replicated_size(raw)).unwrap_or(i64::MAX)
}
