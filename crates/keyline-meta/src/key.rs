//! Key (object) metadata records.
//!
//! A [`KeyRecord`] owns the ordered version history of one object. The
//! history is guarded by a per-record mutex so multi-step edits (version
//! appends, commit reconciliation) never interleave on the same key, while
//! different keys never contend.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use keyline_types::{
    now_millis, Acl, BlockLocation, FileChecksum, FileEncryptionInfo, ReplicationConfig,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::acl::AclSet;
use crate::error::{MetaError, Result};
use crate::version::LocationVersionGroup;

/// Metadata entry present while a client holds the key open for hsync.
pub const HSYNC_CLIENT_ID: &str = "hsyncClientId";

/// Separator between path components of a key name.
pub const KEY_PREFIX: char = '/';

/// Metadata for one stored object.
pub struct KeyRecord {
    volume: String,
    bucket: String,
    key_name: String,
    file_name: String,
    owner: Option<String>,
    data_size: AtomicU64,
    creation_time: u64,
    modification_time: AtomicU64,
    replication: ReplicationConfig,
    encryption: Option<FileEncryptionInfo>,
    checksum: Option<FileChecksum>,
    is_file: bool,
    acls: AclSet,
    metadata: BTreeMap<String, String>,
    tags: BTreeMap<String, String>,
    object_id: u64,
    parent_object_id: u64,
    generation: AtomicU64,
    expected_generation: Option<u64>,
    versions: Mutex<Vec<LocationVersionGroup>>,
}

impl KeyRecord {
    pub fn builder() -> KeyRecordBuilder {
        KeyRecordBuilder::default()
    }

    /// A builder pre-filled with every field of this record.
    pub fn to_builder(&self) -> KeyRecordBuilder {
        KeyRecordBuilder {
            volume: Some(self.volume.clone()),
            bucket: Some(self.bucket.clone()),
            key_name: Some(self.key_name.clone()),
            file_name: Some(self.file_name.clone()),
            owner: self.owner.clone(),
            data_size: self.data_size(),
            creation_time: Some(self.creation_time),
            modification_time: Some(self.modification_time()),
            replication: Some(self.replication),
            encryption: self.encryption.clone(),
            checksum: self.checksum.clone(),
            is_file: self.is_file,
            acls: self.acls().to_vec(),
            metadata: self.metadata.clone(),
            tags: self.tags.clone(),
            object_id: self.object_id,
            parent_object_id: self.parent_object_id,
            generation: self.generation(),
            expected_generation: self.expected_generation,
            versions: self.versions(),
        }
    }

    // ---- Identity ----

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn set_key_name(&mut self, key_name: impl Into<String>) {
        self.key_name = key_name.into();
    }

    /// Last path component of the key, or empty when not tracked.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.file_name = file_name.into();
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    pub fn parent_object_id(&self) -> u64 {
        self.parent_object_id
    }

    /// Path used by directory-tree layouts: `{parent_object_id}/{file_name}`
    /// when a file name is tracked, otherwise the full key name.
    pub fn path(&self) -> String {
        if self.file_name.trim().is_empty() {
            return self.key_name.clone();
        }
        format!("{}{}{}", self.parent_object_id, KEY_PREFIX, self.file_name)
    }

    // ---- Size and time ----

    pub fn data_size(&self) -> u64 {
        self.data_size.load(Ordering::Acquire)
    }

    pub fn set_data_size(&self, size: u64) {
        self.data_size.store(size, Ordering::Release);
    }

    /// Bytes consumed on storage nodes under this key's replication.
    pub fn replicated_size(&self) -> u64 {
        self.replication.replicated_size(self.data_size())
    }

    pub fn creation_time(&self) -> u64 {
        self.creation_time
    }

    pub fn modification_time(&self) -> u64 {
        self.modification_time.load(Ordering::Acquire)
    }

    pub fn set_modification_time(&self, time: u64) {
        self.modification_time.store(time, Ordering::Release);
    }

    // ---- Descriptors ----

    pub fn replication(&self) -> ReplicationConfig {
        self.replication
    }

    pub fn set_replication(&mut self, replication: ReplicationConfig) {
        self.replication = replication;
    }

    pub fn encryption_info(&self) -> Option<&FileEncryptionInfo> {
        self.encryption.as_ref()
    }

    pub fn set_encryption_info(&mut self, info: Option<FileEncryptionInfo>) {
        self.encryption = info;
    }

    /// Drop encryption info ahead of a delete, so the wrapped key does not
    /// outlive the object in deleted-key bookkeeping.
    pub fn clear_encryption_info(&mut self) {
        self.encryption = None;
    }

    pub fn checksum(&self) -> Option<&FileChecksum> {
        self.checksum.as_ref()
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn set_file(&mut self, is_file: bool) {
        self.is_file = is_file;
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn remove_metadata(&mut self, key: &str) -> Option<String> {
        self.metadata.remove(key)
    }

    /// Returns `true` while a client holds the key open for hsync.
    pub fn is_hsync(&self) -> bool {
        self.metadata.contains_key(HSYNC_CLIENT_ID)
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn set_tags(&mut self, tags: BTreeMap<String, String>) {
        self.tags = tags;
    }

    // ---- Generation ----

    /// Optimistic-concurrency token; bumps on every committed mutation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Move the generation forward to `generation`.
    ///
    /// Equal values are accepted so a replayed transaction is harmless.
    pub fn advance_generation(&self, generation: u64) -> Result<()> {
        self.generation
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (generation >= current).then_some(generation)
            })
            .map(|_| ())
            .map_err(|current| MetaError::GenerationRegression {
                current,
                requested: generation,
            })
    }

    /// Generation the stored record must still have for a write of this
    /// record to succeed. Verified by the persistence layer.
    pub fn expected_generation(&self) -> Option<u64> {
        self.expected_generation
    }

    pub fn set_expected_generation(&mut self, generation: Option<u64>) {
        self.expected_generation = generation;
    }

    // ---- ACLs ----

    pub fn acls(&self) -> Arc<Vec<Acl>> {
        self.acls.snapshot()
    }

    pub fn add_acl(&self, acl: Acl) -> bool {
        self.acls.add(acl)
    }

    pub fn remove_acl(&self, acl: &Acl) -> bool {
        self.acls.remove(acl)
    }

    pub fn set_acls(&self, acls: Vec<Acl>) -> bool {
        self.acls.replace_all(acls)
    }

    // ---- Version history ----

    /// A copy of the full version history, oldest first.
    pub fn versions(&self) -> Vec<LocationVersionGroup> {
        self.versions.lock().clone()
    }

    pub fn version_count(&self) -> usize {
        self.versions.lock().len()
    }

    /// A copy of the newest version group.
    pub fn latest_version_locations(&self) -> Option<LocationVersionGroup> {
        self.versions.lock().last().cloned()
    }

    pub fn latest_version(&self) -> Option<u64> {
        self.versions.lock().last().map(LocationVersionGroup::version)
    }

    /// Blocks a reader should see.
    ///
    /// With bucket versioning enabled this is every version's blocks, oldest
    /// first; otherwise only the newest version's blocks.
    pub fn visible_blocks(&self, versioning_enabled: bool) -> Vec<BlockLocation> {
        let versions = self.versions.lock();
        if versioning_enabled {
            versions
                .iter()
                .flat_map(|g| g.blocks().iter().cloned())
                .collect()
        } else {
            versions
                .last()
                .map(|g| g.blocks().to_vec())
                .unwrap_or_default()
        }
    }

    /// Append blocks to the newest version without creating a new one.
    ///
    /// Used by streaming writers that persist incrementally and must not
    /// fragment the key into many tiny versions.
    pub fn append_new_blocks(
        &self,
        new_blocks: Vec<BlockLocation>,
        update_modification_time: bool,
    ) -> Result<()> {
        let mut versions = self.versions.lock();
        let latest = versions.last_mut().ok_or_else(|| MetaError::NoVersionExists {
            key: self.key_name.clone(),
        })?;
        let count = new_blocks.len();
        latest.append_new_blocks(new_blocks);
        debug!(key = %self.key_name, version = latest.version(), count, "appended blocks");
        drop(versions);

        if update_modification_time {
            self.set_modification_time(now_millis());
        }
        Ok(())
    }

    /// Record `new_blocks` as a new version and return its number.
    ///
    /// When `keep_old_versions` is `false` (bucket versioning disabled) the
    /// history is dropped first and the new blocks always become version 0.
    pub fn add_new_version(
        &self,
        new_blocks: Vec<BlockLocation>,
        update_modification_time: bool,
        keep_old_versions: bool,
    ) -> u64 {
        let mut versions = self.versions.lock();
        if !keep_old_versions {
            versions.clear();
        }

        let next = match versions.last() {
            Some(latest) => latest.generate_next_version(new_blocks),
            None => LocationVersionGroup::new(0, new_blocks),
        };
        let version = next.version();
        versions.push(next);
        debug!(key = %self.key_name, version, kept = versions.len(), "added version");
        drop(versions);

        if update_modification_time {
            self.set_modification_time(now_millis());
        }
        version
    }

    /// Run `f` with exclusive access to the version history.
    pub(crate) fn with_versions<T>(&self, f: impl FnOnce(&mut Vec<LocationVersionGroup>) -> T) -> T {
        let mut versions = self.versions.lock();
        f(&mut versions)
    }

    // ---- Comparison and audit ----

    /// Field-wise comparison. Identity, size, creation time, replication,
    /// metadata, tags, ACLs and object id are always compared; the rest
    /// according to `cmp`.
    pub fn is_same(&self, other: &KeyRecord, cmp: KeyComparison) -> bool {
        let mut same = self.data_size() == other.data_size()
            && self.creation_time == other.creation_time
            && self.volume == other.volume
            && self.bucket == other.bucket
            && self.replication == other.replication
            && self.metadata == other.metadata
            && self.acls == other.acls
            && self.tags == other.tags
            && self.object_id == other.object_id;

        if same && cmp.generation {
            same = self.generation() == other.generation();
        }
        if same && cmp.modification_time {
            same = self.modification_time() == other.modification_time();
        }
        if same && cmp.path {
            same = self.parent_object_id == other.parent_object_id
                && self.key_name == other.key_name;
        }
        if same && cmp.versions {
            same = self.versions() == other.versions();
        }
        if same && cmp.owner {
            same = self.owner == other.owner;
        }
        same
    }

    /// Audit fields in a stable order.
    pub fn to_audit_map(&self) -> BTreeMap<String, String> {
        let mut audit = BTreeMap::new();
        audit.insert("volume".to_string(), self.volume.clone());
        audit.insert("bucket".to_string(), self.bucket.clone());
        audit.insert("key".to_string(), self.key_name.clone());
        audit.insert("dataSize".to_string(), self.data_size().to_string());
        audit.insert("replicationConfig".to_string(), self.replication.to_string());
        audit.insert("objectID".to_string(), self.object_id.to_string());
        audit.insert("generation".to_string(), self.generation().to_string());
        if let Some(owner) = &self.owner {
            audit.insert("owner".to_string(), owner.clone());
        }
        audit
    }
}

/// Which optional fields [`KeyRecord::is_same`] compares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyComparison {
    pub path: bool,
    pub versions: bool,
    pub modification_time: bool,
    pub generation: bool,
    pub owner: bool,
}

impl KeyComparison {
    pub const ALL: KeyComparison = KeyComparison {
        path: true,
        versions: true,
        modification_time: true,
        generation: true,
        owner: true,
    };

    pub const CONTENT_ONLY: KeyComparison = KeyComparison {
        path: false,
        versions: false,
        modification_time: false,
        generation: false,
        owner: false,
    };
}

impl PartialEq for KeyRecord {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other, KeyComparison::ALL)
    }
}

/// A deep copy: the clone has its own lock, ACL set and version groups.
impl Clone for KeyRecord {
    fn clone(&self) -> Self {
        // Every field was valid on the source record.
        self.to_builder().assemble()
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("volume", &self.volume)
            .field("bucket", &self.bucket)
            .field("key", &self.key_name)
            .field("data_size", &self.data_size())
            .field("replication", &self.replication)
            .field("object_id", &self.object_id)
            .field("parent_object_id", &self.parent_object_id)
            .field("generation", &self.generation())
            .field("versions", &self.version_count())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KeyRecord{{volume='{}', bucket='{}', key='{}', dataSize='{}', objectID='{}', parentID='{}', replication='{}'}}",
            self.volume,
            self.bucket,
            self.key_name,
            self.data_size(),
            self.object_id,
            self.parent_object_id,
            self.replication
        )
    }
}

/// Accumulates the fields of a [`KeyRecord`]; [`build`](Self::build)
/// validates the required ones all at once.
///
/// Required: volume, bucket, key name (all non-empty) and a valid
/// replication descriptor.
#[derive(Clone, Debug, Default)]
pub struct KeyRecordBuilder {
    pub volume: Option<String>,
    pub bucket: Option<String>,
    pub key_name: Option<String>,
    pub file_name: Option<String>,
    pub owner: Option<String>,
    pub data_size: u64,
    pub creation_time: Option<u64>,
    pub modification_time: Option<u64>,
    pub replication: Option<ReplicationConfig>,
    pub encryption: Option<FileEncryptionInfo>,
    pub checksum: Option<FileChecksum>,
    pub is_file: bool,
    pub acls: Vec<Acl>,
    pub metadata: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub object_id: u64,
    pub parent_object_id: u64,
    pub generation: u64,
    pub expected_generation: Option<u64>,
    pub versions: Vec<LocationVersionGroup>,
}

impl KeyRecordBuilder {
    pub fn volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn data_size(mut self, size: u64) -> Self {
        self.data_size = size;
        self
    }

    pub fn creation_time(mut self, time: u64) -> Self {
        self.creation_time = Some(time);
        self
    }

    pub fn modification_time(mut self, time: u64) -> Self {
        self.modification_time = Some(time);
        self
    }

    pub fn replication(mut self, replication: ReplicationConfig) -> Self {
        self.replication = Some(replication);
        self
    }

    pub fn encryption(mut self, info: FileEncryptionInfo) -> Self {
        self.encryption = Some(info);
        self
    }

    pub fn checksum(mut self, checksum: FileChecksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn is_file(mut self, is_file: bool) -> Self {
        self.is_file = is_file;
        self
    }

    pub fn acl(mut self, acl: Acl) -> Self {
        self.acls.push(acl);
        self
    }

    pub fn acls(mut self, acls: impl IntoIterator<Item = Acl>) -> Self {
        self.acls.extend(acls);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn object_id(mut self, id: u64) -> Self {
        self.object_id = id;
        self
    }

    pub fn parent_object_id(mut self, id: u64) -> Self {
        self.parent_object_id = id;
        self
    }

    pub fn generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn expected_generation(mut self, generation: u64) -> Self {
        self.expected_generation = Some(generation);
        self
    }

    pub fn version_group(mut self, group: LocationVersionGroup) -> Self {
        self.versions.push(group);
        self
    }

    /// Validate required fields and produce the record.
    pub fn build(self) -> Result<KeyRecord> {
        require_non_empty("volume", self.volume.as_deref())?;
        require_non_empty("bucket", self.bucket.as_deref())?;
        require_non_empty("key name", self.key_name.as_deref())?;
        let replication = self
            .replication
            .ok_or_else(|| MetaError::malformed("missing replication config"))?;
        replication
            .validate()
            .map_err(|e| MetaError::malformed(e.to_string()))?;

        if let Some(pair) = self
            .versions
            .windows(2)
            .find(|w| w[1].version() <= w[0].version())
        {
            return Err(MetaError::malformed(format!(
                "version history not strictly increasing: {} then {}",
                pair[0].version(),
                pair[1].version()
            )));
        }

        Ok(self.assemble())
    }

    /// Construct without validation; callers guarantee the fields are valid.
    fn assemble(self) -> KeyRecord {
        let creation_time = self.creation_time.unwrap_or_else(now_millis);
        KeyRecord {
            volume: self.volume.unwrap_or_default(),
            bucket: self.bucket.unwrap_or_default(),
            key_name: self.key_name.unwrap_or_default(),
            file_name: self.file_name.unwrap_or_default(),
            owner: self.owner,
            data_size: AtomicU64::new(self.data_size),
            creation_time,
            modification_time: AtomicU64::new(self.modification_time.unwrap_or(creation_time)),
            replication: self.replication.unwrap_or_default(),
            encryption: self.encryption,
            checksum: self.checksum,
            is_file: self.is_file,
            acls: AclSet::new(self.acls),
            metadata: self.metadata,
            tags: self.tags,
            object_id: self.object_id,
            parent_object_id: self.parent_object_id,
            generation: AtomicU64::new(self.generation),
            expected_generation: self.expected_generation,
            versions: Mutex::new(self.versions),
        }
    }
}

fn require_non_empty(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if !v.is_empty() => Ok(()),
        Some(_) => Err(MetaError::malformed(format!("empty {field}"))),
        None => Err(MetaError::malformed(format!("missing {field}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyline_types::{AclRights, BlockId};
    use proptest::prelude::*;
    use std::thread;

    fn block(container: u64, local: u64) -> BlockLocation {
        BlockLocation::new(BlockId::new(container, local)).with_range(0, 100)
    }

    fn key() -> KeyRecord {
        KeyRecord::builder()
            .volume("vol1")
            .bucket("bucket1")
            .key_name("dir/file.txt")
            .replication(ReplicationConfig::Ratis { factor: 3 })
            .creation_time(1_000)
            .object_id(42)
            .parent_object_id(7)
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_identity() {
        let err = KeyRecord::builder()
            .bucket("b")
            .key_name("k")
            .replication(ReplicationConfig::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, MetaError::MalformedRecord { .. }));

        let err = KeyRecord::builder()
            .volume("v")
            .bucket("")
            .key_name("k")
            .replication(ReplicationConfig::default())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("empty bucket"));
    }

    #[test]
    fn build_requires_replication() {
        let err = KeyRecord::builder()
            .volume("v")
            .bucket("b")
            .key_name("k")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("replication"));

        let err = KeyRecord::builder()
            .volume("v")
            .bucket("b")
            .key_name("k")
            .replication(ReplicationConfig::Ratis { factor: 2 })
            .build()
            .unwrap_err();
        assert!(matches!(err, MetaError::MalformedRecord { .. }));
    }

    #[test]
    fn build_rejects_unordered_history() {
        let err = KeyRecord::builder()
            .volume("v")
            .bucket("b")
            .key_name("k")
            .replication(ReplicationConfig::default())
            .version_group(LocationVersionGroup::new(1, vec![]))
            .version_group(LocationVersionGroup::new(1, vec![]))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn modification_time_defaults_to_creation_time() {
        let k = key();
        assert_eq!(k.creation_time(), 1_000);
        assert_eq!(k.modification_time(), 1_000);
    }

    #[test]
    fn append_without_version_fails() {
        let k = key();
        let err = k.append_new_blocks(vec![block(1, 1)], false).unwrap_err();
        assert_eq!(
            err,
            MetaError::NoVersionExists {
                key: "dir/file.txt".into()
            }
        );
    }

    #[test]
    fn append_extends_latest_version() {
        let k = key();
        k.add_new_version(vec![block(1, 1)], false, true);
        k.append_new_blocks(vec![block(1, 2)], true).unwrap();
        let latest = k.latest_version_locations().unwrap();
        assert_eq!(latest.version(), 0);
        assert_eq!(latest.len(), 2);
        assert!(k.modification_time() > 1_000);
    }

    #[test]
    fn add_new_version_increments() {
        let k = key();
        assert_eq!(k.add_new_version(vec![block(1, 1)], false, true), 0);
        assert_eq!(k.add_new_version(vec![block(1, 2)], false, true), 1);
        assert_eq!(k.add_new_version(vec![block(1, 3)], false, true), 2);
        assert_eq!(k.version_count(), 3);
        assert_eq!(k.latest_version(), Some(2));
    }

    #[test]
    fn history_collapses_when_versioning_disabled() {
        let k = key();
        for i in 0..3 {
            k.add_new_version(vec![block(1, i)], false, true);
        }
        assert_eq!(k.version_count(), 3);

        let v = k.add_new_version(vec![block(2, 9)], true, false);
        assert_eq!(v, 0);
        let versions = k.versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version(), 0);
        assert_eq!(versions[0].blocks()[0].block_id(), BlockId::new(2, 9));
    }

    #[test]
    fn visible_blocks_follow_versioning() {
        let k = key();
        k.add_new_version(vec![block(1, 1)], false, true);
        k.add_new_version(vec![block(1, 2)], false, true);
        assert_eq!(k.visible_blocks(true).len(), 2);
        let latest_only = k.visible_blocks(false);
        assert_eq!(latest_only.len(), 1);
        assert_eq!(latest_only[0].block_id(), BlockId::new(1, 2));
    }

    #[test]
    fn path_uses_parent_and_file_name() {
        let mut k = key();
        assert_eq!(k.path(), "dir/file.txt");
        k.set_file_name("file.txt");
        assert_eq!(k.path(), "7/file.txt");
        k.set_file_name("   ");
        assert_eq!(k.path(), "dir/file.txt");
    }

    #[test]
    fn replicated_size_uses_replication() {
        let k = key();
        k.set_data_size(1_000);
        assert_eq!(k.replicated_size(), 3_000);
    }

    #[test]
    fn generation_never_regresses() {
        let k = key();
        k.advance_generation(5).unwrap();
        k.advance_generation(5).unwrap();
        assert_eq!(
            k.advance_generation(4).unwrap_err(),
            MetaError::GenerationRegression {
                current: 5,
                requested: 4
            }
        );
        assert_eq!(k.generation(), 5);
    }

    #[test]
    fn hsync_and_encryption_flags() {
        let mut k = key();
        assert!(!k.is_hsync());
        k.add_metadata(HSYNC_CLIENT_ID, "client-1");
        assert!(k.is_hsync());

        k.set_encryption_info(Some(FileEncryptionInfo {
            suite: Default::default(),
            edek: vec![1, 2, 3],
            iv: vec![4; 16],
            key_name: "bucket-key".into(),
            key_version_name: "bucket-key@0".into(),
        }));
        assert!(k.encryption_info().is_some());
        k.clear_encryption_info();
        assert!(k.encryption_info().is_none());
    }

    #[test]
    fn clone_is_deep() {
        let k = key();
        k.add_new_version(vec![block(1, 1)], false, true);
        k.add_acl(Acl::user("alice", AclRights::READ));
        let copy = k.clone();
        assert_eq!(copy, k);

        k.add_new_version(vec![block(1, 2)], false, true);
        k.add_acl(Acl::user("bob", AclRights::READ));
        assert_eq!(copy.version_count(), 1);
        assert_eq!(copy.acls().len(), 1);
        assert_ne!(copy, k);
    }

    #[test]
    fn is_same_respects_comparison_flags() {
        let a = key();
        let b = a.clone();
        b.set_modification_time(99_999);
        assert!(a.is_same(&b, KeyComparison::CONTENT_ONLY));
        assert!(!a.is_same(&b, KeyComparison::ALL));
    }

    #[test]
    fn audit_map_contents() {
        let audit = key().to_audit_map();
        assert_eq!(audit["volume"], "vol1");
        assert_eq!(audit["key"], "dir/file.txt");
        assert_eq!(audit["replicationConfig"], "ratis/3");
        assert!(!audit.contains_key("owner"));
    }

    #[test]
    fn concurrent_version_appends_are_serialized() {
        let k = Arc::new(key());
        k.add_new_version(vec![], false, true);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let k = Arc::clone(&k);
                thread::spawn(move || {
                    for i in 0..50 {
                        k.add_new_version(vec![block(t, i)], false, true);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let versions = k.versions();
        assert_eq!(versions.len(), 401);
        assert!(versions.windows(2).all(|w| w[1].version() == w[0].version() + 1));
    }

    proptest! {
        #[test]
        fn versions_increase_by_one(n in 1usize..40) {
            let k = key();
            let mut last = None;
            for i in 0..n {
                let v = k.add_new_version(vec![block(1, i as u64)], false, true);
                if let Some(prev) = last {
                    prop_assert_eq!(v, prev + 1);
                }
                last = Some(v);
            }
            prop_assert_eq!(k.version_count(), n);
        }

        #[test]
        fn collapse_always_yields_single_version_zero(n in 0usize..20) {
            let k = key();
            for i in 0..n {
                k.add_new_version(vec![block(1, i as u64)], false, true);
            }
            let v = k.add_new_version(vec![block(9, 9)], false, false);
            prop_assert_eq!(v, 0);
            prop_assert_eq!(k.version_count(), 1);
        }
    }
}
