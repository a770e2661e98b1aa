//! Bucket metadata records.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use keyline_types::{
    now_millis, Acl, BucketEncryptionKeyInfo, BucketLayout, ReplicationConfig, StorageType,
};
use tracing::debug;

use crate::acl::AclSet;
use crate::error::{MetaError, Result};

/// Quota value meaning "no limit".
pub const QUOTA_RESET: i64 = -1;

/// Metadata for one bucket: its policy, ACLs and usage counters.
///
/// A bucket may be a *link* to another bucket, in which case it carries the
/// source volume and bucket and holds no keys of its own.
pub struct BucketRecord {
    volume: String,
    bucket: String,
    acls: AclSet,
    versioning_enabled: bool,
    storage_type: StorageType,
    layout: BucketLayout,
    creation_time: u64,
    modification_time: AtomicU64,
    quota_bytes: i64,
    quota_namespace: i64,
    used_bytes: AtomicI64,
    used_namespace: AtomicI64,
    default_replication: Option<ReplicationConfig>,
    encryption_key: Option<BucketEncryptionKeyInfo>,
    owner: Option<String>,
    source_volume: Option<String>,
    source_bucket: Option<String>,
    metadata: BTreeMap<String, String>,
    object_id: u64,
    update_id: AtomicU64,
}

impl BucketRecord {
    pub fn builder() -> BucketRecordBuilder {
        BucketRecordBuilder::default()
    }

    pub fn to_builder(&self) -> BucketRecordBuilder {
        BucketRecordBuilder {
            volume: Some(self.volume.clone()),
            bucket: Some(self.bucket.clone()),
            acls: self.acls().to_vec(),
            versioning_enabled: self.versioning_enabled,
            storage_type: Some(self.storage_type),
            layout: self.layout,
            creation_time: Some(self.creation_time),
            modification_time: Some(self.modification_time()),
            quota_bytes: self.quota_bytes,
            quota_namespace: self.quota_namespace,
            used_bytes: self.used_bytes(),
            used_namespace: self.used_namespace(),
            default_replication: self.default_replication,
            encryption_key: self.encryption_key.clone(),
            owner: self.owner.clone(),
            source_volume: self.source_volume.clone(),
            source_bucket: self.source_bucket.clone(),
            metadata: self.metadata.clone(),
            object_id: self.object_id,
            update_id: self.update_id(),
        }
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn is_versioning_enabled(&self) -> bool {
        self.versioning_enabled
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub fn layout(&self) -> BucketLayout {
        self.layout
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

    pub fn default_replication(&self) -> Option<ReplicationConfig> {
        self.default_replication
    }

    pub fn encryption_key(&self) -> Option<&BucketEncryptionKeyInfo> {
        self.encryption_key.as_ref()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = Some(owner.into());
    }

    pub fn source_volume(&self) -> Option<&str> {
        self.source_volume.as_deref()
    }

    pub fn source_bucket(&self) -> Option<&str> {
        self.source_bucket.as_deref()
    }

    /// Returns `true` if this bucket is a link to another bucket.
    pub fn is_link(&self) -> bool {
        self.source_volume.is_some() && self.source_bucket.is_some()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    /// Id of the last transaction that modified this bucket.
    pub fn update_id(&self) -> u64 {
        self.update_id.load(Ordering::Acquire)
    }

    pub fn set_update_id(&self, id: u64) {
        self.update_id.fetch_max(id, Ordering::AcqRel);
    }

    // ---- Quota ----

    pub fn quota_bytes(&self) -> i64 {
        self.quota_bytes
    }

    pub fn quota_namespace(&self) -> i64 {
        self.quota_namespace
    }

    pub fn set_quota(&mut self, bytes: i64, namespace: i64) {
        self.quota_bytes = bytes;
        self.quota_namespace = namespace;
    }

    pub fn used_bytes(&self) -> i64 {
        self.used_bytes.load(Ordering::Acquire)
    }

    pub fn used_namespace(&self) -> i64 {
        self.used_namespace.load(Ordering::Acquire)
    }

    /// Adjust used bytes by a signed delta. Returns the new value.
    pub fn incr_used_bytes(&self, delta: i64) -> i64 {
        let now = self.used_bytes.fetch_add(delta, Ordering::AcqRel).wrapping_add(delta);
        debug!(bucket = %self.bucket, delta, used = now, "used bytes adjusted");
        now
    }

    /// Adjust the used object count by a signed delta. Returns the new value.
    pub fn incr_used_namespace(&self, delta: i64) -> i64 {
        let now = self.used_namespace.fetch_add(delta, Ordering::AcqRel).wrapping_add(delta);
        debug!(bucket = %self.bucket, delta, used = now, "used namespace adjusted");
        now
    }

    /// Fail if adding `delta` bytes would exceed the byte quota.
    pub fn check_quota_bytes(&self, delta: i64) -> Result<()> {
        check_quota(&self.bucket, "bytes", self.used_bytes(), delta, self.quota_bytes)
    }

    /// Fail if adding `delta` objects would exceed the namespace quota.
    pub fn check_quota_namespace(&self, delta: i64) -> Result<()> {
        check_quota(
            &self.bucket,
            "namespace",
            self.used_namespace(),
            delta,
            self.quota_namespace,
        )
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

    /// Audit fields in a stable order. Link source fields appear only for
    /// links.
    pub fn to_audit_map(&self) -> BTreeMap<String, String> {
        let mut audit = BTreeMap::new();
        audit.insert("volume".to_string(), self.volume.clone());
        audit.insert("bucket".to_string(), self.bucket.clone());
        audit.insert("isVersionEnabled".to_string(), self.versioning_enabled.to_string());
        audit.insert("storageType".to_string(), self.storage_type.to_string());
        audit.insert("creationTime".to_string(), self.creation_time.to_string());
        audit.insert("bucketLayout".to_string(), self.layout.to_string());
        audit.insert("quotaInBytes".to_string(), self.quota_bytes.to_string());
        audit.insert("quotaInNamespace".to_string(), self.quota_namespace.to_string());
        if let Some(owner) = &self.owner {
            audit.insert("owner".to_string(), owner.clone());
        }
        if let Some(key) = &self.encryption_key {
            audit.insert("bekName".to_string(), key.key_name.clone());
        }
        if let (Some(volume), Some(bucket)) = (&self.source_volume, &self.source_bucket) {
            audit.insert("sourceVolume".to_string(), volume.clone());
            audit.insert("sourceBucket".to_string(), bucket.clone());
        }
        audit
    }
}

fn check_quota(bucket: &str, kind: &'static str, used: i64, delta: i64, quota: i64) -> Result<()> {
    if quota == QUOTA_RESET || delta <= 0 {
        return Ok(());
    }
    if used.saturating_add(delta) > quota {
        return Err(MetaError::QuotaExceeded {
            bucket: bucket.to_string(),
            kind,
            used,
            requested: delta,
            quota,
        });
    }
    Ok(())
}

impl Clone for BucketRecord {
    fn clone(&self) -> Self {
        self.to_builder().assemble()
    }
}

impl PartialEq for BucketRecord {
    fn eq(&self, other: &Self) -> bool {
        self.volume == other.volume
            && self.bucket == other.bucket
            && self.acls == other.acls
            && self.versioning_enabled == other.versioning_enabled
            && self.storage_type == other.storage_type
            && self.layout == other.layout
            && self.creation_time == other.creation_time
            && self.modification_time() == other.modification_time()
            && self.quota_bytes == other.quota_bytes
            && self.quota_namespace == other.quota_namespace
            && self.used_bytes() == other.used_bytes()
            && self.used_namespace() == other.used_namespace()
            && self.default_replication == other.default_replication
            && self.encryption_key == other.encryption_key
            && self.owner == other.owner
            && self.source_volume == other.source_volume
            && self.source_bucket == other.source_bucket
            && self.metadata == other.metadata
            && self.object_id == other.object_id
            && self.update_id() == other.update_id()
    }
}

impl fmt::Debug for BucketRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketRecord")
            .field("volume", &self.volume)
            .field("bucket", &self.bucket)
            .field("versioning_enabled", &self.versioning_enabled)
            .field("storage_type", &self.storage_type)
            .field("layout", &self.layout)
            .field("used_bytes", &self.used_bytes())
            .field("quota_bytes", &self.quota_bytes)
            .field("used_namespace", &self.used_namespace())
            .field("quota_namespace", &self.quota_namespace)
            .field("is_link", &self.is_link())
            .finish_non_exhaustive()
    }
}

/// Accumulates the fields of a [`BucketRecord`].
///
/// Required: volume, bucket (non-empty) and storage type. Quotas default to
/// [`QUOTA_RESET`].
#[derive(Clone, Debug)]
pub struct BucketRecordBuilder {
    pub volume: Option<String>,
    pub bucket: Option<String>,
    pub acls: Vec<Acl>,
    pub versioning_enabled: bool,
    pub storage_type: Option<StorageType>,
    pub layout: BucketLayout,
    pub creation_time: Option<u64>,
    pub modification_time: Option<u64>,
    pub quota_bytes: i64,
    pub quota_namespace: i64,
    pub used_bytes: i64,
    pub used_namespace: i64,
    pub default_replication: Option<ReplicationConfig>,
    pub encryption_key: Option<BucketEncryptionKeyInfo>,
    pub owner: Option<String>,
    pub source_volume: Option<String>,
    pub source_bucket: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub object_id: u64,
    pub update_id: u64,
}

impl Default for BucketRecordBuilder {
    fn default() -> Self {
        Self {
            volume: None,
            bucket: None,
            acls: Vec::new(),
            versioning_enabled: false,
            storage_type: None,
            layout: BucketLayout::default(),
            creation_time: None,
            modification_time: None,
            quota_bytes: QUOTA_RESET,
            quota_namespace: QUOTA_RESET,
            used_bytes: 0,
            used_namespace: 0,
            default_replication: None,
            encryption_key: None,
            owner: None,
            source_volume: None,
            source_bucket: None,
            metadata: BTreeMap::new(),
            object_id: 0,
            update_id: 0,
        }
    }
}

impl BucketRecordBuilder {
    pub fn volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn acl(mut self, acl: Acl) -> Self {
        self.acls.push(acl);
        self
    }

    pub fn versioning(mut self, enabled: bool) -> Self {
        self.versioning_enabled = enabled;
        self
    }

    pub fn storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = Some(storage_type);
        self
    }

    pub fn layout(mut self, layout: BucketLayout) -> Self {
        self.layout = layout;
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

    pub fn quota_bytes(mut self, quota: i64) -> Self {
        self.quota_bytes = quota;
        self
    }

    pub fn quota_namespace(mut self, quota: i64) -> Self {
        self.quota_namespace = quota;
        self
    }

    pub fn used_bytes(mut self, used: i64) -> Self {
        self.used_bytes = used;
        self
    }

    pub fn used_namespace(mut self, used: i64) -> Self {
        self.used_namespace = used;
        self
    }

    pub fn default_replication(mut self, replication: ReplicationConfig) -> Self {
        self.default_replication = Some(replication);
        self
    }

    pub fn encryption_key(mut self, key: BucketEncryptionKeyInfo) -> Self {
        self.encryption_key = Some(key);
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Make the bucket a link to `volume/bucket`.
    pub fn link_to(mut self, volume: impl Into<String>, bucket: impl Into<String>) -> Self {
        self.source_volume = Some(volume.into());
        self.source_bucket = Some(bucket.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn object_id(mut self, id: u64) -> Self {
        self.object_id = id;
        self
    }

    pub fn update_id(mut self, id: u64) -> Self {
        self.update_id = id;
        self
    }

    pub fn build(self) -> Result<BucketRecord> {
        match self.volume.as_deref() {
            Some(v) if !v.is_empty() => {}
            _ => return Err(MetaError::malformed("missing or empty volume")),
        }
        match self.bucket.as_deref() {
            Some(b) if !b.is_empty() => {}
            _ => return Err(MetaError::malformed("missing or empty bucket")),
        }
        if self.storage_type.is_none() {
            return Err(MetaError::malformed("missing storage type"));
        }
        if let Some(replication) = &self.default_replication {
            replication
                .validate()
                .map_err(|e| MetaError::malformed(e.to_string()))?;
        }
        Ok(self.assemble())
    }

    fn assemble(self) -> BucketRecord {
        let creation_time = self.creation_time.unwrap_or_else(now_millis);
        BucketRecord {
            volume: self.volume.unwrap_or_default(),
            bucket: self.bucket.unwrap_or_default(),
            acls: AclSet::new(self.acls),
            versioning_enabled: self.versioning_enabled,
            storage_type: self.storage_type.unwrap_or_default(),
            layout: self.layout,
            creation_time,
            modification_time: AtomicU64::new(self.modification_time.unwrap_or(creation_time)),
            quota_bytes: self.quota_bytes,
            quota_namespace: self.quota_namespace,
            used_bytes: AtomicI64::new(self.used_bytes),
            used_namespace: AtomicI64::new(self.used_namespace),
            default_replication: self.default_replication,
            encryption_key: self.encryption_key,
            owner: self.owner,
            source_volume: self.source_volume,
            source_bucket: self.source_bucket,
            metadata: self.metadata,
            object_id: self.object_id,
            update_id: AtomicU64::new(self.update_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyline_types::AclRights;
    use std::thread;

    fn bucket() -> BucketRecord {
        BucketRecord::builder()
            .volume("vol1")
            .bucket("photos")
            .storage_type(StorageType::Disk)
            .creation_time(10)
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_storage_type() {
        let err = BucketRecord::builder()
            .volume("v")
            .bucket("b")
            .build()
            .unwrap_err();
        assert_eq!(err, MetaError::malformed("missing storage type"));
    }

    #[test]
    fn build_requires_names() {
        assert!(BucketRecord::builder()
            .bucket("b")
            .storage_type(StorageType::Ssd)
            .build()
            .is_err());
        assert!(BucketRecord::builder()
            .volume("v")
            .bucket("")
            .storage_type(StorageType::Ssd)
            .build()
            .is_err());
    }

    #[test]
    fn defaults() {
        let b = bucket();
        assert_eq!(b.quota_bytes(), QUOTA_RESET);
        assert_eq!(b.quota_namespace(), QUOTA_RESET);
        assert_eq!(b.used_bytes(), 0);
        assert!(!b.is_versioning_enabled());
        assert!(!b.is_link());
        assert_eq!(b.modification_time(), 10);
        assert_eq!(b.layout(), BucketLayout::Legacy);
    }

    #[test]
    fn link_requires_both_source_fields() {
        let link = BucketRecord::builder()
            .volume("vol2")
            .bucket("alias")
            .storage_type(StorageType::Disk)
            .link_to("vol1", "photos")
            .build()
            .unwrap();
        assert!(link.is_link());
        let audit = link.to_audit_map();
        assert_eq!(audit["sourceVolume"], "vol1");
        assert_eq!(audit["sourceBucket"], "photos");

        let mut half = BucketRecord::builder()
            .volume("vol2")
            .bucket("alias")
            .storage_type(StorageType::Disk);
        half.source_volume = Some("vol1".into());
        let half = half.build().unwrap();
        assert!(!half.is_link());
        assert!(!half.to_audit_map().contains_key("sourceVolume"));
    }

    #[test]
    fn counters_take_signed_deltas() {
        let b = bucket();
        assert_eq!(b.incr_used_bytes(300), 300);
        assert_eq!(b.incr_used_bytes(-100), 200);
        assert_eq!(b.incr_used_namespace(2), 2);
        assert_eq!(b.incr_used_namespace(-1), 1);
    }

    #[test]
    fn counter_overflow_wraps_like_the_stored_value() {
        let b = bucket();
        b.incr_used_bytes(i64::MAX);
        assert_eq!(b.incr_used_bytes(1), i64::MIN);
        assert_eq!(b.used_bytes(), i64::MIN);
        b.incr_used_namespace(i64::MIN);
        assert_eq!(b.incr_used_namespace(-1), i64::MAX);
        assert_eq!(b.used_namespace(), i64::MAX);
    }

    #[test]
    fn unlimited_quota_never_rejects() {
        let b = bucket();
        b.incr_used_bytes(i64::MAX / 2);
        assert!(b.check_quota_bytes(i64::MAX / 2).is_ok());
        assert!(b.check_quota_namespace(1_000_000).is_ok());
    }

    #[test]
    fn quota_exceeded() {
        let b = BucketRecord::builder()
            .volume("v")
            .bucket("b")
            .storage_type(StorageType::Disk)
            .quota_bytes(1_000)
            .quota_namespace(2)
            .build()
            .unwrap();
        b.incr_used_bytes(900);
        assert!(b.check_quota_bytes(100).is_ok());
        assert_eq!(
            b.check_quota_bytes(101).unwrap_err(),
            MetaError::QuotaExceeded {
                bucket: "b".into(),
                kind: "bytes",
                used: 900,
                requested: 101,
                quota: 1_000
            }
        );
        // Releasing space is always allowed.
        assert!(b.check_quota_bytes(-500).is_ok());

        b.incr_used_namespace(2);
        assert!(matches!(
            b.check_quota_namespace(1),
            Err(MetaError::QuotaExceeded { kind: "namespace", .. })
        ));
    }

    #[test]
    fn concurrent_counter_updates() {
        let b = Arc::new(bucket());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&b);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        b.incr_used_bytes(3);
                        b.incr_used_bytes(-1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(b.used_bytes(), 16_000);
    }

    #[test]
    fn clone_and_builder_roundtrip() {
        let b = bucket();
        b.add_acl(Acl::user("alice", AclRights::ALL));
        b.incr_used_bytes(42);
        let copy = b.clone();
        assert_eq!(copy, b);
        let rebuilt = b.to_builder().build().unwrap();
        assert_eq!(rebuilt, b);

        b.add_acl(Acl::world(AclRights::READ));
        assert_eq!(copy.acls().len(), 1);
    }

    #[test]
    fn update_id_only_moves_forward() {
        let b = bucket();
        b.set_update_id(5);
        b.set_update_id(3);
        assert_eq!(b.update_id(), 5);
    }

    #[test]
    fn audit_map_omits_link_fields_for_regular_bucket() {
        let mut b = bucket();
        b.set_owner("alice");
        let audit = b.to_audit_map();
        assert_eq!(audit["owner"], "alice");
        assert_eq!(audit["storageType"], "DISK");
        assert!(!audit.contains_key("sourceVolume"));
    }
}
