//! Wire structs.
//!
//! Every scalar field is an `Option` so that an absent field and a zero
//! value stay distinguishable across encode and decode. Conversion back into
//! records goes through the record builders, which enforce the required
//! fields.

use std::collections::BTreeMap;

use keyline_meta::{
    BucketRecord, BucketRecordBuilder, KeyRecord, KeyRecordBuilder, LocationVersionGroup,
};
use keyline_types::{
    Acl, BlockId, BlockLocation, BucketEncryptionKeyInfo, BucketLayout, FileChecksum,
    FileEncryptionInfo, Pipeline, ReplicationConfig, StorageType,
};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocationWire {
    pub container_id: Option<u64>,
    pub local_id: Option<u64>,
    pub offset: Option<u64>,
    pub length: Option<u64>,
    pub created_at_version: Option<u64>,
    pub pipeline: Option<Pipeline>,
}

impl BlockLocationWire {
    pub fn from_location(block: &BlockLocation, with_pipeline: bool) -> Self {
        Self {
            container_id: Some(block.container_id()),
            local_id: Some(block.local_id()),
            offset: Some(block.offset()),
            length: Some(block.length()),
            created_at_version: Some(block.created_at_version()),
            pipeline: if with_pipeline {
                block.pipeline().cloned()
            } else {
                None
            },
        }
    }

    pub fn into_location(self) -> CodecResult<BlockLocation> {
        let container_id = self.container_id.ok_or_else(|| missing("block container id"))?;
        let local_id = self.local_id.ok_or_else(|| missing("block local id"))?;
        let mut block = BlockLocation::new(BlockId::new(container_id, local_id))
            .with_range(self.offset.unwrap_or(0), self.length.unwrap_or(0))
            .with_created_at_version(self.created_at_version.unwrap_or(0));
        if let Some(pipeline) = self.pipeline {
            block = block.with_pipeline(pipeline);
        }
        Ok(block)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionGroupWire {
    pub version: Option<u64>,
    pub blocks: Vec<BlockLocationWire>,
    pub is_multipart: Option<bool>,
}

impl VersionGroupWire {
    pub fn from_group(group: &LocationVersionGroup, with_pipeline: bool) -> Self {
        Self {
            version: Some(group.version()),
            blocks: group
                .blocks()
                .iter()
                .map(|b| BlockLocationWire::from_location(b, with_pipeline))
                .collect(),
            is_multipart: Some(group.is_multipart()),
        }
    }

    pub fn into_group(self) -> CodecResult<LocationVersionGroup> {
        let version = self.version.ok_or_else(|| missing("version group number"))?;
        let blocks = self
            .blocks
            .into_iter()
            .map(BlockLocationWire::into_location)
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(LocationVersionGroup::with_multipart(
            version,
            blocks,
            self.is_multipart.unwrap_or(false),
        ))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecordWire {
    pub volume: Option<String>,
    pub bucket: Option<String>,
    pub key_name: Option<String>,
    pub data_size: Option<u64>,
    pub creation_time: Option<u64>,
    pub modification_time: Option<u64>,
    pub replication: Option<ReplicationConfig>,
    pub encryption: Option<FileEncryptionInfo>,
    pub checksum: Option<FileChecksum>,
    pub is_file: Option<bool>,
    pub owner: Option<String>,
    pub acls: Vec<Acl>,
    pub metadata: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub object_id: Option<u64>,
    pub parent_object_id: Option<u64>,
    pub generation: Option<u64>,
    pub expected_generation: Option<u64>,
    pub versions: Vec<VersionGroupWire>,
    /// Network form only: the newest version number, `-1` when the key has
    /// no versions.
    pub latest_version: Option<i64>,
}

impl KeyRecordWire {
    /// The record's fields with the given version groups.
    pub fn from_record(key: &KeyRecord, versions: Vec<VersionGroupWire>) -> Self {
        Self {
            volume: Some(key.volume().to_string()),
            bucket: Some(key.bucket().to_string()),
            key_name: Some(key.key_name().to_string()),
            data_size: Some(key.data_size()),
            creation_time: Some(key.creation_time()),
            modification_time: Some(key.modification_time()),
            replication: Some(key.replication()),
            encryption: key.encryption_info().cloned(),
            checksum: key.checksum().cloned(),
            is_file: Some(key.is_file()),
            owner: key.owner().map(str::to_string),
            acls: key.acls().to_vec(),
            metadata: key.metadata().clone(),
            tags: key.tags().clone(),
            object_id: Some(key.object_id()),
            parent_object_id: Some(key.parent_object_id()),
            generation: Some(key.generation()),
            expected_generation: key.expected_generation(),
            versions,
            latest_version: None,
        }
    }

    pub fn into_record(self) -> CodecResult<KeyRecord> {
        let versions = self
            .versions
            .into_iter()
            .map(VersionGroupWire::into_group)
            .collect::<CodecResult<Vec<_>>>()?;
        let file_name = self.key_name.as_deref().map(file_name_of);

        let builder = KeyRecordBuilder {
            volume: self.volume,
            bucket: self.bucket,
            key_name: self.key_name,
            file_name,
            owner: self.owner,
            data_size: self.data_size.unwrap_or(0),
            creation_time: self.creation_time,
            modification_time: self.modification_time,
            replication: self.replication,
            encryption: self.encryption,
            checksum: self.checksum,
            is_file: self.is_file.unwrap_or(false),
            acls: self.acls,
            metadata: self.metadata,
            tags: self.tags,
            object_id: self.object_id.unwrap_or(0),
            parent_object_id: self.parent_object_id.unwrap_or(0),
            generation: self.generation.unwrap_or(0),
            expected_generation: self.expected_generation,
            versions,
        };
        Ok(builder.build()?)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRecordWire {
    pub volume: Option<String>,
    pub bucket: Option<String>,
    pub acls: Vec<Acl>,
    pub versioning_enabled: Option<bool>,
    pub storage_type: Option<StorageType>,
    pub layout: Option<BucketLayout>,
    pub creation_time: Option<u64>,
    pub modification_time: Option<u64>,
    pub quota_bytes: Option<i64>,
    pub quota_namespace: Option<i64>,
    pub used_bytes: Option<i64>,
    pub used_namespace: Option<i64>,
    pub default_replication: Option<ReplicationConfig>,
    pub encryption_key: Option<BucketEncryptionKeyInfo>,
    pub owner: Option<String>,
    pub source_volume: Option<String>,
    pub source_bucket: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub object_id: Option<u64>,
    pub update_id: Option<u64>,
}

impl BucketRecordWire {
    pub fn from_record(bucket: &BucketRecord) -> Self {
        Self {
            volume: Some(bucket.volume().to_string()),
            bucket: Some(bucket.bucket().to_string()),
            acls: bucket.acls().to_vec(),
            versioning_enabled: Some(bucket.is_versioning_enabled()),
            storage_type: Some(bucket.storage_type()),
            layout: Some(bucket.layout()),
            creation_time: Some(bucket.creation_time()),
            modification_time: Some(bucket.modification_time()),
            quota_bytes: Some(bucket.quota_bytes()),
            quota_namespace: Some(bucket.quota_namespace()),
            used_bytes: Some(bucket.used_bytes()),
            used_namespace: Some(bucket.used_namespace()),
            default_replication: bucket.default_replication(),
            encryption_key: bucket.encryption_key().cloned(),
            owner: bucket.owner().map(str::to_string),
            source_volume: bucket.source_volume().map(str::to_string),
            source_bucket: bucket.source_bucket().map(str::to_string),
            metadata: bucket.metadata().clone(),
            object_id: Some(bucket.object_id()),
            update_id: Some(bucket.update_id()),
        }
    }

    pub fn into_record(self) -> CodecResult<BucketRecord> {
        let defaults = BucketRecordBuilder::default();
        let builder = BucketRecordBuilder {
            volume: self.volume,
            bucket: self.bucket,
            acls: self.acls,
            versioning_enabled: self.versioning_enabled.unwrap_or(false),
            storage_type: self.storage_type,
            layout: self.layout.unwrap_or_default(),
            creation_time: self.creation_time,
            modification_time: self.modification_time,
            quota_bytes: self.quota_bytes.unwrap_or(defaults.quota_bytes),
            quota_namespace: self.quota_namespace.unwrap_or(defaults.quota_namespace),
            used_bytes: self.used_bytes.unwrap_or(0),
            used_namespace: self.used_namespace.unwrap_or(0),
            default_replication: self.default_replication,
            encryption_key: self.encryption_key,
            owner: self.owner,
            source_volume: self.source_volume,
            source_bucket: self.source_bucket,
            metadata: self.metadata,
            object_id: self.object_id.unwrap_or(0),
            update_id: self.update_id.unwrap_or(0),
        };
        Ok(builder.build()?)
    }
}

/// Last `/`-separated component of a key name.
pub fn file_name_of(key_name: &str) -> String {
    key_name
        .rsplit(keyline_meta::key::KEY_PREFIX)
        .next()
        .unwrap_or(key_name)
        .to_string()
}

fn missing(field: &str) -> CodecError {
    CodecError::MalformedRecord(format!("missing {field}"))
}
