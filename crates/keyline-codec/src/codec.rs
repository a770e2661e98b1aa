use keyline_meta::{BucketRecord, KeyRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::frame::{frame, unframe, FormTag};
use crate::wire::{BucketRecordWire, KeyRecordWire, VersionGroupWire};

/// Codec for the form records are stored in.
///
/// Block placement is stripped on encode: pipelines change under the
/// replication layer and are re-resolved when a key is read.
pub struct PersistedCodec;

impl PersistedCodec {
    pub fn encode_key(key: &KeyRecord) -> CodecResult<Vec<u8>> {
        let versions = key
            .versions()
            .iter()
            .map(|g| VersionGroupWire::from_group(g, false))
            .collect();
        let wire = KeyRecordWire::from_record(key, versions);
        encode(FormTag::PersistedKey, &wire)
    }

    pub fn decode_key(data: &[u8]) -> CodecResult<KeyRecord> {
        let wire: KeyRecordWire = decode(FormTag::PersistedKey, data)?;
        wire.into_record()
    }

    pub fn encode_bucket(bucket: &BucketRecord) -> CodecResult<Vec<u8>> {
        encode(FormTag::PersistedBucket, &BucketRecordWire::from_record(bucket))
    }

    pub fn decode_bucket(data: &[u8]) -> CodecResult<BucketRecord> {
        let wire: BucketRecordWire = decode(FormTag::PersistedBucket, data)?;
        wire.into_record()
    }
}

/// Options for [`NetworkCodec::encode_key`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkKeyOptions {
    /// Send only the newest version group.
    pub latest_only: bool,
    /// Key name to send in place of the record's own, e.g. the full path
    /// of a key in a directory-tree bucket.
    pub full_key_name: Option<String>,
}

/// Codec for records sent to clients. Keeps block placement.
pub struct NetworkCodec;

impl NetworkCodec {
    pub fn encode_key(key: &KeyRecord, opts: &NetworkKeyOptions) -> CodecResult<Vec<u8>> {
        let history = key.versions();
        let latest_version = history.last().map_or(-1, |g| g.version() as i64);
        let groups = if opts.latest_only {
            &history[history.len().saturating_sub(1)..]
        } else {
            &history[..]
        };
        let versions = groups
            .iter()
            .map(|g| VersionGroupWire::from_group(g, true))
            .collect();

        let mut wire = KeyRecordWire::from_record(key, versions);
        wire.latest_version = Some(latest_version);
        if let Some(name) = &opts.full_key_name {
            wire.key_name = Some(name.clone());
        }
        encode(FormTag::NetworkKey, &wire)
    }

    pub fn decode_key(data: &[u8]) -> CodecResult<KeyRecord> {
        let wire: KeyRecordWire = decode(FormTag::NetworkKey, data)?;
        let tail = wire.versions.last().and_then(|g| g.version);
        let expected = tail.map_or(-1, |v| v as i64);
        match wire.latest_version {
            Some(latest) if latest != expected => {
                return Err(CodecError::MalformedRecord(format!(
                    "latest version {latest} does not match history tail {expected}"
                )));
            }
            None => return Err(CodecError::MalformedRecord("missing latest version".into())),
            _ => {}
        }
        wire.into_record()
    }

    pub fn encode_bucket(bucket: &BucketRecord) -> CodecResult<Vec<u8>> {
        encode(FormTag::NetworkBucket, &BucketRecordWire::from_record(bucket))
    }

    pub fn decode_bucket(data: &[u8]) -> CodecResult<BucketRecord> {
        let wire: BucketRecordWire = decode(FormTag::NetworkBucket, data)?;
        wire.into_record()
    }
}

fn encode<T: Serialize>(tag: FormTag, wire: &T) -> CodecResult<Vec<u8>> {
    let payload =
        bincode::serialize(wire).map_err(|e| CodecError::Serialization(e.to_string()))?;
    debug!(form = ?tag, size = payload.len(), "encoded record");
    frame(tag, &payload)
}

fn decode<T: DeserializeOwned>(tag: FormTag, data: &[u8]) -> CodecResult<T> {
    let (payload, consumed) = unframe(data, tag)?;
    if consumed != data.len() {
        return Err(CodecError::FramingError(format!(
            "{} trailing bytes after record",
            data.len() - consumed
        )));
    }
    bincode::deserialize(payload).map_err(|e| CodecError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyline_meta::{CommitOptions, KeyComparison};
    use keyline_types::{
        Acl, AclRights, BlockId, BlockLocation, BucketEncryptionKeyInfo, BucketLayout,
        CipherSuite, CrcType, EcCodec, EcConfig, FileChecksum, FileEncryptionInfo, Pipeline,
        PipelineId, ReplicationConfig, StorageType,
    };

    fn pipeline() -> Pipeline {
        Pipeline::new(
            PipelineId::random(),
            vec!["dn1:9858".into(), "dn2:9858".into(), "dn3:9858".into()],
        )
    }

    fn placed(container: u64, local: u64, length: u64) -> BlockLocation {
        BlockLocation::new(BlockId::new(container, local))
            .with_range(0, length)
            .with_pipeline(pipeline())
    }

    fn sample_key() -> KeyRecord {
        let key = KeyRecord::builder()
            .volume("vol1")
            .bucket("bucket1")
            .key_name("photos/2024/cat.jpg")
            .replication(ReplicationConfig::Ratis { factor: 3 })
            .creation_time(1_700_000_000_000)
            .owner("alice")
            .acl(Acl::user("alice", AclRights::ALL))
            .metadata("content-type", "image/jpeg")
            .tag("project", "pets")
            .object_id(1001)
            .parent_object_id(1000)
            .generation(7)
            .is_file(true)
            .checksum(FileChecksum::CompositeCrc {
                crc_type: CrcType::Crc32C,
                bytes_per_crc: 512,
                crc: 0x1234_5678,
            })
            .build()
            .unwrap();
        key.add_new_version(vec![placed(1, 1, 100)], false, true);
        key.add_new_version(vec![placed(1, 2, 100), placed(2, 3, 50)], false, true);
        key.set_data_size(150);
        key
    }

    fn sample_bucket() -> BucketRecord {
        BucketRecord::builder()
            .volume("vol1")
            .bucket("bucket1")
            .storage_type(StorageType::Ssd)
            .layout(BucketLayout::ObjectStore)
            .versioning(true)
            .quota_bytes(1 << 30)
            .used_bytes(4096)
            .used_namespace(3)
            .owner("alice")
            .acl(Acl::world(AclRights::READ))
            .default_replication(ReplicationConfig::ErasureCoded(EcConfig::new(
                EcCodec::Rs,
                6,
                3,
                1024 * 1024,
            )))
            .encryption_key(BucketEncryptionKeyInfo {
                key_name: "bek1".into(),
                suite: CipherSuite::AesCtrNoPadding,
            })
            .metadata("team", "media")
            .object_id(500)
            .update_id(12)
            .build()
            .unwrap()
    }

    #[test]
    fn persisted_key_roundtrip_strips_placement() {
        let key = sample_key();
        let decoded = PersistedCodec::decode_key(&PersistedCodec::encode_key(&key).unwrap()).unwrap();

        let stripped: Vec<_> = key.versions().iter().map(|g| g.without_pipelines()).collect();
        assert_eq!(decoded.versions(), stripped);
        assert!(decoded
            .visible_blocks(true)
            .iter()
            .all(|b| b.pipeline().is_none()));
        let cmp = KeyComparison {
            versions: false,
            ..KeyComparison::ALL
        };
        assert!(decoded.is_same(&key, cmp));
        assert_eq!(decoded.checksum(), key.checksum());
        assert!(decoded.is_file());
    }

    #[test]
    fn network_key_roundtrip_keeps_placement() {
        let key = sample_key();
        let bytes = NetworkCodec::encode_key(&key, &NetworkKeyOptions::default()).unwrap();
        let decoded = NetworkCodec::decode_key(&bytes).unwrap();
        assert_eq!(decoded, key);
        assert!(decoded
            .visible_blocks(true)
            .iter()
            .all(|b| b.pipeline().is_some()));
    }

    #[test]
    fn network_latest_only_projection() {
        let key = sample_key();
        let opts = NetworkKeyOptions {
            latest_only: true,
            ..Default::default()
        };
        let decoded = NetworkCodec::decode_key(&NetworkCodec::encode_key(&key, &opts).unwrap()).unwrap();
        let versions = decoded.versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version(), 1);
        assert_eq!(versions[0].len(), 2);
    }

    #[test]
    fn network_key_without_versions() {
        let key = KeyRecord::builder()
            .volume("v")
            .bucket("b")
            .key_name("empty")
            .replication(ReplicationConfig::default())
            .build()
            .unwrap();
        let opts = NetworkKeyOptions {
            latest_only: true,
            ..Default::default()
        };
        let decoded = NetworkCodec::decode_key(&NetworkCodec::encode_key(&key, &opts).unwrap()).unwrap();
        assert_eq!(decoded.version_count(), 0);
    }

    #[test]
    fn network_full_key_name_override() {
        let key = sample_key();
        let opts = NetworkKeyOptions {
            full_key_name: Some("mnt/photos/2024/cat.jpg".into()),
            ..Default::default()
        };
        let decoded = NetworkCodec::decode_key(&NetworkCodec::encode_key(&key, &opts).unwrap()).unwrap();
        assert_eq!(decoded.key_name(), "mnt/photos/2024/cat.jpg");
        assert_eq!(decoded.file_name(), "cat.jpg");
    }

    #[test]
    fn decode_derives_file_name() {
        let key = sample_key();
        assert_eq!(key.file_name(), "");
        let decoded = PersistedCodec::decode_key(&PersistedCodec::encode_key(&key).unwrap()).unwrap();
        assert_eq!(decoded.file_name(), "cat.jpg");
        assert_eq!(decoded.path(), "1000/cat.jpg");
    }

    #[test]
    fn optional_fields_keep_presence() {
        let absent = sample_key();
        let decoded = PersistedCodec::decode_key(&PersistedCodec::encode_key(&absent).unwrap()).unwrap();
        assert_eq!(decoded.expected_generation(), None);
        assert!(decoded.encryption_info().is_none());

        let mut zero = sample_key();
        zero.set_expected_generation(Some(0));
        zero.set_encryption_info(Some(FileEncryptionInfo {
            suite: CipherSuite::AesCtrNoPadding,
            edek: Vec::new(),
            iv: Vec::new(),
            key_name: String::new(),
            key_version_name: String::new(),
        }));
        let decoded = PersistedCodec::decode_key(&PersistedCodec::encode_key(&zero).unwrap()).unwrap();
        assert_eq!(decoded.expected_generation(), Some(0));
        assert_eq!(decoded.encryption_info(), zero.encryption_info());
    }

    #[test]
    fn ec_replication_roundtrip() {
        let ec = ReplicationConfig::ErasureCoded(EcConfig::new(EcCodec::Xor, 2, 1, 512 * 1024));
        let key = KeyRecord::builder()
            .volume("v")
            .bucket("b")
            .key_name("k")
            .replication(ec)
            .build()
            .unwrap();
        let decoded = PersistedCodec::decode_key(&PersistedCodec::encode_key(&key).unwrap()).unwrap();
        assert_eq!(decoded.replication(), ec);
    }

    #[test]
    fn committed_multipart_flag_survives() {
        let key = sample_key();
        key.commit_blocks(
            vec![placed(1, 2, 100)],
            CommitOptions {
                is_multipart: true,
                skip_block_id_check: false,
            },
        )
        .unwrap();
        let decoded = PersistedCodec::decode_key(&PersistedCodec::encode_key(&key).unwrap()).unwrap();
        assert!(decoded.latest_version_locations().unwrap().is_multipart());
    }

    #[test]
    fn bucket_roundtrip_both_forms() {
        let bucket = sample_bucket();
        let persisted =
            PersistedCodec::decode_bucket(&PersistedCodec::encode_bucket(&bucket).unwrap()).unwrap();
        assert_eq!(persisted, bucket);
        let network =
            NetworkCodec::decode_bucket(&NetworkCodec::encode_bucket(&bucket).unwrap()).unwrap();
        assert_eq!(network, bucket);
    }

    #[test]
    fn link_bucket_roundtrip() {
        let link = BucketRecord::builder()
            .volume("vol2")
            .bucket("alias")
            .storage_type(StorageType::Disk)
            .link_to("vol1", "bucket1")
            .build()
            .unwrap();
        let decoded =
            PersistedCodec::decode_bucket(&PersistedCodec::encode_bucket(&link).unwrap()).unwrap();
        assert!(decoded.is_link());
        assert_eq!(decoded.source_bucket(), Some("bucket1"));
    }

    #[test]
    fn forms_are_not_interchangeable() {
        let key = sample_key();
        let persisted = PersistedCodec::encode_key(&key).unwrap();
        assert!(matches!(
            NetworkCodec::decode_key(&persisted),
            Err(CodecError::WrongForm { .. })
        ));
        assert!(matches!(
            PersistedCodec::decode_bucket(&persisted),
            Err(CodecError::WrongForm { .. })
        ));
    }

    #[test]
    fn corrupted_record_is_rejected() {
        let mut bytes = PersistedCodec::encode_key(&sample_key()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x5a;
        assert!(matches!(
            PersistedCodec::decode_key(&bytes),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = PersistedCodec::encode_bucket(&sample_bucket()).unwrap();
        bytes.push(0);
        assert!(matches!(
            PersistedCodec::decode_bucket(&bytes),
            Err(CodecError::FramingError(_))
        ));
    }

    #[test]
    fn missing_required_key_field_is_malformed() {
        let mut wire = KeyRecordWire::from_record(&sample_key(), Vec::new());
        wire.volume = None;
        let bytes = encode(FormTag::PersistedKey, &wire).unwrap();
        assert!(matches!(
            PersistedCodec::decode_key(&bytes),
            Err(CodecError::MalformedRecord(_))
        ));
    }

    #[test]
    fn network_latest_version_must_match_history() {
        let mut wire = KeyRecordWire::from_record(&sample_key(), Vec::new());
        wire.latest_version = Some(4);
        let bytes = encode(FormTag::NetworkKey, &wire).unwrap();
        assert!(matches!(
            NetworkCodec::decode_key(&bytes),
            Err(CodecError::MalformedRecord(_))
        ));
    }

    #[test]
    fn garbage_payload_fails_deserialization() {
        let bytes = frame(FormTag::PersistedKey, &[0xff; 3]).unwrap();
        assert!(matches!(
            PersistedCodec::decode_key(&bytes),
            Err(CodecError::Deserialization(_))
        ));
    }
}
