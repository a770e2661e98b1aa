use std::path::Path;

use keyline_types::ReplicationConfig;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Settings for the commit coordinator and the in-memory allocator.
///
/// Missing fields take their defaults when loaded from TOML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeylineConfig {
    /// Size of each allocated block in bytes.
    pub block_size: u64,
    /// Blocks allocated up front when a key is opened without a size hint.
    pub preallocate_blocks: usize,
    /// Upper bound on blocks allocated when a key is opened. Larger size
    /// hints are served by later `allocate_block` calls.
    pub max_preallocate_blocks: usize,
    /// Replication used when neither the request nor the bucket names one,
    /// written as `ratis/3`, `standalone/1` or `rs-6-3-1024k`.
    #[serde(with = "replication_str")]
    pub default_replication: ReplicationConfig,
    /// Reject commits that would exceed a bucket quota.
    pub enforce_quota: bool,
    /// Permit commits that accept the reported block list verbatim.
    pub allow_skip_block_id_check: bool,
    /// Containers the in-memory allocator spreads blocks over.
    pub allocator_containers: u64,
    /// Attempts at applying a bucket usage update before giving up.
    pub bucket_update_retries: u32,
}

impl Default for KeylineConfig {
    fn default() -> Self {
        Self {
            block_size: 256 * 1024 * 1024,
            preallocate_blocks: 1,
            max_preallocate_blocks: 64,
            default_replication: ReplicationConfig::default(),
            enforce_quota: true,
            allow_skip_block_id_check: false,
            allocator_containers: 4,
            bucket_update_retries: 16,
        }
    }
}

impl KeylineConfig {
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: KeylineConfig =
            toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.block_size == 0 {
            return Err(StoreError::Config("block_size must be positive".into()));
        }
        if self.max_preallocate_blocks == 0 {
            return Err(StoreError::Config(
                "max_preallocate_blocks must be positive".into(),
            ));
        }
        if self.allocator_containers == 0 {
            return Err(StoreError::Config(
                "allocator_containers must be positive".into(),
            ));
        }
        if self.bucket_update_retries == 0 {
            return Err(StoreError::Config(
                "bucket_update_retries must be positive".into(),
            ));
        }
        self.default_replication
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))
    }
}

mod replication_str {
    use keyline_types::ReplicationConfig;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(r: &ReplicationConfig, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(r)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ReplicationConfig, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
