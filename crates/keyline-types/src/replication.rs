//! Replication descriptors and the replicated-size rule used for quota.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Erasure-coding codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcCodec {
    Rs,
    Xor,
}

impl fmt::Display for EcCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcCodec::Rs => write!(f, "rs"),
            EcCodec::Xor => write!(f, "xor"),
        }
    }
}

/// An erasure-coding scheme: `data` data chunks plus `parity` parity chunks
/// per stripe, each `chunk_size` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcConfig {
    pub codec: EcCodec,
    pub data: u32,
    pub parity: u32,
    pub chunk_size: u32,
}

impl EcConfig {
    pub fn new(codec: EcCodec, data: u32, parity: u32, chunk_size: u32) -> Self {
        Self {
            codec,
            data,
            parity,
            chunk_size,
        }
    }

    /// Bytes of user data in one full stripe.
    pub fn stripe_size(&self) -> u64 {
        u64::from(self.data) * u64::from(self.chunk_size)
    }
}

/// Chunk sizes are written in KiB with a `k` suffix when they are a whole
/// number of KiB, otherwise in bytes.
impl fmt::Display for EcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-", self.codec, self.data, self.parity)?;
        if self.chunk_size % 1024 == 0 {
            write!(f, "{}k", self.chunk_size / 1024)
        } else {
            write!(f, "{}", self.chunk_size)
        }
    }
}

/// How a key's blocks are replicated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicationConfig {
    /// Consensus-replicated, `factor` full copies.
    Ratis { factor: u8 },
    /// Unreplicated pipelines with `factor` copies.
    Standalone { factor: u8 },
    /// Erasure coded.
    ErasureCoded(EcConfig),
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        ReplicationConfig::Ratis { factor: 3 }
    }
}

impl ReplicationConfig {
    /// Check the descriptor describes a usable layout.
    pub fn validate(&self) -> Result<(), TypeError> {
        match *self {
            ReplicationConfig::Ratis { factor } if factor != 1 && factor != 3 => Err(
                TypeError::InvalidReplication(format!("ratis factor must be 1 or 3, got {factor}")),
            ),
            ReplicationConfig::Standalone { factor } if factor == 0 => Err(
                TypeError::InvalidReplication("standalone factor must be positive".into()),
            ),
            ReplicationConfig::ErasureCoded(ec)
                if ec.data == 0 || ec.parity == 0 || ec.chunk_size == 0 =>
            {
                Err(TypeError::InvalidReplication(format!(
                    "ec data, parity and chunk size must be positive: {ec}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Number of storage nodes one block group occupies.
    pub fn required_nodes(&self) -> u32 {
        match *self {
            ReplicationConfig::Ratis { factor } | ReplicationConfig::Standalone { factor } => {
                u32::from(factor)
            }
            ReplicationConfig::ErasureCoded(ec) => ec.data + ec.parity,
        }
    }

    /// Raw bytes consumed on storage nodes by an object of `data_size` bytes.
    ///
    /// Replicated layouts multiply by the factor. Erasure coding adds
    /// `parity * chunk_size` for each full stripe, plus `parity` copies of the
    /// first chunk of a trailing partial stripe (parity chunks are as long as
    /// the longest data chunk in the stripe).
    pub fn replicated_size(&self, data_size: u64) -> u64 {
        match *self {
            ReplicationConfig::Ratis { factor } | ReplicationConfig::Standalone { factor } => {
                data_size.saturating_mul(u64::from(factor))
            }
            ReplicationConfig::ErasureCoded(ec) => {
                let stripe = ec.stripe_size();
                if stripe == 0 {
                    return data_size;
                }
                let chunk = u64::from(ec.chunk_size);
                let parity = u64::from(ec.parity);
                let full_stripes = data_size / stripe;
                let partial_first_chunk = chunk.min(data_size % stripe);
                let overhead = full_stripes * parity * chunk + partial_first_chunk * parity;
                data_size.saturating_add(overhead)
            }
        }
    }

    pub fn is_erasure_coded(&self) -> bool {
        matches!(self, ReplicationConfig::ErasureCoded(_))
    }
}

impl fmt::Display for ReplicationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationConfig::Ratis { factor } => write!(f, "ratis/{factor}"),
            ReplicationConfig::Standalone { factor } => write!(f, "standalone/{factor}"),
            ReplicationConfig::ErasureCoded(ec) => write!(f, "{ec}"),
        }
    }
}

/// Parses `ratis/3`, `standalone/1` or `rs-6-3-1024k` style descriptors.
impl FromStr for ReplicationConfig {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let invalid = || TypeError::InvalidReplication(s.to_string());

        let parsed = if let Some((kind, factor)) = lower.split_once('/') {
            let factor: u8 = factor.parse().map_err(|_| invalid())?;
            match kind {
                "ratis" => ReplicationConfig::Ratis { factor },
                "standalone" => ReplicationConfig::Standalone { factor },
                _ => return Err(invalid()),
            }
        } else {
            let parts: Vec<&str> = lower.split('-').collect();
            if parts.len() != 4 {
                return Err(invalid());
            }
            let codec = match parts[0] {
                "rs" => EcCodec::Rs,
                "xor" => EcCodec::Xor,
                _ => return Err(invalid()),
            };
            let data: u32 = parts[1].parse().map_err(|_| invalid())?;
            let parity: u32 = parts[2].parse().map_err(|_| invalid())?;
            let chunk_size = match parts[3].strip_suffix('k') {
                Some(kb) => kb
                    .parse::<u32>()
                    .map_err(|_| invalid())?
                    .checked_mul(1024)
                    .ok_or_else(invalid)?,
                None => parts[3].parse().map_err(|_| invalid())?,
            };
            ReplicationConfig::ErasureCoded(EcConfig::new(codec, data, parity, chunk_size))
        };

        parsed.validate()?;
        Ok(parsed)
    }
}
