use std::fmt;

use serde::{Deserialize, Serialize};

/// CRC polynomial used for chunk checksums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrcType {
    Crc32,
    Crc32C,
}

/// Whole-object checksum descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileChecksum {
    /// MD5 over the MD5s of per-block CRC lists.
    Md5Md5Crc {
        crc_type: CrcType,
        bytes_per_crc: u32,
        crc_per_block: u64,
        md5: [u8; 16],
    },
    /// A single CRC composed across all chunks.
    CompositeCrc {
        crc_type: CrcType,
        bytes_per_crc: u32,
        crc: u32,
    },
}

impl FileChecksum {
    pub fn crc_type(&self) -> CrcType {
        match self {
            FileChecksum::Md5Md5Crc { crc_type, .. } | FileChecksum::CompositeCrc { crc_type, .. } => {
                *crc_type
            }
        }
    }

    /// Hex digest of the checksum value.
    pub fn digest_hex(&self) -> String {
        match self {
            FileChecksum::Md5Md5Crc { md5, .. } => hex::encode(md5),
            FileChecksum::CompositeCrc { crc, .. } => hex::encode(crc.to_be_bytes()),
        }
    }
}

impl fmt::Display for FileChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithm = match self {
            FileChecksum::Md5Md5Crc { crc_type: CrcType::Crc32, .. } => "MD5-of-MD5-of-CRC32",
            FileChecksum::Md5Md5Crc { crc_type: CrcType::Crc32C, .. } => "MD5-of-MD5-of-CRC32C",
            FileChecksum::CompositeCrc { crc_type: CrcType::Crc32, .. } => "COMPOSITE-CRC32",
            FileChecksum::CompositeCrc { crc_type: CrcType::Crc32C, .. } => "COMPOSITE-CRC32C",
        };
        write!(f, "{algorithm}:{}", self.digest_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_crc_display() {
        let c = FileChecksum::CompositeCrc {
            crc_type: CrcType::Crc32C,
            bytes_per_crc: 512,
            crc: 0xdead_beef,
        };
        assert_eq!(c.to_string(), "COMPOSITE-CRC32C:deadbeef");
        assert_eq!(c.crc_type(), CrcType::Crc32C);
    }

    #[test]
    fn md5_digest_is_32_hex_chars() {
        let c = FileChecksum::Md5Md5Crc {
            crc_type: CrcType::Crc32,
            bytes_per_crc: 512,
            crc_per_block: 8,
            md5: [0xab; 16],
        };
        assert_eq!(c.digest_hex().len(), 32);
    }
}
