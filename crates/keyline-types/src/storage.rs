use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Storage medium requested for a bucket's data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    RamDisk,
    Ssd,
    #[default]
    Disk,
    Archive,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageType::RamDisk => "RAM_DISK",
            StorageType::Ssd => "SSD",
            StorageType::Disk => "DISK",
            StorageType::Archive => "ARCHIVE",
        };
        f.write_str(s)
    }
}

impl FromStr for StorageType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RAM_DISK" => Ok(StorageType::RamDisk),
            "SSD" => Ok(StorageType::Ssd),
            "DISK" => Ok(StorageType::Disk),
            "ARCHIVE" => Ok(StorageType::Archive),
            _ => Err(TypeError::UnknownVariant {
                kind: "storage type",
                value: s.to_string(),
            }),
        }
    }
}

/// How keys in a bucket are organized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketLayout {
    /// Flat key namespace.
    ObjectStore,
    /// Directory tree keyed by parent object id.
    FileSystemOptimized,
    #[default]
    Legacy,
}

impl BucketLayout {
    pub fn is_file_system_optimized(&self) -> bool {
        matches!(self, BucketLayout::FileSystemOptimized)
    }
}

impl fmt::Display for BucketLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BucketLayout::ObjectStore => "OBJECT_STORE",
            BucketLayout::FileSystemOptimized => "FILE_SYSTEM_OPTIMIZED",
            BucketLayout::Legacy => "LEGACY",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_type_display_parse() {
        for t in [StorageType::RamDisk, StorageType::Ssd, StorageType::Disk, StorageType::Archive] {
            assert_eq!(t.to_string().parse::<StorageType>().unwrap(), t);
        }
        assert!("TAPE".parse::<StorageType>().is_err());
    }

    #[test]
    fn defaults() {
        assert_eq!(StorageType::default(), StorageType::Disk);
        assert_eq!(BucketLayout::default(), BucketLayout::Legacy);
    }
}
