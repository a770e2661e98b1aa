//! The blocks of one key version.

use keyline_types::BlockLocation;
use serde::{Deserialize, Serialize};

use crate::error::{MetaError, Result};

/// All block locations belonging to one version of a key.
///
/// Every block held by a group carries the group's version as its
/// `created_at_version`; the group stamps blocks as they are inserted.
/// Within a key's history only the tail group is ever mutated: the
/// [`KeyRecord`](crate::KeyRecord) never hands out mutable access to older
/// groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationVersionGroup {
    version: u64,
    blocks: Vec<BlockLocation>,
    is_multipart: bool,
}

impl LocationVersionGroup {
    pub fn new(version: u64, blocks: Vec<BlockLocation>) -> Self {
        Self::with_multipart(version, blocks, false)
    }

    pub fn with_multipart(version: u64, blocks: Vec<BlockLocation>, is_multipart: bool) -> Self {
        Self {
            version,
            blocks: stamp(version, blocks),
            is_multipart,
        }
    }

    /// A new group one version above this one, holding only `new_blocks`.
    pub fn generate_next_version(&self, new_blocks: Vec<BlockLocation>) -> Self {
        Self::new(self.version + 1, new_blocks)
    }

    /// Extend this group in place without advancing the version.
    pub fn append_new_blocks(&mut self, new_blocks: Vec<BlockLocation>) {
        self.blocks.extend(stamp(self.version, new_blocks));
    }

    /// Remove and return every block of `version`.
    pub fn remove_blocks(&mut self, version: u64) -> Result<Vec<BlockLocation>> {
        self.check_version(version)?;
        Ok(std::mem::take(&mut self.blocks))
    }

    /// Add `blocks` to `version`.
    pub fn add_all(&mut self, version: u64, blocks: Vec<BlockLocation>) -> Result<()> {
        self.check_version(version)?;
        self.blocks.extend(stamp(version, blocks));
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn blocks(&self) -> &[BlockLocation] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<BlockLocation> {
        self.blocks
    }

    pub fn is_multipart(&self) -> bool {
        self.is_multipart
    }

    pub fn set_multipart(&mut self, is_multipart: bool) {
        self.is_multipart = is_multipart;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sum of block lengths.
    pub fn total_length(&self) -> u64 {
        self.blocks.iter().map(BlockLocation::length).sum()
    }

    /// A copy of this group with placement detail stripped from every block.
    pub fn without_pipelines(&self) -> Self {
        Self {
            version: self.version,
            blocks: self.blocks.iter().map(BlockLocation::without_pipeline).collect(),
            is_multipart: self.is_multipart,
        }
    }

    fn check_version(&self, requested: u64) -> Result<()> {
        if requested != self.version {
            return Err(MetaError::VersionMismatch {
                group: self.version,
                requested,
            });
        }
        Ok(())
    }
}

fn stamp(version: u64, blocks: Vec<BlockLocation>) -> Vec<BlockLocation> {
    blocks
        .into_iter()
        .map(|b| b.with_created_at_version(version))
        .collect()
}
