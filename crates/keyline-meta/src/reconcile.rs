//! Commit reconciliation.
//!
//! At commit time a writer reports the blocks it actually wrote. The report
//! is matched against the blocks allocated to the key's latest version by
//! block identity (`container_id`, `local_id`) only; offsets, lengths and
//! placement are taken from the report. Allocated blocks that were never
//! reported are handed back to the caller for deletion.
//!
//! Reported blocks that were never allocated are dropped with a warning
//! rather than failing the commit. This is safe only because the block
//! allocator never hands the same block identity to two keys, so an unknown
//! block cannot belong to some other live object.

use std::collections::HashMap;

use keyline_types::{BlockId, BlockLocation};
use tracing::{debug, warn};

use crate::error::{MetaError, Result};
use crate::key::KeyRecord;

/// Options for [`KeyRecord::commit_blocks`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// The committed version belongs to a multipart upload.
    pub is_multipart: bool,
    /// Accept the report verbatim without matching it against the
    /// allocation. Only for repair and bootstrap tooling.
    pub skip_block_id_check: bool,
}

/// A reported block that was not allocated to the key being committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownBlockWarning {
    pub key_name: String,
    pub block: BlockLocation,
}

/// Outcome of reconciling one commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Version the blocks were committed into.
    pub version: u64,
    /// Blocks now forming the latest version, in report order.
    pub committed: Vec<BlockLocation>,
    /// Allocated blocks the writer never reported, in allocation order.
    pub uncommitted: Vec<BlockLocation>,
    /// Reported blocks that were dropped.
    pub unknown: Vec<UnknownBlockWarning>,
}

impl KeyRecord {
    /// Reconcile `reported` against the latest version's allocation and
    /// replace that version's block list with the accepted blocks.
    ///
    /// The latest version is not advanced. Fails with
    /// [`MetaError::NoVersionExists`] when the key has no versions.
    pub fn commit_blocks(
        &self,
        reported: Vec<BlockLocation>,
        opts: CommitOptions,
    ) -> Result<Reconciliation> {
        let key_name = self.key_name().to_string();
        let outcome = self.with_versions(|versions| {
            let latest = versions.last_mut().ok_or_else(|| MetaError::NoVersionExists {
                key: key_name.clone(),
            })?;
            let version = latest.version();
            let allocated = latest.remove_blocks(version)?;

            let mut outcome = if opts.skip_block_id_check {
                Reconciliation {
                    version,
                    committed: reported,
                    ..Default::default()
                }
            } else {
                reconcile(&key_name, version, allocated, reported)
            };

            latest.add_all(version, std::mem::take(&mut outcome.committed))?;
            latest.set_multipart(opts.is_multipart);
            outcome.committed = latest.blocks().to_vec();
            Ok::<_, MetaError>(outcome)
        })?;

        debug!(
            key = %key_name,
            version = outcome.version,
            committed = outcome.committed.len(),
            uncommitted = outcome.uncommitted.len(),
            unknown = outcome.unknown.len(),
            "reconciled commit"
        );
        Ok(outcome)
    }
}

/// Match `reported` against `allocated` by block identity.
pub(crate) fn reconcile(
    key_name: &str,
    version: u64,
    allocated: Vec<BlockLocation>,
    reported: Vec<BlockLocation>,
) -> Reconciliation {
    let index: HashMap<BlockId, usize> = allocated
        .iter()
        .enumerate()
        .map(|(i, b)| (b.block_id(), i))
        .collect();
    let mut pending: Vec<Option<BlockLocation>> = allocated.into_iter().map(Some).collect();

    let mut committed = Vec::with_capacity(reported.len());
    let mut unknown = Vec::new();
    for block in reported {
        // A second report of the same block finds its slot already taken.
        let slot = index.get(&block.block_id()).and_then(|&i| pending[i].take());
        match slot {
            Some(_) => committed.push(block),
            None => {
                warn!(
                    key = %key_name,
                    block = %block.block_id(),
                    "reported block was not allocated to this key, dropping"
                );
                unknown.push(UnknownBlockWarning {
                    key_name: key_name.to_string(),
                    block,
                });
            }
        }
    }

    Reconciliation {
        version,
        committed,
        uncommitted: pending.into_iter().flatten().collect(),
        unknown,
    }
}
