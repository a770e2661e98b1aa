//! In-memory block allocator.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use keyline_types::{BlockId, BlockLocation, Pipeline, PipelineId, ReplicationConfig};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockAllocator;

/// Hands out blocks round-robin across a fixed set of containers.
///
/// Local ids come from one monotonically increasing counter shared by all
/// containers, so a block identity is never reused for the lifetime of the
/// allocator. Deleted blocks are recorded for inspection.
#[derive(Debug)]
pub struct InMemoryBlockAllocator {
    containers: u64,
    next_container: AtomicU64,
    next_local: AtomicU64,
    live: Mutex<HashSet<BlockId>>,
    deleted: Mutex<Vec<BlockId>>,
}

impl InMemoryBlockAllocator {
    /// Create an allocator spreading blocks over `containers` containers
    /// numbered from 1.
    pub fn new(containers: u64) -> StoreResult<Self> {
        if containers == 0 {
            return Err(StoreError::Config(
                "allocator needs at least one container".into(),
            ));
        }
        Ok(Self {
            containers,
            next_container: AtomicU64::new(0),
            next_local: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
            deleted: Mutex::new(Vec::new()),
        })
    }

    /// Blocks allocated and not yet deleted.
    pub fn live_blocks(&self) -> HashSet<BlockId> {
        self.live.lock().clone()
    }

    pub fn is_live(&self, id: BlockId) -> bool {
        self.live.lock().contains(&id)
    }

    /// Every block passed to `delete_blocks`, in deletion order.
    pub fn deleted_blocks(&self) -> Vec<BlockId> {
        self.deleted.lock().clone()
    }

    fn next_id(&self) -> BlockId {
        let container = self.next_container.fetch_add(1, Ordering::Relaxed) % self.containers + 1;
        let local = self.next_local.fetch_add(1, Ordering::Relaxed);
        BlockId::new(container, local)
    }
}

impl BlockAllocator for InMemoryBlockAllocator {
    fn allocate_blocks(
        &self,
        key_name: &str,
        replication: ReplicationConfig,
        count: usize,
        block_size: u64,
    ) -> StoreResult<Vec<BlockLocation>> {
        replication
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let blocks: Vec<BlockLocation> = (0..count)
            .map(|_| {
                let id = self.next_id();
                let nodes = (0..replication.required_nodes())
                    .map(|n| format!("dn{}-{}", id.container_id, n + 1))
                    .collect();
                BlockLocation::new(id)
                    .with_range(0, block_size)
                    .with_pipeline(Pipeline::new(PipelineId::random(), nodes))
            })
            .collect();

        self.live.lock().extend(blocks.iter().map(BlockLocation::block_id));
        debug!(key = key_name, count, %replication, "allocated blocks");
        Ok(blocks)
    }

    fn delete_blocks(&self, blocks: &[BlockLocation]) -> StoreResult<()> {
        if blocks.is_empty() {
            return Ok(());
        }
        let mut live = self.live.lock();
        let mut deleted = self.deleted.lock();
        for block in blocks {
            live.remove(&block.block_id());
            deleted.push(block.block_id());
        }
        debug!(count = blocks.len(), "deleted blocks");
        Ok(())
    }
}
