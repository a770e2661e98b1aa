use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one physical block: the container holding it and the block's
/// id local to that container.
///
/// This pair is the only thing reconciliation compares. Offsets, lengths and
/// placement may legitimately differ between the allocation-time and
/// commit-time views of the same block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId {
    pub container_id: u64,
    pub local_id: u64,
}

impl BlockId {
    pub const fn new(container_id: u64, local_id: u64) -> Self {
        Self {
            container_id,
            local_id,
        }
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({}:{})", self.container_id, self.local_id)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conID: {} locID: {}", self.container_id, self.local_id)
    }
}

/// Identifier of a replica pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineId(Uuid);

impl PipelineId {
    /// A fresh, time-ordered pipeline id.
    pub fn random() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipelineId({})", self.0)
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placement detail for a block: which storage nodes hold its replicas.
///
/// Pipelines are reconfigured by the consensus layer (for example on leader
/// failover), so a pipeline is never durable identity. The persisted record
/// form drops it and it is re-resolved at read time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    /// Addresses of the nodes holding replicas, in replica order.
    pub nodes: Vec<String>,
    /// The current leader, when the replication scheme has one.
    pub leader: Option<String>,
}

impl Pipeline {
    pub fn new(id: PipelineId, nodes: Vec<String>) -> Self {
        let leader = nodes.first().cloned();
        Self { id, nodes, leader }
    }
}

/// Location of one block within a key's data.
///
/// Immutable once built; the `with_*` methods return modified copies. The
/// version stamp is applied by commit reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    block_id: BlockId,
    offset: u64,
    length: u64,
    created_at_version: u64,
    pipeline: Option<Pipeline>,
}

impl BlockLocation {
    /// A location for `block_id` with zero offset and length.
    ///
    /// The allocator sets the real offset/length before handing the block out.
    pub fn new(block_id: BlockId) -> Self {
        Self {
            block_id,
            offset: 0,
            length: 0,
            created_at_version: 0,
            pipeline: None,
        }
    }

    pub fn with_range(mut self, offset: u64, length: u64) -> Self {
        self.offset = offset;
        self.length = length;
        self
    }

    pub fn with_created_at_version(mut self, version: u64) -> Self {
        self.created_at_version = version;
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// A copy with placement detail removed.
    pub fn without_pipeline(&self) -> Self {
        Self {
            pipeline: None,
            ..self.clone()
        }
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    pub fn container_id(&self) -> u64 {
        self.block_id.container_id
    }

    pub fn local_id(&self) -> u64 {
        self.block_id.local_id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn created_at_version(&self) -> u64 {
        self.created_at_version
    }

    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    /// Returns `true` if both locations name the same physical block.
    pub fn same_block(&self, other: &BlockLocation) -> bool {
        self.block_id == other.block_id
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{blockID={{{}}}, length={}, offset={}, createVersion={}}}",
            self.block_id, self.length, self.offset, self.created_at_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            PipelineId::random(),
            vec!["dn1:9858".into(), "dn2:9858".into(), "dn3:9858".into()],
        )
    }

    #[test]
    fn new_defaults_to_empty_range() {
        let loc = BlockLocation::new(BlockId::new(1, 2));
        assert_eq!(loc.offset(), 0);
        assert_eq!(loc.length(), 0);
        assert_eq!(loc.created_at_version(), 0);
        assert!(loc.pipeline().is_none());
    }

    #[test]
    fn same_block_ignores_range_and_placement() {
        let allocated = BlockLocation::new(BlockId::new(1, 2))
            .with_range(0, 256)
            .with_pipeline(pipeline());
        let reported = BlockLocation::new(BlockId::new(1, 2)).with_range(0, 100);
        assert!(allocated.same_block(&reported));
        assert_ne!(allocated, reported);
    }

    #[test]
    fn different_local_id_is_different_block() {
        let a = BlockLocation::new(BlockId::new(1, 2));
        let b = BlockLocation::new(BlockId::new(1, 3));
        assert!(!a.same_block(&b));
    }

    #[test]
    fn without_pipeline_keeps_everything_else() {
        let loc = BlockLocation::new(BlockId::new(7, 9))
            .with_range(10, 20)
            .with_created_at_version(3)
            .with_pipeline(pipeline());
        let stripped = loc.without_pipeline();
        assert!(stripped.pipeline().is_none());
        assert_eq!(stripped.block_id(), loc.block_id());
        assert_eq!(stripped.offset(), 10);
        assert_eq!(stripped.length(), 20);
        assert_eq!(stripped.created_at_version(), 3);
    }

    #[test]
    fn pipeline_leader_is_first_node() {
        let p = pipeline();
        assert_eq!(p.leader.as_deref(), Some("dn1:9858"));
    }

    #[test]
    fn block_id_ordering() {
        assert!(BlockId::new(1, 9) < BlockId::new(2, 0));
        assert!(BlockId::new(1, 1) < BlockId::new(1, 2));
    }

    #[test]
    fn serde_roundtrip() {
        let loc = BlockLocation::new(BlockId::new(4, 5))
            .with_range(0, 42)
            .with_pipeline(pipeline());
        let json = serde_json::to_string(&loc).unwrap();
        let parsed: BlockLocation = serde_json::from_str(&json).unwrap();
        assert_eq!(loc, parsed);
    }
}
