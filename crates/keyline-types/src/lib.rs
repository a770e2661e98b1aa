//! Foundation types for keyline.
//!
//! This crate provides the leaf value types shared by the key and bucket
//! records, the wire codecs, and the commit coordinator. Every other keyline
//! crate depends on `keyline-types`.
//!
//! # Key Types
//!
//! - [`BlockId`]: `(container, local)` identity of a physical block
//! - [`BlockLocation`]: a block's position within an object, plus transient placement
//! - [`Pipeline`]: replica placement detail, never part of block identity
//! - [`ReplicationConfig`]: uniform replication factor or erasure-coding scheme
//! - [`Acl`]: one access-control entry
//! - [`FileEncryptionInfo`] / [`BucketEncryptionKeyInfo`]: encryption descriptors
//! - [`FileChecksum`]: whole-object checksum descriptor

pub mod acl;
pub mod block;
pub mod checksum;
pub mod encryption;
pub mod error;
pub mod replication;
pub mod storage;
pub mod temporal;

pub use acl::{Acl, AclIdentityType, AclRights, AclScope};
pub use block::{BlockId, BlockLocation, Pipeline, PipelineId};
pub use checksum::{CrcType, FileChecksum};
pub use encryption::{BucketEncryptionKeyInfo, CipherSuite, FileEncryptionInfo};
pub use error::TypeError;
pub use replication::{EcCodec, EcConfig, ReplicationConfig};
pub use storage::{BucketLayout, StorageType};
pub use temporal::now_millis;
