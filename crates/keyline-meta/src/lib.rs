//! Key and bucket metadata records.
//!
//! This crate holds the authoritative in-memory state for stored objects
//! ("keys") and their containers ("buckets"): the ordered block-location
//! version history of a key, the commit reconciliation that turns an
//! allocation into a committed version, and a bucket's quota counters and
//! ACLs.
//!
//! # Modules
//!
//! - [`acl`]: [`AclSet`], a copy-on-write ACL list with lock-free readers
//! - [`version`]: [`LocationVersionGroup`], the blocks of one key version
//! - [`key`]: [`KeyRecord`] and its builder
//! - [`reconcile`]: commit reconciliation of reported vs. allocated blocks
//! - [`bucket`]: [`BucketRecord`], quota counters and link metadata
//!
//! # Concurrency
//!
//! Records are `Send + Sync` and meant to be shared. Each record serializes
//! its version-history edits on its own lock; ACL reads never lock, and the
//! scalar fields that change after a record is shared (size, modification
//! time, generation, usage counters) are atomics.

pub mod acl;
pub mod bucket;
pub mod error;
pub mod key;
pub mod reconcile;
pub mod version;

pub use acl::AclSet;
pub use bucket::{BucketRecord, BucketRecordBuilder, QUOTA_RESET};
pub use error::{MetaError, Result};
pub use key::{KeyComparison, KeyRecord, KeyRecordBuilder, HSYNC_CLIENT_ID};
pub use reconcile::{CommitOptions, Reconciliation, UnknownBlockWarning};
pub use version::LocationVersionGroup;
