//! Persistence and allocation interfaces for keyline, with in-memory
//! implementations and the key commit coordinator built on top of them.
//!
//! - [`RecordStore`]: atomic, generation-checked reads and writes of key
//!   and bucket records
//! - [`BlockAllocator`]: hands out never-reused block identities and
//!   accepts blocks for deletion
//! - [`CommitCoordinator`]: the open → allocate → commit → delete flow
//! - [`KeylineConfig`]: coordinator and allocator settings, loadable from
//!   TOML

pub mod allocator;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod traits;

pub use allocator::InMemoryBlockAllocator;
pub use config::KeylineConfig;
pub use coordinator::{CommitCoordinator, CommittedKey, OpenKeyRequest, OpenKeySession};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryRecordStore;
pub use traits::{BlockAllocator, RecordStore, WritePrecondition};
