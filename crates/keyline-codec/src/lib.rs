//! Wire codecs for keyline key and bucket records.
//!
//! Two forms per record type, selected by the caller:
//!
//! - [`PersistedCodec`]: what the record store keeps. Block placement
//!   (pipelines) is stripped.
//! - [`NetworkCodec`]: what clients receive. Placement is kept, the key
//!   form carries the latest version number and may be projected down to
//!   the latest version only.
//!
//! Both forms share the same CRC-checked framing (see [`frame`]) and
//! bincode payloads whose optional fields are explicit `Option`s.

pub mod codec;
pub mod error;
pub mod frame;
pub mod wire;

pub use codec::{NetworkCodec, NetworkKeyOptions, PersistedCodec};
pub use error::{CodecError, CodecResult};
pub use frame::{FormTag, MAX_PAYLOAD_SIZE};
