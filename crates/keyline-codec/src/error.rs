use keyline_meta::MetaError;
use thiserror::Error;

use crate::frame::FormTag;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("framing error: {0}")]
    FramingError(String),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("wrong record form: expected {expected:?}, got tag {actual:#04x}")]
    WrongForm { expected: FormTag, actual: u8 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("record error: {0}")]
    Meta(MetaError),
}

impl From<MetaError> for CodecError {
    fn from(err: MetaError) -> Self {
        match err {
            MetaError::MalformedRecord { reason } => CodecError::MalformedRecord(reason),
            other => CodecError::Meta(other),
        }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
