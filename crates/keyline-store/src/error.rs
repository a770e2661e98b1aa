use keyline_codec::CodecError;
use keyline_meta::MetaError;

/// Errors from record store, allocator and commit operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write precondition failed: the stored record's generation is not
    /// the one the writer started from. `expected: None` means the name had
    /// to be unused. The caller may re-open and retry.
    #[error("concurrent modification of {name}: expected generation {expected:?}, found {actual:?}")]
    ConcurrentModification {
        name: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("key not found: /{volume}/{bucket}/{key}")]
    KeyNotFound {
        volume: String,
        bucket: String,
        key: String,
    },

    #[error("bucket not found: /{volume}/{bucket}")]
    BucketNotFound { volume: String, bucket: String },

    #[error("bucket already exists: /{volume}/{bucket}")]
    BucketAlreadyExists { volume: String, bucket: String },

    /// A bucket link points at another link.
    #[error("bucket link /{volume}/{bucket} does not resolve to a bucket")]
    UnresolvedLink { volume: String, bucket: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` if retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConcurrentModification { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
