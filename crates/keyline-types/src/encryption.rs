use serde::{Deserialize, Serialize};

/// Cipher used for transparent data encryption.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherSuite {
    #[default]
    AesCtrNoPadding,
    Unknown,
}

/// Per-key encryption descriptor.
///
/// Carries the encrypted data encryption key; the key-management service
/// that unwraps it is outside this crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEncryptionInfo {
    pub suite: CipherSuite,
    /// Encrypted data encryption key.
    pub edek: Vec<u8>,
    pub iv: Vec<u8>,
    /// Name of the bucket key that wraps `edek`.
    pub key_name: String,
    pub key_version_name: String,
}

/// Bucket-level encryption key reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEncryptionKeyInfo {
    pub key_name: String,
    pub suite: CipherSuite,
}
