//! Key-value blob storage the store persists into.
//!
//! The [`BlobStore`] trait mirrors browser local storage: string keys, string
//! values, and a byte quota that rejects writes once exceeded. Two backends
//! are provided: [`MemoryBlobStore`] for tests and embedding hosts, and
//! [`DirBlobStore`] which keeps one file per key on disk.

pub mod dir;
pub mod memory;
pub mod schema;

use thiserror::Error;

pub use dir::DirBlobStore;
pub use memory::MemoryBlobStore;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("storage quota exceeded writing '{key}': {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { key: String, needed: u64, quota: u64 },

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("stored value for '{0}' is not valid text")]
    Corrupt(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobError {
    pub fn is_quota(&self) -> bool {
        matches!(self, BlobError::QuotaExceeded { .. })
    }

    /// True when the stored bytes exist but cannot be read back as a value.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, BlobError::Corrupt(_))
    }
}

/// String-keyed blob storage.
pub trait BlobStore {
    /// Stored value for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, BlobError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// Fails with [`BlobError::QuotaExceeded`] when the write would push the
    /// store past its quota; the previous value is left untouched.
    fn set(&mut self, key: &str, value: &str) -> Result<(), BlobError>;

    /// Delete `key`. Missing keys are not an error.
    fn remove(&mut self, key: &str) -> Result<(), BlobError>;
}

impl<B: BlobStore + ?Sized> BlobStore for Box<B> {
    fn get(&self, key: &str) -> Result<Option<String>, BlobError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), BlobError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), BlobError> {
        (**self).remove(key)
    }
}

/// Bytes an entry counts against the quota (key plus value).
pub(crate) fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}
