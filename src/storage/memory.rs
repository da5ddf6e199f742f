use std::collections::HashMap;

use super::{entry_size, BlobError, BlobStore};

/// Blob store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    entries: HashMap<String, String>,
    quota: Option<u64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once keys plus values exceed `quota` bytes.
    pub fn with_quota(quota: u64) -> Self {
        Self {
            entries: HashMap::new(),
            quota: Some(quota),
        }
    }

    pub fn set_quota(&mut self, quota: Option<u64>) {
        self.quota = quota;
    }

    /// Bytes currently counted against the quota.
    pub fn used_bytes(&self) -> u64 {
        self.entries.iter().map(|(k, v)| entry_size(k, v)).sum()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, BlobError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), BlobError> {
        if let Some(quota) = self.quota {
            let current = self
                .entries
                .get(key)
                .map(|old| entry_size(key, old))
                .unwrap_or(0);
            let needed = self.used_bytes() - current + entry_size(key, value);
            if needed > quota {
                return Err(BlobError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), BlobError> {
        self.entries.remove(key);
        Ok(())
    }
}
