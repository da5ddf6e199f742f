use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{entry_size, BlobError, BlobStore};

/// Blob store keeping one file per key inside a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
pub struct DirBlobStore {
    dir: PathBuf,
    quota: Option<u64>,
}

impl DirBlobStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, quota: Option<u64>) -> Result<Self, BlobError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, quota })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Bytes currently counted against the quota.
    pub fn used_bytes(&self) -> Result<u64, BlobError> {
        let mut total = 0u64;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(key) = name.to_str() else { continue };
            if is_valid_key(key) {
                total += key.len() as u64 + entry.metadata()?.len();
            }
        }
        Ok(total)
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        if !is_valid_key(key) {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

/// Keys become file names, so keep them to a safe alphabet.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl BlobStore for DirBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, BlobError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(BlobError::Corrupt(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;

        if let Some(quota) = self.quota {
            let current = match fs::metadata(&path) {
                Ok(meta) => key.len() as u64 + meta.len(),
                Err(e) if e.kind() == ErrorKind::NotFound => 0,
                Err(e) => return Err(e.into()),
            };
            let needed = self.used_bytes()? - current + entry_size(key, value);
            if needed > quota {
                return Err(BlobError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        let tmp = self.dir.join(format!(".{}.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = DirBlobStore::open(dir.path(), None).unwrap();
            store.set("stellar-memories", "[]").unwrap();
        }

        let store = DirBlobStore::open(dir.path(), None).unwrap();
        assert_eq!(store.get("stellar-memories").unwrap().as_deref(), Some("[]"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_quota_enforced_across_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = DirBlobStore::open(dir.path(), Some(20)).unwrap();

        store.set("a", "123456789").unwrap(); // 10 bytes
        store.set("b", "12345678").unwrap(); // 9 bytes
        let err = store.set("c", "12").unwrap_err();
        assert!(err.is_quota());
        assert_eq!(store.get("c").unwrap(), None);

        store.remove("b").unwrap();
        store.set("c", "12").unwrap();
        assert_eq!(store.used_bytes().unwrap(), 13);
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = DirBlobStore::open(dir.path(), None).unwrap();

        assert!(matches!(store.set("../escape", "x"), Err(BlobError::InvalidKey(_))));
        assert!(matches!(store.get(".hidden"), Err(BlobError::InvalidKey(_))));
    }

    #[test]
    fn test_non_utf8_value_reads_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let mut store = DirBlobStore::open(dir.path(), None).unwrap();
        fs::write(dir.path().join("stellar-memories"), [0xff, 0xfe, 0x00]).unwrap();

        let err = store.get("stellar-memories").unwrap_err();
        assert!(err.is_corrupt());

        store.remove("stellar-memories").unwrap();
        assert_eq!(store.get("stellar-memories").unwrap(), None);
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let dir = TempDir::new().unwrap();
        let mut store = DirBlobStore::open(dir.path(), None).unwrap();
        store.remove("never-set").unwrap();
    }
}
