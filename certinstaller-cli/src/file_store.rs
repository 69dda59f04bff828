//! Directory-backed [`AtomicBlobStore`].
//!
//! Writes go to a uniquely named temporary file in the same directory, which
//! is synced and then renamed over the target, so readers see either the old
//! or the new content. Compare-and-swap runs under an exclusive lock on
//! `.lock` in the same directory, shared by every process using it.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use certinstaller_core::storage::{AtomicBlobStore, StorageError, StorageResult};

use crate::lock::FileLockGuard;

const LOCK_FILE: &str = ".lock";

fn io_error(context: impl std::fmt::Display, err: &std::io::Error) -> StorageError {
    StorageError::BlobStore(format!("{context}: {err}"))
}

/// Blob store keeping one file per blob in a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    directory: PathBuf,
}

impl FileBlobStore {
    /// Opens the store, creating `directory` if needed.
    pub fn new(directory: impl AsRef<Path>) -> StorageResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            io_error(
                format!("failed to create blob directory '{}'", directory.display()),
                &e,
            )
        })?;
        Ok(Self { directory })
    }

    fn blob_path(&self, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(StorageError::BlobStore(format!("invalid blob name '{name}'")));
        }
        Ok(self.directory.join(name))
    }

    fn sync_directory(&self) -> StorageResult<()> {
        #[cfg(unix)]
        File::open(&self.directory)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| io_error("failed to sync blob directory", &e))?;
        Ok(())
    }

    fn read_path(path: &Path) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(format!("failed to read '{}'", path.display()), &e)),
        }
    }

    fn replace(&self, name: &str, path: &Path, bytes: &[u8]) -> StorageResult<()> {
        let temp = self
            .directory
            .join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));

        let written = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp, path));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(io_error(format!("failed to write '{}'", path.display()), &e));
        }

        self.sync_directory()
    }
}

impl AtomicBlobStore for FileBlobStore {
    fn read(&self, name: String) -> StorageResult<Option<Vec<u8>>> {
        Self::read_path(&self.blob_path(&name)?)
    }

    fn compare_and_swap(
        &self,
        name: String,
        expected: Option<Vec<u8>>,
        bytes: Vec<u8>,
    ) -> StorageResult<bool> {
        let path = self.blob_path(&name)?;
        let _guard = FileLockGuard::acquire(&self.directory.join(LOCK_FILE))?;
        if Self::read_path(&path)? != expected {
            tracing::debug!(blob = %name, "content changed since it was read");
            return Ok(false);
        }
        self.replace(&name, &path, &bytes)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_blob_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::new(dir.path()).expect("store");

        assert_eq!(store.read("absent.json".to_string()).expect("read"), None);
    }

    #[test]
    fn test_write_replaces_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::new(dir.path().join("nested")).expect("store");

        assert!(store
            .compare_and_swap("counter.json".to_string(), None, b"1".to_vec())
            .expect("create"));
        assert!(store
            .compare_and_swap("counter.json".to_string(), Some(b"1".to_vec()), b"2".to_vec())
            .expect("replace"));

        assert_eq!(
            store.read("counter.json".to_string()).expect("read"),
            Some(b"2".to_vec())
        );
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_names_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::new(dir.path()).expect("store");

        for name in ["../escape", "a/b", "", ".hidden"] {
            assert!(store.compare_and_swap(name.to_string(), None, vec![1]).is_err());
            assert!(store.read(name.to_string()).is_err());
        }
    }

    #[test]
    fn test_stale_expectation_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::new(dir.path()).expect("store");
        let name = || "alias_counter.json".to_string();

        assert!(store.compare_and_swap(name(), None, b"1".to_vec()).expect("create"));
        assert!(!store.compare_and_swap(name(), None, b"9".to_vec()).expect("stale"));
        assert!(!store
            .compare_and_swap(name(), Some(b"0".to_vec()), b"9".to_vec())
            .expect("stale"));
        assert_eq!(store.read(name()).expect("read"), Some(b"1".to_vec()));
    }

    #[test]
    fn test_stores_on_one_directory_do_not_lose_updates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                // a separate store per thread, as separate processes would open
                let store = FileBlobStore::new(dir.path()).expect("store");
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        loop {
                            let current = store.read("n".to_string()).expect("read");
                            let value: u32 = current
                                .as_deref()
                                .map_or(0, |b| String::from_utf8_lossy(b).parse().expect("number"));
                            let next = (value + 1).to_string().into_bytes();
                            if store
                                .compare_and_swap("n".to_string(), current, next)
                                .expect("swap")
                            {
                                break;
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }

        let store = FileBlobStore::new(dir.path()).expect("store");
        assert_eq!(store.read("n".to_string()).expect("read"), Some(b"100".to_vec()));
    }
}
