//! Platform interface for durable storage.

use super::error::StorageResult;

/// Atomic blob store for small files (`certificate_records.json`,
/// `alias_counter.json`).
///
/// Several installers, in one process or several, may share the same store.
/// All of them mutate blobs through [`compare_and_swap`], which the platform
/// must serialize: compare and replace happen under one lock (a file lock, a
/// database transaction), and the replacement is atomic on disk so a crash
/// leaves either the old or the new content.
///
/// [`compare_and_swap`]: AtomicBlobStore::compare_and_swap
#[uniffi::export(with_foreign)]
pub trait AtomicBlobStore: Send + Sync {
    /// Reads the blob named `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, name: String) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces `name` with `bytes` if its current content equals `expected`
    /// (`None`: the blob does not exist). Returns `false`, writing nothing,
    /// when the content differs.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or the write fails.
    fn compare_and_swap(
        &self,
        name: String,
        expected: Option<Vec<u8>>,
        bytes: Vec<u8>,
    ) -> StorageResult<bool>;
}
