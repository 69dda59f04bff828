//! Durable local state: the installed key-pair records and the alias counter.

pub mod error;
mod records;
mod sequencer;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use records::{CertificateRecord, CertificateRecordStore, RecordSnapshot};
pub use sequencer::{AliasSequencer, ALIAS_PREFIX};
pub use traits::AtomicBlobStore;

pub(crate) const RECORDS_BLOB: &str = "certificate_records.json";
pub(crate) const ALIAS_COUNTER_BLOB: &str = "alias_counter.json";

/// Attempts before a read-modify-write gives up on a contended blob.
const MAX_SWAP_ATTEMPTS: u32 = 1_000;

/// Read-modify-write of one blob, retried until the compare-and-swap lands.
///
/// `apply` sees the current content and returns its result together with the
/// replacement, or `None` to leave the blob untouched. It may run several
/// times.
pub(crate) fn update_blob<T>(
    blob_store: &dyn AtomicBlobStore,
    name: &str,
    mut apply: impl FnMut(Option<&[u8]>) -> StorageResult<(T, Option<Vec<u8>>)>,
) -> StorageResult<T> {
    for _ in 0..MAX_SWAP_ATTEMPTS {
        let current = blob_store.read(name.to_string())?;
        let (result, replacement) = apply(current.as_deref())?;
        let Some(bytes) = replacement else {
            return Ok(result);
        };
        if blob_store.compare_and_swap(name.to_string(), current, bytes)? {
            return Ok(result);
        }
        log::debug!("{name} changed concurrently, retrying");
    }
    Err(StorageError::Lock(format!(
        "{name} kept changing concurrently, gave up after {MAX_SWAP_ATTEMPTS} attempts"
    )))
}
