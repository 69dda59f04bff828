//! Ordered collection of installed key-pair records.
//!
//! The collection is one JSON array in the blob store. Each element is decoded
//! on its own so a single malformed element does not hide the others; such
//! elements are counted, logged, and written back untouched on the next
//! rewrite.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::StorageResult;
use super::traits::AtomicBlobStore;
use super::{update_blob, RECORDS_BLOB};
use crate::credential::CertificateFields;

/// Metadata of a key-pair installed by this app.
///
/// A record is a claim about the trust store, written after the trust store
/// accepted the key-pair. The two can diverge if the key-pair is removed by
/// other means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct CertificateRecord {
    /// Alias the key-pair was installed under. Unique and never reused.
    pub alias: String,
    /// Common name of the leaf certificate subject.
    pub common_name: String,
    /// Subject in RFC 2253 form.
    pub subject_dn: String,
    /// Issuer in RFC 2253 form.
    pub issuer_dn: String,
    /// Serial number, upper case hex.
    pub serial_number: String,
    /// Start of validity, unix seconds.
    pub valid_from: i64,
    /// End of validity, unix seconds.
    pub valid_to: i64,
    /// When the key-pair was installed, unix seconds.
    pub installed_at: i64,
}

impl CertificateRecord {
    /// Builds the record for `fields` installed under `alias` at `installed_at`.
    #[must_use]
    pub fn new(alias: String, fields: &CertificateFields, installed_at: i64) -> Self {
        Self {
            alias,
            common_name: fields.common_name.clone(),
            subject_dn: fields.subject_dn.clone(),
            issuer_dn: fields.issuer_dn.clone(),
            serial_number: fields.serial_number.clone(),
            valid_from: fields.valid_from,
            valid_to: fields.valid_to,
            installed_at,
        }
    }
}

/// Read snapshot of the record collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct RecordSnapshot {
    /// Decodable records in insertion order.
    pub records: Vec<CertificateRecord>,
    /// Number of stored elements that could not be decoded.
    pub skipped: u32,
}

enum Entry {
    Record(CertificateRecord),
    Malformed(Value),
}

/// Durable, ordered store of [`CertificateRecord`]s.
///
/// Every mutation is a full read-modify-write of the collection, committed
/// with [`AtomicBlobStore::compare_and_swap`] and retried if another writer
/// got there first.
pub struct CertificateRecordStore {
    blob_store: Arc<dyn AtomicBlobStore>,
}

impl std::fmt::Debug for CertificateRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRecordStore").finish()
    }
}

impl CertificateRecordStore {
    /// Creates a store persisting into `blob_store`.
    #[must_use]
    pub fn new(blob_store: Arc<dyn AtomicBlobStore>) -> Self {
        Self { blob_store }
    }

    /// Appends `record` at the end of the collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read or written.
    pub fn append(&self, record: CertificateRecord) -> StorageResult<()> {
        update_blob(self.blob_store.as_ref(), RECORDS_BLOB, |stored| {
            let mut entries = decode(stored)?;
            entries.push(Entry::Record(record.clone()));
            Ok(((), Some(encode(&entries)?)))
        })
    }

    /// Returns every decodable record in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read or is not a JSON array.
    pub fn all(&self) -> StorageResult<RecordSnapshot> {
        let stored = self.blob_store.read(RECORDS_BLOB.to_string())?;
        let mut snapshot = RecordSnapshot::default();
        for entry in decode(stored.as_deref())? {
            match entry {
                Entry::Record(record) => snapshot.records.push(record),
                Entry::Malformed(_) => snapshot.skipped = snapshot.skipped.saturating_add(1),
            }
        }
        Ok(snapshot)
    }

    /// Whether any record carries `alias`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    pub fn contains(&self, alias: &str) -> StorageResult<bool> {
        Ok(self.all()?.records.iter().any(|record| record.alias == alias))
    }

    /// Removes every record whose alias equals `alias` and returns how many
    /// were removed. The remaining records keep their order.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read or written.
    pub fn remove_by_alias(&self, alias: &str) -> StorageResult<u32> {
        let removed = update_blob(self.blob_store.as_ref(), RECORDS_BLOB, |stored| {
            let mut entries = decode(stored)?;
            let before = entries.len();
            entries
                .retain(|entry| !matches!(entry, Entry::Record(record) if record.alias == alias));
            let removed = before - entries.len();
            let replacement = if removed > 0 {
                Some(encode(&entries)?)
            } else {
                None
            };
            Ok((removed, replacement))
        })?;
        Ok(u32::try_from(removed).unwrap_or(u32::MAX))
    }
}

fn decode(stored: Option<&[u8]>) -> StorageResult<Vec<Entry>> {
    let Some(bytes) = stored else {
        return Ok(Vec::new());
    };
    let values: Vec<Value> = serde_json::from_slice(bytes)?;

    let entries: Vec<Entry> = values
        .into_iter()
        .map(|value| match CertificateRecord::deserialize(&value) {
            Ok(record) => Entry::Record(record),
            Err(err) => {
                log::warn!("skipping malformed certificate record: {err}");
                Entry::Malformed(value)
            }
        })
        .collect();
    Ok(entries)
}

fn encode(entries: &[Entry]) -> StorageResult<Vec<u8>> {
    let values = entries
        .iter()
        .map(|entry| match entry {
            Entry::Record(record) => serde_json::to_value(record),
            Entry::Malformed(value) => Ok(value.clone()),
        })
        .collect::<Result<Vec<Value>, _>>()?;
    Ok(serde_json::to_vec(&values)?)
}
