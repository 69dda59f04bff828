//! The durable alias counter.

use std::sync::Arc;

use super::error::{StorageError, StorageResult};
use super::traits::AtomicBlobStore;
use super::{update_blob, ALIAS_COUNTER_BLOB};

/// Prefix of every generated alias.
pub const ALIAS_PREFIX: &str = "cert";

/// Durable counter handing out `cert1`, `cert2`, ... aliases.
///
/// The counter is persisted before the alias is returned, so an alias is never
/// handed out twice, even across restarts. Sequencers sharing a blob store
/// draw from the same counter. Aliases drawn for installs that later fail are
/// not given back.
pub struct AliasSequencer {
    blob_store: Arc<dyn AtomicBlobStore>,
}

impl std::fmt::Debug for AliasSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasSequencer").finish()
    }
}

impl AliasSequencer {
    /// Creates a sequencer persisting into `blob_store`.
    #[must_use]
    pub fn new(blob_store: Arc<dyn AtomicBlobStore>) -> Self {
        Self { blob_store }
    }

    /// Advances the counter and returns the new alias.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Serialization`] if the stored counter is corrupt
    /// - [`StorageError::CounterExhausted`] if the counter cannot advance
    /// - any error of the blob store
    pub fn next_alias(&self) -> StorageResult<String> {
        let next = update_blob(self.blob_store.as_ref(), ALIAS_COUNTER_BLOB, |stored| {
            let next = decode(stored)?
                .checked_add(1)
                .ok_or(StorageError::CounterExhausted)?;
            Ok((next, Some(serde_json::to_vec(&next)?)))
        })?;
        Ok(format!("{ALIAS_PREFIX}{next}"))
    }

    /// Last value handed out, `0` if none.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored counter cannot be read.
    pub fn current(&self) -> StorageResult<u64> {
        decode(
            self.blob_store
                .read(ALIAS_COUNTER_BLOB.to_string())?
                .as_deref(),
        )
    }
}

fn decode(stored: Option<&[u8]>) -> StorageResult<u64> {
    match stored {
        None => Ok(0),
        Some(bytes) => Ok(serde_json::from_slice(bytes)?),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::testing::MemoryBlobStore;

    #[test]
    fn test_sequential_aliases() {
        let sequencer = AliasSequencer::new(Arc::new(MemoryBlobStore::new()));
        assert_eq!(sequencer.current().expect("current"), 0);

        let aliases: Vec<String> = (0..3)
            .map(|_| sequencer.next_alias().expect("next"))
            .collect();
        assert_eq!(aliases, vec!["cert1", "cert2", "cert3"]);
        assert_eq!(sequencer.current().expect("current"), 3);
    }

    #[test]
    fn test_counter_survives_restart() {
        let blobs = Arc::new(MemoryBlobStore::new());
        AliasSequencer::new(blobs.clone()).next_alias().expect("next");
        AliasSequencer::new(blobs.clone()).next_alias().expect("next");

        let reopened = AliasSequencer::new(blobs);
        assert_eq!(reopened.next_alias().expect("next"), "cert3");
    }

    #[test]
    fn test_corrupt_counter_is_not_reset() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.put(ALIAS_COUNTER_BLOB, b"\"seven\"".to_vec());

        let sequencer = AliasSequencer::new(blobs.clone());
        assert!(matches!(
            sequencer.next_alias(),
            Err(StorageError::Serialization(_))
        ));
        assert_eq!(
            blobs.read(ALIAS_COUNTER_BLOB.to_string()).expect("read"),
            Some(b"\"seven\"".to_vec())
        );
    }

    #[test]
    fn test_exhausted_counter() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.put(ALIAS_COUNTER_BLOB, u64::MAX.to_string().into_bytes());

        let sequencer = AliasSequencer::new(blobs);
        assert!(matches!(
            sequencer.next_alias(),
            Err(StorageError::CounterExhausted)
        ));
    }

    #[test]
    fn test_concurrent_aliases_are_unique() {
        let sequencer = Arc::new(AliasSequencer::new(Arc::new(MemoryBlobStore::new())));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sequencer = Arc::clone(&sequencer);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| sequencer.next_alias().expect("next"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for alias in handle.join().expect("join") {
                assert!(seen.insert(alias), "alias handed out twice");
            }
        }
        assert_eq!(seen.len(), 200);
        assert_eq!(sequencer.current().expect("current"), 200);
    }

    #[test]
    fn test_sequencers_sharing_a_store_never_collide() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                // one sequencer per thread, as separate installers would have
                let sequencer = AliasSequencer::new(blobs.clone());
                std::thread::spawn(move || {
                    (0..500)
                        .map(|_| sequencer.next_alias().expect("next"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for alias in handle.join().expect("join") {
                assert!(seen.insert(alias), "alias handed out twice");
            }
        }
        assert_eq!(seen.len(), 2000);
        assert_eq!(AliasSequencer::new(blobs).current().expect("current"), 2000);
    }
}
