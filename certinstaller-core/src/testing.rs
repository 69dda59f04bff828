//! In-memory implementations of the platform traits.
//!
//! These back the crate's own tests and let hosts exercise
//! [`crate::CertificateInstaller`] without a device. They are not durable and
//! hold key material in plain memory.

#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::ManagedConfigurationSource;
use crate::storage::{AtomicBlobStore, StorageError, StorageResult};
use crate::trust_admin::{KeyPairInstallFlags, TrustAdminError, TrustAdministrationPort};

// =============================================================================
// Memory Blob Store
// =============================================================================

/// Atomic blob store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following [`AtomicBlobStore::compare_and_swap`] fail
    /// while `fail` is `true`. Reads keep working.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrites `name` unconditionally.
    pub fn put(&self, name: &str, bytes: Vec<u8>) {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), bytes);
    }

    fn blobs(&self) -> StorageResult<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::BlobStore("mutex poisoned".to_string()))
    }
}

impl AtomicBlobStore for MemoryBlobStore {
    fn read(&self, name: String) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.blobs()?.get(&name).cloned())
    }

    fn compare_and_swap(
        &self,
        name: String,
        expected: Option<Vec<u8>>,
        bytes: Vec<u8>,
    ) -> StorageResult<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::BlobStore(format!("write to {name} refused")));
        }
        let mut blobs = self.blobs()?;
        if blobs.get(&name) != expected.as_ref() {
            return Ok(false);
        }
        blobs.insert(name, bytes);
        Ok(true)
    }
}

// =============================================================================
// Static Configuration
// =============================================================================

/// Managed configuration from a fixed map of values.
#[derive(Debug, Clone, Default)]
pub struct StaticConfiguration {
    values: HashMap<String, String>,
}

impl StaticConfiguration {
    /// Creates a configuration with no values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`.
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    /// Removes `key`.
    #[must_use]
    pub fn without(mut self, key: &str) -> Self {
        self.values.remove(key);
        self
    }
}

impl ManagedConfigurationSource for StaticConfiguration {
    fn get_string(&self, key: String) -> Option<String> {
        self.values.get(&key).cloned()
    }
}

// =============================================================================
// Fake Trust Administration
// =============================================================================

/// A key-pair accepted by [`FakeTrustAdministration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledKeyPair {
    /// Alias it was installed under.
    pub alias: String,
    /// PKCS#8 DER private key.
    pub private_key: Vec<u8>,
    /// DER certificates, leaf first.
    pub certificate_chain: Vec<Vec<u8>>,
    /// Flags passed with the install.
    pub flags: KeyPairInstallFlags,
}

#[derive(Debug)]
struct FakeTrustState {
    capability: bool,
    accepting: bool,
    permission_denied: bool,
    key_pairs: Vec<InstalledKeyPair>,
    trust_anchors: Vec<Vec<u8>>,
    calls: usize,
}

/// Trust store kept in memory, with switches for the failure modes of a real
/// device.
///
/// Starts with the capability granted and accepting every call. Removing an
/// alias it does not hold is refused, as a real trust store does.
#[derive(Debug)]
pub struct FakeTrustAdministration {
    state: Mutex<FakeTrustState>,
}

impl Default for FakeTrustAdministration {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTrustAdministration {
    /// Creates an empty, permissive trust store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeTrustState {
                capability: true,
                accepting: true,
                permission_denied: false,
                key_pairs: Vec::new(),
                trust_anchors: Vec::new(),
                calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeTrustState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Grants or revokes the delegated capability.
    pub fn set_capability(&self, granted: bool) {
        self.state().capability = granted;
    }

    /// When `false`, every mutating call returns `false`.
    pub fn set_accepting(&self, accepting: bool) {
        self.state().accepting = accepting;
    }

    /// When `true`, every call after the capability check raises
    /// [`TrustAdminError::PermissionDenied`].
    pub fn set_permission_denied(&self, denied: bool) {
        self.state().permission_denied = denied;
    }

    /// Adds a trust anchor as if installed by another admin.
    pub fn add_trust_anchor(&self, encoded: Vec<u8>) {
        self.state().trust_anchors.push(encoded);
    }

    /// Key-pairs currently held, in install order.
    #[must_use]
    pub fn key_pairs(&self) -> Vec<InstalledKeyPair> {
        self.state().key_pairs.clone()
    }

    /// Trust anchors currently held, in install order.
    #[must_use]
    pub fn trust_anchors(&self) -> Vec<Vec<u8>> {
        self.state().trust_anchors.clone()
    }

    /// Number of privileged calls received, capability checks excluded.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state().calls
    }

    fn begin(&self) -> Result<MutexGuard<'_, FakeTrustState>, TrustAdminError> {
        let mut state = self.state();
        state.calls += 1;
        if state.permission_denied {
            return Err(TrustAdminError::PermissionDenied(
                "caller is not a delegated certificate installer".to_string(),
            ));
        }
        Ok(state)
    }
}

impl TrustAdministrationPort for FakeTrustAdministration {
    fn has_delegated_capability(&self) -> bool {
        self.state().capability
    }

    fn install_key_pair(
        &self,
        private_key: Vec<u8>,
        certificate_chain: Vec<Vec<u8>>,
        alias: String,
        flags: KeyPairInstallFlags,
    ) -> Result<bool, TrustAdminError> {
        let mut state = self.begin()?;
        if !state.accepting {
            return Ok(false);
        }
        state.key_pairs.retain(|pair| pair.alias != alias);
        state.key_pairs.push(InstalledKeyPair {
            alias,
            private_key,
            certificate_chain,
            flags,
        });
        Ok(true)
    }

    fn install_trust_anchor(&self, certificate: Vec<u8>) -> Result<bool, TrustAdminError> {
        let mut state = self.begin()?;
        if !state.accepting {
            return Ok(false);
        }
        state.trust_anchors.push(certificate);
        Ok(true)
    }

    fn remove_key_pair(&self, alias: String) -> Result<bool, TrustAdminError> {
        let mut state = self.begin()?;
        let before = state.key_pairs.len();
        if state.accepting {
            state.key_pairs.retain(|pair| pair.alias != alias);
        }
        Ok(state.key_pairs.len() < before)
    }

    fn list_trust_anchors(&self) -> Result<Vec<Vec<u8>>, TrustAdminError> {
        Ok(self.begin()?.trust_anchors.clone())
    }
}
