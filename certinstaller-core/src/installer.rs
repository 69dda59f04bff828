//! The public entry point composing configuration, download, parsing, the
//! trust store and local records into the installer operations.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{ConfigurationData, InstallerConfig, ManagedConfigurationSource};
use crate::credential::{parse_bundle, parse_trust_anchor, CertificateFields};
use crate::error::{InstallerError, InstallerResult};
use crate::fetcher::RemoteFetcher;
use crate::storage::{
    AliasSequencer, AtomicBlobStore, CertificateRecord, CertificateRecordStore, RecordSnapshot,
};
use crate::trust_admin::{KeyPairInstallFlags, TrustAdministrationPort};

/// Result of a successful key-pair removal.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct RemovalOutcome {
    /// The removed alias.
    pub alias: String,
    /// Local records dropped for the alias. `0` when the trust store held a
    /// key-pair this app had no record of.
    pub records_removed: u32,
}

/// One trust anchor reported by the trust store.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum TrustAnchorEntry {
    /// The certificate decoded.
    Parsed {
        /// Fields of the certificate.
        fields: CertificateFields,
    },
    /// The certificate could not be decoded; the rest of the listing is
    /// unaffected.
    Unreadable {
        /// Why decoding failed.
        reason: String,
    },
}

/// Installs and tracks client key-pairs and trust anchors on a managed device.
///
/// Every operation blocks on network and storage I/O and must not run on a
/// latency sensitive thread. Operations may run concurrently; alias
/// generation and record updates are serialized internally.
#[derive(uniffi::Object)]
pub struct CertificateInstaller {
    configuration: Arc<dyn ManagedConfigurationSource>,
    trust_admin: Arc<dyn TrustAdministrationPort>,
    fetcher: RemoteFetcher,
    sequencer: AliasSequencer,
    records: CertificateRecordStore,
    key_pair_flags: KeyPairInstallFlags,
}

impl std::fmt::Debug for CertificateInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateInstaller")
            .field("fetcher", &self.fetcher)
            .field("key_pair_flags", &self.key_pair_flags)
            .finish_non_exhaustive()
    }
}

#[uniffi::export]
impl CertificateInstaller {
    /// Creates an installer over the host's platform implementations.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Fetch`] if `config.fetch` is invalid.
    #[uniffi::constructor]
    pub fn new(
        configuration: Arc<dyn ManagedConfigurationSource>,
        trust_admin: Arc<dyn TrustAdministrationPort>,
        blob_store: Arc<dyn AtomicBlobStore>,
        config: &InstallerConfig,
    ) -> Result<Self, InstallerError> {
        Ok(Self {
            configuration,
            trust_admin,
            fetcher: RemoteFetcher::new(&config.fetch)?,
            sequencer: AliasSequencer::new(Arc::clone(&blob_store)),
            records: CertificateRecordStore::new(blob_store),
            key_pair_flags: config.key_pair_flags,
        })
    }

    /// Downloads the configured PKCS#12 credential, installs its key-pair
    /// under a fresh alias and records it.
    ///
    /// Returns the alias. An alias is only returned once the trust store
    /// accepted the key-pair and the record was written.
    ///
    /// # Errors
    ///
    /// - [`InstallerError::ConfigMissing`] before any download
    /// - [`InstallerError::CapabilityMissing`] before any download
    /// - [`InstallerError::Fetch`] or [`InstallerError::Parse`]; no alias is
    ///   consumed
    /// - [`InstallerError::InstallRejected`] if the trust store refused; the
    ///   alias is consumed
    /// - [`InstallerError::TrustAdmin`] or [`InstallerError::Storage`]
    pub fn install_key_pair(&self) -> Result<String, InstallerError> {
        let configuration = self.configuration()?;
        self.ensure_capability()?;

        let bytes = self.fetcher.fetch(&configuration.credential_download_url)?;
        let credential = parse_bundle(&bytes, &configuration.bundle_password)?;

        let alias = self.sequencer.next_alias()?;
        let installed = self.trust_admin.install_key_pair(
            credential.private_key.to_vec(),
            credential.chain,
            alias.clone(),
            self.key_pair_flags,
        )?;
        if !installed {
            log::warn!("trust store refused key-pair {alias}");
            return Err(InstallerError::InstallRejected { alias });
        }

        let record = CertificateRecord::new(alias.clone(), &credential.fields, unix_now());
        if let Err(err) = self.records.append(record) {
            log::error!("key-pair {alias} installed but not recorded: {err}");
            return Err(err.into());
        }

        log::info!(
            "installed key-pair {alias} for {}",
            credential.fields.common_name
        );
        Ok(alias)
    }

    /// Downloads the configured trust anchor and installs it.
    ///
    /// Returns the common name of the certificate. Trust anchors are not
    /// recorded locally.
    ///
    /// # Errors
    ///
    /// - [`InstallerError::ConfigMissing`] before any download
    /// - [`InstallerError::CapabilityMissing`] before any download
    /// - [`InstallerError::Fetch`] or [`InstallerError::Parse`]
    /// - [`InstallerError::TrustAnchorRejected`] if the trust store refused
    /// - [`InstallerError::TrustAdmin`]
    pub fn install_trust_anchor(&self) -> Result<String, InstallerError> {
        let configuration = self.configuration()?;
        self.ensure_capability()?;

        let bytes = self
            .fetcher
            .fetch(&configuration.trust_anchor_download_url)?;
        let fields = parse_trust_anchor(&bytes)?;

        if !self.trust_admin.install_trust_anchor(bytes)? {
            log::warn!("trust store refused trust anchor {}", fields.common_name);
            return Err(InstallerError::TrustAnchorRejected {
                common_name: fields.common_name,
            });
        }

        log::info!(
            "installed trust anchor {} ({})",
            fields.common_name,
            fields.sha256_fingerprint
        );
        Ok(fields.common_name)
    }

    /// Removes the key-pair installed under `alias` from the trust store and
    /// drops its local record.
    ///
    /// # Errors
    ///
    /// - [`InstallerError::InvalidAlias`] if `alias` is blank
    /// - [`InstallerError::CapabilityMissing`]
    /// - [`InstallerError::RemovalRejected`] if the trust store refused an
    ///   alias this app tracks; the record is kept
    /// - [`InstallerError::RecordNotFound`] if the trust store refused an
    ///   alias this app does not track
    /// - [`InstallerError::TrustAdmin`] or [`InstallerError::Storage`]
    pub fn remove_key_pair(&self, alias: &str) -> Result<RemovalOutcome, InstallerError> {
        if alias.trim().is_empty() {
            return Err(InstallerError::InvalidAlias);
        }
        self.ensure_capability()?;

        if !self.trust_admin.remove_key_pair(alias.to_string())? {
            return if self.records.contains(alias)? {
                log::warn!("trust store refused to remove {alias}");
                Err(InstallerError::RemovalRejected {
                    alias: alias.to_string(),
                })
            } else {
                Err(InstallerError::RecordNotFound {
                    alias: alias.to_string(),
                })
            };
        }

        let records_removed = self.records.remove_by_alias(alias)?;
        if records_removed == 0 {
            log::warn!("removed key-pair {alias} which had no local record");
        } else {
            log::info!("removed key-pair {alias}");
        }
        Ok(RemovalOutcome {
            alias: alias.to_string(),
            records_removed,
        })
    }

    /// Key-pairs installed by this app, from local records only.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Storage`] if the records cannot be read.
    pub fn list_key_pairs(&self) -> Result<RecordSnapshot, InstallerError> {
        let snapshot = self.records.all()?;
        if snapshot.skipped > 0 {
            log::warn!("{} certificate records could not be read", snapshot.skipped);
        }
        Ok(snapshot)
    }

    /// Trust anchors currently held by the trust store, queried live.
    ///
    /// A certificate that fails to decode is reported as
    /// [`TrustAnchorEntry::Unreadable`] instead of failing the listing.
    ///
    /// # Errors
    ///
    /// - [`InstallerError::CapabilityMissing`]
    /// - [`InstallerError::TrustAdmin`]
    pub fn list_trust_anchors(&self) -> Result<Vec<TrustAnchorEntry>, InstallerError> {
        self.ensure_capability()?;

        let entries = self
            .trust_admin
            .list_trust_anchors()?
            .iter()
            .map(|encoded| match parse_trust_anchor(encoded) {
                Ok(fields) => TrustAnchorEntry::Parsed { fields },
                Err(err) => TrustAnchorEntry::Unreadable {
                    reason: err.to_string(),
                },
            })
            .collect();
        Ok(entries)
    }
}

impl CertificateInstaller {
    fn configuration(&self) -> InstallerResult<ConfigurationData> {
        ConfigurationData::load(self.configuration.as_ref()).map_err(|missing| {
            log::warn!("{missing}");
            InstallerError::from(missing)
        })
    }

    fn ensure_capability(&self) -> InstallerResult<()> {
        if self.trust_admin.has_delegated_capability() {
            Ok(())
        } else {
            Err(InstallerError::CapabilityMissing)
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}
