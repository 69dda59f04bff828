use thiserror::Error;

use crate::credential::ParseError;
use crate::fetcher::FetchError;
use crate::storage::StorageError;
use crate::trust_admin::TrustAdminError;

/// Result type for installer operations.
pub type InstallerResult<T, E = InstallerError> = std::result::Result<T, E>;

/// Error outputs from [`crate::CertificateInstaller`].
///
/// Every public operation reports failure through this type; the `Display`
/// text is the human-readable cause surfaced to the host.
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum InstallerError {
    /// One or more required managed configuration values are absent or empty.
    #[error("configuration_missing: {missing}")]
    ConfigMissing {
        /// Comma separated list of the missing keys.
        missing: String,
    },
    /// The delegated trust administration capability has not been granted.
    #[error("capability_missing: trust administration has not been delegated to this app")]
    CapabilityMissing,
    /// Downloading credential material failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Downloaded credential material could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The trust store declined to install the key-pair.
    #[error("install_rejected: trust store refused key-pair {alias}")]
    InstallRejected {
        /// Alias the key-pair was offered under. It is not reused.
        alias: String,
    },
    /// The trust store declined to install the trust anchor.
    #[error("install_rejected: trust store refused trust anchor {common_name}")]
    TrustAnchorRejected {
        /// Common name of the refused certificate.
        common_name: String,
    },
    /// The trust store declined to remove a key-pair this app tracks.
    #[error("removal_rejected: trust store refused to remove {alias}")]
    RemovalRejected {
        /// Alias of the key-pair.
        alias: String,
    },
    /// Removal was requested for an alias that is neither tracked locally nor
    /// removable from the trust store.
    #[error("record_not_found: no installed key-pair with alias {alias}")]
    RecordNotFound {
        /// The requested alias.
        alias: String,
    },
    /// The alias passed to a removal was blank.
    #[error("invalid_alias: alias must not be blank")]
    InvalidAlias,
    /// Local record or counter storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The trust administration port raised an error.
    #[error(transparent)]
    TrustAdmin(#[from] TrustAdminError),
}
