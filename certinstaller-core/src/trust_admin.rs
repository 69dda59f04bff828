//! Boundary to the privileged trust-store administration capability.
//!
//! The capability is granted to the app by the device owner (on Android, the
//! certificate-installer delegation of `DevicePolicyManager`). The core never
//! requests the grant; it checks for it and fails closed.

use thiserror::Error;

/// Errors raised by a [`TrustAdministrationPort`] implementation.
#[derive(Debug, Error, uniffi::Error)]
pub enum TrustAdminError {
    /// The app lacks the delegated capability for this call.
    #[error("permission_denied: {0}")]
    PermissionDenied(String),

    /// Any other platform failure.
    #[error("trust_store_error: {0}")]
    Platform(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for TrustAdminError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// Options passed along with a key-pair installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct KeyPairInstallFlags {
    /// Let the app that installed the key use it without a user grant.
    pub request_credential_access: bool,
    /// Let the user pick the key in system credential choosers.
    pub user_selectable: bool,
}

impl Default for KeyPairInstallFlags {
    fn default() -> Self {
        Self {
            request_credential_access: true,
            user_selectable: true,
        }
    }
}

/// Privileged trust-store operations, implemented by the host.
///
/// Every mutating call reports refusal by returning `false`; a missing grant
/// may instead surface as [`TrustAdminError::PermissionDenied`].
#[uniffi::export(with_foreign)]
pub trait TrustAdministrationPort: Send + Sync {
    /// Whether the delegated capability is currently granted.
    fn has_delegated_capability(&self) -> bool;

    /// Installs a private key and its certificate chain under `alias`.
    ///
    /// `private_key` is PKCS#8 DER; `certificate_chain` holds DER
    /// certificates, leaf first.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform raises one.
    fn install_key_pair(
        &self,
        private_key: Vec<u8>,
        certificate_chain: Vec<Vec<u8>>,
        alias: String,
        flags: KeyPairInstallFlags,
    ) -> Result<bool, TrustAdminError>;

    /// Installs a trust anchor from its DER or PEM encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform raises one.
    fn install_trust_anchor(&self, certificate: Vec<u8>) -> Result<bool, TrustAdminError>;

    /// Removes the key-pair registered under `alias`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform raises one.
    fn remove_key_pair(&self, alias: String) -> Result<bool, TrustAdminError>;

    /// Encodings of the trust anchors installed by the device owner or its
    /// delegates.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform raises one.
    fn list_trust_anchors(&self) -> Result<Vec<Vec<u8>>, TrustAdminError>;
}
