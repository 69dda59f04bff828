//! Managed configuration and installer tunables.

use secrecy::SecretString;
use strum::{AsRefStr, EnumIter};
use thiserror::Error;

use crate::error::InstallerError;
use crate::fetcher::FetchConfig;
use crate::trust_admin::KeyPairInstallFlags;

/// Keys read from the device's managed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
pub enum ConfigKey {
    /// URL of the password protected PKCS#12 client credential.
    #[strum(serialize = "cert_download_url")]
    CredentialDownloadUrl,
    /// URL of the trust anchor certificate (DER or PEM).
    #[strum(serialize = "ca_cert_download_url")]
    TrustAnchorDownloadUrl,
    /// Password of the PKCS#12 archive.
    #[strum(serialize = "p12_password")]
    BundlePassword,
}

/// Source of managed configuration values, implemented by the host.
///
/// On Android this wraps the application restrictions bundle pushed by the
/// device policy controller.
#[uniffi::export(with_foreign)]
pub trait ManagedConfigurationSource: Send + Sync {
    /// Returns the string value stored under `key`, if any.
    fn get_string(&self, key: String) -> Option<String>;
}

/// The complete set of managed values needed to install credentials.
///
/// Either all three values are present and non-blank or no `ConfigurationData`
/// exists at all.
#[derive(Debug)]
pub struct ConfigurationData {
    /// Where to download the PKCS#12 client credential.
    pub credential_download_url: String,
    /// Where to download the trust anchor.
    pub trust_anchor_download_url: String,
    /// Password protecting the PKCS#12 archive.
    pub bundle_password: SecretString,
}

/// Raised when one or more managed configuration values are absent or blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing managed configuration: {}", join_keys(.missing))]
pub struct ConfigurationMissing {
    /// Every key that was absent or blank, in declaration order.
    pub missing: Vec<ConfigKey>,
}

fn join_keys(keys: &[ConfigKey]) -> String {
    keys.iter()
        .map(|key| key.as_ref())
        .collect::<Vec<&str>>()
        .join(", ")
}

impl From<ConfigurationMissing> for InstallerError {
    fn from(value: ConfigurationMissing) -> Self {
        Self::ConfigMissing {
            missing: join_keys(&value.missing),
        }
    }
}

impl ConfigurationData {
    /// Reads and validates the managed configuration.
    ///
    /// No value is cached; every call observes the source as it is now.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationMissing`] listing every key that is absent or
    /// blank. No partial configuration is ever returned.
    pub fn load(
        source: &dyn ManagedConfigurationSource,
    ) -> Result<Self, ConfigurationMissing> {
        let mut missing = Vec::new();
        let mut read = |key: ConfigKey| match source.get_string(key.as_ref().to_string()) {
            Some(value) if !value.trim().is_empty() => Some(value),
            _ => {
                missing.push(key);
                None
            }
        };

        let credential_download_url = read(ConfigKey::CredentialDownloadUrl);
        let trust_anchor_download_url = read(ConfigKey::TrustAnchorDownloadUrl);
        let bundle_password = read(ConfigKey::BundlePassword);

        match (credential_download_url, trust_anchor_download_url, bundle_password) {
            (Some(credential_download_url), Some(trust_anchor_download_url), Some(password)) => {
                Ok(Self {
                    credential_download_url,
                    trust_anchor_download_url,
                    bundle_password: SecretString::from(password),
                })
            }
            _ => Err(ConfigurationMissing { missing }),
        }
    }
}

/// Tunables of a [`crate::CertificateInstaller`].
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct InstallerConfig {
    /// Transport settings for credential downloads.
    pub fetch: FetchConfig,
    /// Flags forwarded with every key-pair installation.
    pub key_pair_flags: KeyPairInstallFlags,
}
