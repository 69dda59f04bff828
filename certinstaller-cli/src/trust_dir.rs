//! A workstation stand-in for the device trust store.
//!
//! Layout under the root directory:
//!
//! ```text
//! keys/<alias>.json        private key, chain and flags (hex encoded)
//! anchors/<sha256>.crt     trust anchors as received (DER or PEM)
//! ```

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use certinstaller_core::{KeyPairInstallFlags, TrustAdminError, TrustAdministrationPort};
use sha2::{Digest, Sha256};

fn platform_error(context: impl std::fmt::Display, err: &std::io::Error) -> TrustAdminError {
    TrustAdminError::Platform(format!("{context}: {err}"))
}

/// Trust store kept in plain files. Holds private keys unencrypted; meant for
/// development only.
#[derive(Debug, Clone)]
pub struct DirectoryTrustStore {
    keys: PathBuf,
    anchors: PathBuf,
}

impl DirectoryTrustStore {
    /// Opens the trust store rooted at `root`, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, TrustAdminError> {
        let root = root.as_ref();
        let store = Self {
            keys: root.join("keys"),
            anchors: root.join("anchors"),
        };
        for dir in [&store.keys, &store.anchors] {
            fs::create_dir_all(dir).map_err(|e| {
                platform_error(format!("failed to create '{}'", dir.display()), &e)
            })?;
        }
        Ok(store)
    }

    fn key_path(&self, alias: &str) -> Result<PathBuf, TrustAdminError> {
        if alias.is_empty() || alias.starts_with('.') || alias.contains(['/', '\\']) {
            return Err(TrustAdminError::Platform(format!("invalid alias '{alias}'")));
        }
        Ok(self.keys.join(format!("{alias}.json")))
    }
}

impl TrustAdministrationPort for DirectoryTrustStore {
    fn has_delegated_capability(&self) -> bool {
        self.keys.is_dir() && self.anchors.is_dir()
    }

    fn install_key_pair(
        &self,
        private_key: Vec<u8>,
        certificate_chain: Vec<Vec<u8>>,
        alias: String,
        flags: KeyPairInstallFlags,
    ) -> Result<bool, TrustAdminError> {
        let path = self.key_path(&alias)?;
        let entry = serde_json::json!({
            "private_key": hex::encode(private_key),
            "certificate_chain": certificate_chain.iter().map(hex::encode).collect::<Vec<_>>(),
            "request_credential_access": flags.request_credential_access,
            "user_selectable": flags.user_selectable,
        });
        let bytes = serde_json::to_vec_pretty(&entry)
            .map_err(|e| TrustAdminError::Platform(e.to_string()))?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(alias, "alias already holds a key-pair, refusing to replace it");
                return Ok(false);
            }
            Err(e) => {
                return Err(platform_error(
                    format!("failed to create '{}'", path.display()),
                    &e,
                ))
            }
        };
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| platform_error(format!("failed to write '{}'", path.display()), &e))?;
        tracing::debug!(alias, "stored key-pair");
        Ok(true)
    }

    fn install_trust_anchor(&self, certificate: Vec<u8>) -> Result<bool, TrustAdminError> {
        let name = hex::encode_upper(Sha256::digest(&certificate));
        let path = self.anchors.join(format!("{name}.crt"));
        fs::write(&path, certificate)
            .map_err(|e| platform_error(format!("failed to write '{}'", path.display()), &e))?;
        Ok(true)
    }

    fn remove_key_pair(&self, alias: String) -> Result<bool, TrustAdminError> {
        let path = self.key_path(&alias)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(platform_error(
                format!("failed to remove '{}'", path.display()),
                &e,
            )),
        }
    }

    fn list_trust_anchors(&self) -> Result<Vec<Vec<u8>>, TrustAdminError> {
        let mut paths = fs::read_dir(&self.anchors)
            .map_err(|e| platform_error("failed to list trust anchors", &e))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "crt"))
            .collect::<Vec<_>>();
        paths.sort();

        paths
            .iter()
            .map(|path| {
                fs::read(path).map_err(|e| {
                    platform_error(format!("failed to read '{}'", path.display()), &e)
                })
            })
            .collect()
    }
}
