use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use super::metadata::{extract_fields, CertificateFields};
use super::safe_bags::{key_bags, KeyBagId};
use super::ParseError;

/// Key material selected from a PKCS#12 archive.
pub struct ParsedCredential {
    /// PKCS#8 DER private key. Wiped on drop.
    pub private_key: Zeroizing<Vec<u8>>,
    /// DER certificates, leaf first. Never empty.
    pub chain: Vec<Vec<u8>>,
    /// Fields of the leaf certificate.
    pub fields: CertificateFields,
    /// Friendly name of the entry inside the archive.
    pub entry_name: String,
}

impl std::fmt::Debug for ParsedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedCredential")
            .field("entry_name", &self.entry_name)
            .field("chain_len", &self.chain.len())
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Opens a password protected PKCS#12 archive and selects the first key bag
/// in archive storage order. Its certificate is the one carrying the same
/// `localKeyId`.
///
/// # Errors
///
/// - [`ParseError::BadFormat`] on a wrong password, a corrupt archive, or a
///   first key bag with no matching, decodable certificate
/// - [`ParseError::NoKeyEntry`] if the archive holds certificates only
pub fn parse_bundle(
    bytes: &[u8],
    password: &SecretString,
) -> Result<ParsedCredential, ParseError> {
    let keystore = KeyStore::from_pkcs12(bytes, password.expose_secret())
        .map_err(|err| ParseError::bad_format(format!("cannot open PKCS#12 archive: {err}")))?;
    let chains: Vec<(&String, &PrivateKeyChain)> = keystore
        .entries()
        .filter_map(|(name, entry)| match entry {
            KeyStoreEntry::PrivateKeyChain(chain) => Some((name, chain)),
            KeyStoreEntry::Certificate(_) => None,
        })
        .collect();

    let (entry_name, key_chain) = match key_bags(bytes)?.into_iter().next() {
        Some(first) => select(first, &chains)?,
        // key bags inside encrypted safes only show up after decryption
        None => chains
            .first()
            .map(|(name, chain)| ((*name).clone(), *chain))
            .ok_or(ParseError::NoKeyEntry)?,
    };

    let leaf = key_chain.chain().first().ok_or_else(|| {
        ParseError::bad_format(format!("key entry {entry_name} has no certificate"))
    })?;
    let fields = extract_fields(leaf.as_der())?;
    log::debug!("selected key entry {entry_name} ({})", fields.common_name);

    Ok(ParsedCredential {
        private_key: Zeroizing::new(key_chain.key().to_vec()),
        chain: key_chain
            .chain()
            .iter()
            .map(|cert| cert.as_der().to_vec())
            .collect(),
        fields,
        entry_name,
    })
}

fn select<'a>(
    bag: KeyBagId,
    chains: &[(&String, &'a PrivateKeyChain)],
) -> Result<(String, &'a PrivateKeyChain), ParseError> {
    let label = bag.friendly_name.as_deref().unwrap_or("<unnamed>");
    let local_key_id = bag.local_key_id.as_deref().ok_or_else(|| {
        ParseError::bad_format(format!("key entry {label} has no localKeyId"))
    })?;
    let (alias, chain) = chains
        .iter()
        .find(|(_, chain)| chain.local_key_id() == local_key_id)
        .ok_or_else(|| ParseError::bad_format(format!("key entry {label} has no certificate")))?;
    Ok((bag.friendly_name.unwrap_or_else(|| (*alias).clone()), *chain))
}
