//! Walks the SafeBags of a PKCS#12 archive in the order they are stored.
//!
//! Key bags and their attributes live in plain `data` safes in the archives
//! produced by common tooling, so their order and `localKeyId` can be read
//! without the password. Safes encrypted as a whole are skipped.

use cms::content_info::ContentInfo;
use der::asn1::{BmpString, ObjectIdentifier, OctetString};
use der::{Decode, Encode};
use pkcs12::authenticated_safe::AuthenticatedSafe;
use pkcs12::pfx::Pfx;
use pkcs12::safe_bag::{SafeBag, SafeContents};
use pkcs12::PKCS_12_PKCS8_KEY_BAG_OID;

use super::ParseError;

pub(crate) const DATA_CONTENT_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const FRIENDLY_NAME_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.20");
const LOCAL_KEY_ID_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.21");

/// Identity of a shrouded key bag, as found in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBagId {
    /// `localKeyId` attribute pairing the key with its certificate.
    pub local_key_id: Option<Vec<u8>>,
    /// `friendlyName` attribute.
    pub friendly_name: Option<String>,
}

fn malformed(err: &der::Error) -> ParseError {
    ParseError::bad_format(format!("malformed PKCS#12 structure: {err}"))
}

/// Decodes the `AuthenticatedSafe` sequence of a PFX.
fn authenticated_safe(bytes: &[u8]) -> Result<Vec<ContentInfo>, ParseError> {
    let pfx = Pfx::from_der(bytes).map_err(|e| malformed(&e))?;
    if pfx.auth_safe.content_type != DATA_CONTENT_OID {
        return Err(ParseError::bad_format(
            "authenticated safe is not plain data (public-key integrity mode)",
        ));
    }
    let content = plain_content(&pfx.auth_safe)?;
    AuthenticatedSafe::from_der(content.as_bytes()).map_err(|e| malformed(&e))
}

fn plain_content(info: &ContentInfo) -> Result<OctetString, ParseError> {
    let encoded = info.content.to_der().map_err(|e| malformed(&e))?;
    OctetString::from_der(&encoded).map_err(|e| malformed(&e))
}

fn attribute(bag: &SafeBag, oid: ObjectIdentifier) -> Option<Vec<u8>> {
    bag.bag_attributes.as_ref()?.iter().find_map(|attr| {
        if attr.oid == oid {
            attr.values.iter().next().and_then(|value| value.to_der().ok())
        } else {
            None
        }
    })
}

/// Lists the shrouded key bags of the archive in storage order.
///
/// # Errors
///
/// [`ParseError::BadFormat`] if the outer structure does not decode.
pub fn key_bags(bytes: &[u8]) -> Result<Vec<KeyBagId>, ParseError> {
    let mut found = Vec::new();
    for safe in authenticated_safe(bytes)? {
        if safe.content_type != DATA_CONTENT_OID {
            continue;
        }
        let content = plain_content(&safe)?;
        let bags = SafeContents::from_der(content.as_bytes()).map_err(|e| malformed(&e))?;
        found.extend(
            bags.iter()
                .filter(|bag| bag.bag_id == PKCS_12_PKCS8_KEY_BAG_OID)
                .map(|bag| KeyBagId {
                    local_key_id: attribute(bag, LOCAL_KEY_ID_OID).and_then(|der| {
                        OctetString::from_der(&der)
                            .ok()
                            .map(|id| id.as_bytes().to_vec())
                    }),
                    friendly_name: attribute(bag, FRIENDLY_NAME_OID).and_then(|der| {
                        BmpString::from_der(&der).ok().map(|name| name.to_string())
                    }),
                }),
        );
    }
    Ok(found)
}
