//! Decoding of credential material: PKCS#12 bundles, X.509 certificates and
//! RFC 2253 distinguished names.

use thiserror::Error;

mod bundle;
mod dn;
mod metadata;
mod safe_bags;

pub use bundle::{parse_bundle, ParsedCredential};
pub use dn::{common_name, DistinguishedName, UNKNOWN_COMMON_NAME};
pub use metadata::{extract_fields, parse_trust_anchor, CertificateFields};

/// Failures while decoding credential material.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Wrong password, corrupt archive or undecodable certificate.
    #[error("parse_error: bad format: {reason}")]
    BadFormat {
        /// What failed to decode.
        reason: String,
    },
    /// The archive decoded but holds no private key entry.
    #[error("parse_error: archive holds no private key entry")]
    NoKeyEntry,
    /// A distinguished name string is not valid RFC 2253.
    #[error("parse_error: malformed distinguished name at offset {offset}: {reason}")]
    MalformedDn {
        /// Character offset of the failure.
        offset: usize,
        /// What was expected.
        reason: String,
    },
}

impl ParseError {
    pub(crate) fn bad_format(reason: impl Into<String>) -> Self {
        Self::BadFormat {
            reason: reason.into(),
        }
    }
}
