use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;

use super::dn::{DistinguishedName, UNKNOWN_COMMON_NAME};
use super::ParseError;

/// Trackable fields of an X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct CertificateFields {
    /// First `CN` of the subject in RFC 2253 order, or `"Unknown CN"`.
    pub common_name: String,
    /// Subject in RFC 2253 form.
    pub subject_dn: String,
    /// Issuer in RFC 2253 form.
    pub issuer_dn: String,
    /// Serial number as upper case hex without prefix or zero padding.
    pub serial_number: String,
    /// Start of validity, unix seconds.
    pub valid_from: i64,
    /// End of validity, unix seconds.
    pub valid_to: i64,
    /// SHA-256 of the DER encoding, upper case hex.
    pub sha256_fingerprint: String,
}

/// Extracts [`CertificateFields`] from a DER encoded certificate.
///
/// # Errors
///
/// Returns [`ParseError::BadFormat`] if `der` is not an X.509 certificate.
pub fn extract_fields(der: &[u8]) -> Result<CertificateFields, ParseError> {
    let (_, cert) = parse_x509_certificate(der)
        .map_err(|err| ParseError::bad_format(format!("invalid certificate: {err}")))?;

    let subject = DistinguishedName::from_x509(cert.subject());
    let issuer = DistinguishedName::from_x509(cert.issuer());
    let validity = cert.validity();

    Ok(CertificateFields {
        common_name: subject
            .common_name()
            .unwrap_or_else(|| UNKNOWN_COMMON_NAME.to_string()),
        subject_dn: subject.to_string(),
        issuer_dn: issuer.to_string(),
        serial_number: serial_hex(cert.raw_serial()),
        valid_from: validity.not_before.timestamp(),
        valid_to: validity.not_after.timestamp(),
        sha256_fingerprint: hex::encode_upper(Sha256::digest(der)),
    })
}

/// Extracts [`CertificateFields`] from a single certificate in DER or PEM form.
///
/// # Errors
///
/// Returns [`ParseError::BadFormat`] if `bytes` hold neither.
pub fn parse_trust_anchor(bytes: &[u8]) -> Result<CertificateFields, ParseError> {
    if !is_pem(bytes) {
        return extract_fields(bytes);
    }

    let (_, pem) = parse_x509_pem(bytes)
        .map_err(|err| ParseError::bad_format(format!("invalid PEM: {err}")))?;
    if pem.label != "CERTIFICATE" {
        return Err(ParseError::bad_format(format!(
            "unexpected PEM label {}",
            pem.label
        )));
    }
    extract_fields(&pem.contents)
}

fn is_pem(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"-----BEGIN")
}

fn serial_hex(raw: &[u8]) -> String {
    let hex = hex::encode_upper(raw);
    match hex.trim_start_matches('0') {
        "" => "0".to_string(),
        trimmed => trimmed.to_string(),
    }
}
