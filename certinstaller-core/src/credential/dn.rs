//! RFC 2253 distinguished names.
//!
//! Names are modelled as a list of relative distinguished names in RFC 2253
//! order, which is the reverse of the order they are encoded in a
//! certificate. Attribute types with an RFC 2253 keyword are rendered with it;
//! everything else uses the dotted OID and the hex form of the DER value.

use std::fmt;

use x509_parser::x509::{AttributeTypeAndValue, X509Name};

use super::ParseError;

/// Placeholder used when a name has no common name.
pub const UNKNOWN_COMMON_NAME: &str = "Unknown CN";

const KEYWORDS: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "STREET"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("0.9.2342.19200300.100.1.1", "UID"),
    ("0.9.2342.19200300.100.1.25", "DC"),
];

const BMP_STRING_TAG: u32 = 30;

fn keyword_for(oid: &str) -> Option<&'static str> {
    KEYWORDS
        .iter()
        .find(|(dotted, _)| *dotted == oid)
        .map(|(_, keyword)| *keyword)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeValue {
    Text(String),
    /// DER encoding of the value, written as `#hex`.
    Encoded(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    /// RFC 2253 keyword in upper case, or a dotted OID.
    kind: String,
    value: AttributeValue,
}

impl Attribute {
    fn from_x509(atv: &AttributeTypeAndValue<'_>) -> Self {
        let oid = atv.attr_type().to_id_string();
        let text = atv
            .as_str()
            .map(str::to_string)
            .ok()
            .or_else(|| decode_bmp_string(atv));

        match (keyword_for(&oid), text) {
            (Some(keyword), Some(text)) => Self {
                kind: keyword.to_string(),
                value: AttributeValue::Text(text),
            },
            (keyword, _) => Self {
                kind: keyword.map_or(oid, str::to_string),
                value: AttributeValue::Encoded(encode_der(atv)),
            },
        }
    }

    fn text(&self) -> Option<String> {
        match &self.value {
            AttributeValue::Text(text) => Some(text.clone()),
            AttributeValue::Encoded(der) => decode_der_string(der),
        }
    }
}

fn decode_bmp_string(atv: &AttributeTypeAndValue<'_>) -> Option<String> {
    let any = atv.attr_value();
    if any.header.tag().0 != BMP_STRING_TAG || any.data.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = any
        .data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

fn encode_der(atv: &AttributeTypeAndValue<'_>) -> Vec<u8> {
    let any = atv.attr_value();
    let tag = any.header.tag().0;
    let data = any.data;
    let Ok(tag) = u8::try_from(tag) else {
        return data.to_vec();
    };
    if tag >= 31 {
        return data.to_vec();
    }

    let mut out = Vec::with_capacity(data.len() + 6);
    let constructed = if any.header.is_constructed() { 0x20 } else { 0 };
    out.push(((any.header.class() as u8) << 6) | constructed | tag);
    push_der_length(&mut out, data.len());
    out.extend_from_slice(data);
    out
}

fn push_der_length(out: &mut Vec<u8>, len: usize) {
    if let Ok(short) = u8::try_from(len) {
        if short < 0x80 {
            out.push(short);
            return;
        }
    }
    let bytes = len.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    let significant = &bytes[first..];
    // at most size_of::<usize>() bytes, always below 0x7f
    out.push(0x80 | u8::try_from(significant.len()).unwrap_or(0x7f));
    out.extend_from_slice(significant);
}

/// Decodes a DER encoded directory string (UTF8, Printable, IA5, T61, Visible).
fn decode_der_string(der: &[u8]) -> Option<String> {
    let (&tag, rest) = der.split_first()?;
    if !matches!(tag, 0x0C | 0x13 | 0x14 | 0x16 | 0x1A) {
        return None;
    }
    let (&len, rest) = rest.split_first()?;
    let content = match len {
        0..=0x7f => rest.get(..usize::from(len))?,
        0x81 => {
            let (&len, rest) = rest.split_first()?;
            rest.get(..usize::from(len))?
        }
        _ => return None,
    };
    String::from_utf8(content.to_vec()).ok()
}

/// A distinguished name in RFC 2253 order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    rdns: Vec<Vec<Attribute>>,
}

impl DistinguishedName {
    /// Converts a certificate name. The RDN sequence is reversed into RFC 2253 order.
    #[must_use]
    pub fn from_x509(name: &X509Name<'_>) -> Self {
        let mut rdns: Vec<Vec<Attribute>> = name
            .iter_rdn()
            .map(|rdn| rdn.iter().map(Attribute::from_x509).collect())
            .collect();
        rdns.reverse();
        Self { rdns }
    }

    /// Parses an RFC 2253 string.
    ///
    /// Accepts `,` and `;` between RDNs, `+` inside multi-valued RDNs, quoted
    /// values, backslash escapes (including `\XX` hex pairs), `#hex` values and
    /// the `OID.` prefix on dotted attribute types.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MalformedDn`] when the string is not a valid name.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Parser::new(input).distinguished_name()
    }

    /// Value of the first `CN` attribute in RFC 2253 order.
    #[must_use]
    pub fn common_name(&self) -> Option<String> {
        self.rdns
            .iter()
            .flatten()
            .filter(|attr| attr.kind == "CN")
            .find_map(Attribute::text)
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            for (j, attr) in rdn.iter().enumerate() {
                if j > 0 {
                    out.push('+');
                }
                out.push_str(&attr.kind);
                out.push('=');
                match &attr.value {
                    AttributeValue::Text(text) => escape_into(text, &mut out),
                    AttributeValue::Encoded(der) => {
                        out.push('#');
                        out.push_str(&hex::encode(der));
                    }
                }
            }
        }
        f.write_str(&out)
    }
}

fn escape_into(value: &str, out: &mut String) {
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let special = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && matches!(c, '#' | ' '))
            || (i == last && c == ' ');
        if special {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Common name of an RFC 2253 string, or [`UNKNOWN_COMMON_NAME`] when the
/// string has no `CN` attribute or cannot be parsed.
#[must_use]
pub fn common_name(dn: &str) -> String {
    DistinguishedName::parse(dn)
        .ok()
        .and_then(|name| name.common_name())
        .unwrap_or_else(|| UNKNOWN_COMMON_NAME.to_string())
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError::MalformedDn {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn distinguished_name(mut self) -> Result<DistinguishedName, ParseError> {
        self.skip_spaces();
        if self.peek().is_none() {
            return Ok(DistinguishedName::default());
        }

        let mut rdns = Vec::new();
        loop {
            rdns.push(self.rdn()?);
            match self.bump() {
                None => break,
                Some(',' | ';') => {}
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            }
        }
        Ok(DistinguishedName { rdns })
    }

    fn rdn(&mut self) -> Result<Vec<Attribute>, ParseError> {
        let mut attributes = vec![self.attribute()?];
        while self.peek() == Some('+') {
            self.pos += 1;
            attributes.push(self.attribute()?);
        }
        Ok(attributes)
    }

    fn attribute(&mut self) -> Result<Attribute, ParseError> {
        self.skip_spaces();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '=' {
                break;
            }
            if matches!(c, ',' | ';' | '+') {
                return Err(self.error("expected '=' after attribute type"));
            }
            self.pos += 1;
        }
        if self.peek() != Some('=') {
            return Err(self.error("expected '=' after attribute type"));
        }
        let raw_kind: String = self.chars[start..self.pos].iter().collect();
        let kind = self.attribute_kind(raw_kind.trim())?;
        self.pos += 1;
        self.skip_spaces();

        let value = match self.peek() {
            Some('#') => {
                self.pos += 1;
                AttributeValue::Encoded(self.hex_value()?)
            }
            Some('"') => {
                self.pos += 1;
                AttributeValue::Text(self.quoted_value()?)
            }
            _ => AttributeValue::Text(self.plain_value()?),
        };
        Ok(Attribute { kind, value })
    }

    fn attribute_kind(&self, raw: &str) -> Result<String, ParseError> {
        let stripped = raw
            .get(..4)
            .filter(|prefix| prefix.eq_ignore_ascii_case("oid."))
            .map_or(raw, |_| &raw[4..]);

        if stripped.is_empty() {
            return Err(self.error("empty attribute type"));
        }

        if stripped.starts_with(|c: char| c.is_ascii_digit()) {
            let dotted = stripped
                .split('.')
                .all(|arc| !arc.is_empty() && arc.chars().all(|c| c.is_ascii_digit()));
            if !dotted {
                return Err(self.error(format!("invalid OID '{stripped}'")));
            }
            return Ok(keyword_for(stripped).map_or_else(|| stripped.to_string(), str::to_string));
        }

        if !stripped
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(self.error(format!("invalid attribute type '{stripped}'")));
        }
        Ok(stripped.to_ascii_uppercase())
    }

    fn escaped(&mut self, bytes: &mut Vec<u8>) -> Result<(), ParseError> {
        match self.bump() {
            Some(c @ (',' | '=' | '+' | '<' | '>' | '#' | ';' | '\\' | '"' | ' ')) => {
                push_char(bytes, c);
                Ok(())
            }
            Some(high) if high.is_ascii_hexdigit() => match self.bump() {
                Some(low) if low.is_ascii_hexdigit() => {
                    let pair: String = [high, low].iter().collect();
                    let byte = u8::from_str_radix(&pair, 16)
                        .map_err(|_| self.error("invalid hex pair"))?;
                    bytes.push(byte);
                    Ok(())
                }
                _ => Err(self.error("incomplete hex pair")),
            },
            _ => Err(self.error("invalid escape")),
        }
    }

    fn plain_value(&mut self) -> Result<String, ParseError> {
        let mut bytes = Vec::new();
        let mut significant = 0;
        while let Some(c) = self.peek() {
            match c {
                ',' | ';' | '+' => break,
                '"' => return Err(self.error("unescaped quote in value")),
                '\\' => {
                    self.pos += 1;
                    self.escaped(&mut bytes)?;
                    significant = bytes.len();
                }
                _ => {
                    self.pos += 1;
                    push_char(&mut bytes, c);
                    if c != ' ' {
                        significant = bytes.len();
                    }
                }
            }
        }
        bytes.truncate(significant);
        String::from_utf8(bytes).map_err(|_| self.error("value is not valid UTF-8"))
    }

    fn quoted_value(&mut self) -> Result<String, ParseError> {
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated quoted value")),
                Some('"') => break,
                Some('\\') => self.escaped(&mut bytes)?,
                Some(c) => push_char(&mut bytes, c),
            }
        }
        self.skip_spaces();
        String::from_utf8(bytes).map_err(|_| self.error("value is not valid UTF-8"))
    }

    fn hex_value(&mut self) -> Result<Vec<u8>, ParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        self.skip_spaces();
        if digits.is_empty() {
            return Err(self.error("empty hex value"));
        }
        hex::decode(&digits).map_err(|err| self.error(format!("invalid hex value: {err}")))
    }
}

fn push_char(bytes: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("CN=Jane Doe,O=ExampleCorp,C=US", "Jane Doe" ; "leading cn")]
    #[test_case("C=US,O=ExampleCorp,CN=Jane Doe", "Jane Doe" ; "trailing cn")]
    #[test_case("cn=jane", "jane" ; "lower case keyword")]
    #[test_case("CN=Doe\\, Jane,O=ExampleCorp", "Doe, Jane" ; "escaped comma")]
    #[test_case("CN=\"Doe, Jane\",O=ExampleCorp", "Doe, Jane" ; "quoted value")]
    #[test_case("CN=J\\C3\\A9r\\C3\\B4me", "Jérôme" ; "hex pairs")]
    #[test_case("OU=Eng+CN=Jane,O=ExampleCorp", "Jane" ; "multi valued rdn")]
    #[test_case("OID.2.5.4.3=Jane", "Jane" ; "oid prefix")]
    #[test_case("2.5.4.3=Jane", "Jane" ; "dotted oid")]
    #[test_case("CN=#0c044a616e65", "Jane" ; "hex encoded utf8 string")]
    #[test_case("O=ExampleCorp; CN = Jane Doe ", "Jane Doe" ; "semicolon and spaces")]
    #[test_case("CN=Zoë 日本,O=Ünïcode", "Zoë 日本" ; "unicode")]
    #[test_case("CN=first,CN=second", "first" ; "first cn wins")]
    fn test_common_name(dn: &str, expected: &str) {
        assert_eq!(common_name(dn), expected);
    }

    #[test_case("O=ExampleCorp,C=US" ; "no cn")]
    #[test_case("" ; "empty")]
    #[test_case("CN" ; "missing equals")]
    #[test_case("CN=\"unterminated" ; "unterminated quote")]
    #[test_case("CN=bad\\q" ; "invalid escape")]
    fn test_unknown_common_name(dn: &str) {
        assert_eq!(common_name(dn), UNKNOWN_COMMON_NAME);
    }

    #[test]
    fn test_malformed_dn_reports_offset() {
        match DistinguishedName::parse("CN=a,O") {
            Err(ParseError::MalformedDn { offset, .. }) => assert_eq!(offset, 6),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test_case("CN=Jane Doe,O=ExampleCorp,C=US" ; "plain")]
    #[test_case("CN=Doe\\, Jane\\+Co,O=A\\;B" ; "escapes")]
    #[test_case("CN=\\#hash,O=\\ padded\\ " ; "leading hash and spaces")]
    #[test_case("OU=Eng+CN=Jane,1.2.840.113549.1.9.1=#160c6a616e65406578616d706c65" ; "oid and hex")]
    fn test_display_is_canonical(dn: &str) {
        let parsed = DistinguishedName::parse(dn).expect("parse");
        assert_eq!(parsed.to_string(), dn);
        assert_eq!(DistinguishedName::parse(&parsed.to_string()).expect("reparse"), parsed);
    }

    #[test]
    fn test_quoted_value_renders_escaped() {
        let parsed = DistinguishedName::parse("CN=\"a,b\"").expect("parse");
        assert_eq!(parsed.to_string(), "CN=a\\,b");
    }

    #[test]
    fn test_der_length_encoding() {
        let mut short = Vec::new();
        push_der_length(&mut short, 5);
        assert_eq!(short, vec![5]);

        let mut long = Vec::new();
        push_der_length(&mut long, 300);
        assert_eq!(long, vec![0x82, 0x01, 0x2C]);
    }
}
