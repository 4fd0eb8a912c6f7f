//! Vendor form encoding.
//!
//! Outbound, the gateway expects what the reference kit produces: classic
//! `application/x-www-form-urlencoded` with `:` and `/` left literal, so
//! URLs inside values stay readable. Inbound, [`parse_strict`] accepts only
//! a narrow, unambiguous subset of the same grammar. Everything it rejects
//! is either a broken client or a tampered payload.

use std::collections::HashSet;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Bytes left unescaped: alphanumerics plus `_.-~:/`.
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b':')
    .remove(b'/');

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Appends one encoded component to `out`. Spaces become `+`.
pub fn encode_component_into(out: &mut String, value: &str) {
    for (i, part) in value.split(' ').enumerate() {
        if i > 0 {
            out.push('+');
        }
        for chunk in utf8_percent_encode(part, FORM) {
            out.push_str(chunk);
        }
    }
}

/// Encodes one component.
pub fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    encode_component_into(&mut out, value);
    out
}

/// Joins `key=value` pairs with `&`, in the order given.
///
/// The output buffer is zeroizing since request plaintexts carry the
/// tranportal password.
pub fn encode_pairs<'a, I>(pairs: I) -> Zeroizing<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = Zeroizing::new(String::with_capacity(256));
    for (i, (key, value)) in pairs.into_iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        encode_component_into(&mut out, key);
        out.push('=');
        encode_component_into(&mut out, value);
    }
    out
}

// ---------------------------------------------------------------------------
// Strict parsing
// ---------------------------------------------------------------------------

/// Why a form payload was rejected. Values are never echoed back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("payload is empty")]
    Empty,

    #[error("byte 0x{byte:02x} at offset {offset} is not printable ASCII")]
    NonPrintable { offset: usize, byte: u8 },

    #[error("segment {segment} has no '='")]
    MissingSeparator { segment: usize },

    #[error("segment {segment} has an empty key")]
    EmptyKey { segment: usize },

    #[error("segment {segment} has a malformed percent escape")]
    BadEscape { segment: usize },

    #[error("segment {segment} does not decode to UTF-8")]
    NonUtf8 { segment: usize },

    #[error("segment {segment} decodes to a control character")]
    ControlCharacter { segment: usize },

    #[error("duplicate key {0:?}")]
    DuplicateKey(String),
}

/// Decoded key/value pairs in wire order, unique by key.
///
/// Values are wiped when the set is dropped.
#[derive(Default)]
pub struct FormFields {
    pairs: Vec<(String, String)>,
}

impl FormFields {
    /// Value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl Drop for FormFields {
    fn drop(&mut self) {
        for (key, value) in self.pairs.iter_mut() {
            key.zeroize();
            value.zeroize();
        }
    }
}

impl std::fmt::Debug for FormFields {
    /// Keys only.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.pairs.iter().map(|(k, _)| k)).finish()
    }
}

fn decode_component(raw: &str, segment: usize) -> Result<String, FormError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape_ok = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !escape_ok {
                return Err(FormError::BadEscape { segment });
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = raw.replace('+', " ");
    let decoded = percent_decode_str(&spaced)
        .decode_utf8()
        .map_err(|_| FormError::NonUtf8 { segment })?
        .into_owned();
    if decoded.chars().any(char::is_control) {
        return Err(FormError::ControlCharacter { segment });
    }
    Ok(decoded)
}

/// Parses a form payload, rejecting anything outside the strict subset:
///
/// - every byte is printable ASCII (`0x21..=0x7E`, so no raw spaces);
/// - `&`-separated segments, each `key=value` with a non-empty key;
/// - `%` always followed by two hex digits;
/// - decoded text is UTF-8 without control characters;
/// - no key appears twice.
pub fn parse_strict(input: &[u8]) -> Result<FormFields, FormError> {
    if input.is_empty() {
        return Err(FormError::Empty);
    }
    if let Some((offset, &byte)) = input
        .iter()
        .enumerate()
        .find(|(_, b)| !(0x21..=0x7E).contains(*b))
    {
        return Err(FormError::NonPrintable { offset, byte });
    }
    // Printable ASCII is valid UTF-8.
    let text = std::str::from_utf8(input).map_err(|_| FormError::NonUtf8 { segment: 0 })?;

    let mut fields = FormFields::default();
    let mut seen = HashSet::new();
    for (segment, part) in text.split('&').enumerate() {
        let (raw_key, raw_value) = part
            .split_once('=')
            .ok_or(FormError::MissingSeparator { segment })?;
        if raw_key.is_empty() {
            return Err(FormError::EmptyKey { segment });
        }
        let key = decode_component(raw_key, segment)?;
        let value = decode_component(raw_value, segment)?;
        if key.is_empty() {
            return Err(FormError::EmptyKey { segment });
        }
        if !seen.insert(key.clone()) {
            return Err(FormError::DuplicateKey(key));
        }
        fields.pairs.push((key, value));
    }
    Ok(fields)
}
