//! Charset allow-list for feed envelopes.
//!
//! The vendor declares the charset in the XML declaration (and sometimes in
//! the HTTP `Content-Type`). Only the charsets listed here are accepted; an
//! unknown label is an error and never falls back to a default.

use std::borrow::Cow;

use encoding_rs::UTF_8;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::FeedError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Charsets the feed is allowed to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

/// Resolve a declared charset label against the allow-list.
///
/// `None` means nothing was declared and resolves to UTF-8.
pub fn resolve(label: Option<&str>) -> Result<Charset, FeedError> {
    let Some(label) = label else {
        return Ok(Charset::Utf8);
    };
    match label.trim().to_ascii_uppercase().as_str() {
        "UTF-8" | "UTF8" => Ok(Charset::Utf8),
        "ISO-8859-1" | "ISO8859-1" | "ISO_8859-1" | "LATIN1" | "L1" => Ok(Charset::Latin1),
        _ => Err(FeedError::UnsupportedCharset(label.to_string())),
    }
}

/// Decode raw envelope bytes into text using the declared charset.
pub fn decode<'a>(bytes: &'a [u8], label: Option<&str>) -> Result<Cow<'a, str>, FeedError> {
    match resolve(label)? {
        Charset::Utf8 => {
            let (text, had_errors) = UTF_8.decode_with_bom_removal(bytes);
            if had_errors {
                return Err(FeedError::Decode(
                    "invalid UTF-8 byte sequence in envelope".into(),
                ));
            }
            Ok(text)
        }
        // Latin-1 has no invalid bytes.
        Charset::Latin1 => Ok(encoding_rs::mem::decode_latin1(bytes)),
    }
}

/// Read the `encoding` pseudo-attribute of the XML declaration, if any.
pub fn declared_charset(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Decl(decl)) => {
                return decl
                    .encoding()
                    .and_then(|enc| enc.ok())
                    .map(|enc| String::from_utf8_lossy(&enc).into_owned());
            }
            Ok(Event::Text(text)) if text.iter().all(u8::is_ascii_whitespace) => {}
            _ => return None,
        }
        buf.clear();
    }
}

/// Extract the `charset` parameter from a `Content-Type` header value.
pub fn content_type_charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
