//! Control-message vs document discrimination.
//!
//! WNS reports "nothing queued", rate limiting and account problems as
//! ordinary XML responses whose root element is `error` or `error-message`.
//! Classification is syntactic: only the root's local name decides which
//! path an envelope takes.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::document::Decoder;
use crate::envelope::charset;
use crate::error::FeedError;

/// Prefix of the vendor's rate limit message.
pub const RATE_LIMITED_PREFIX: &str = "Too frequent download";

/// Exact vendor text for an empty queue or directory.
pub const NO_NEW_DATA_MESSAGE: &str = "There are no files ready for transfer at the moment.";

const CONTROL_ROOTS: [&str; 2] = ["error", "error-message"];

/// Root element of a feed response, read without decoding the full document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub raw: &'a [u8],
    /// Local name of the root element (namespace prefix stripped).
    pub root: String,
    /// Raw inner content of the root element.
    pub text: String,
}

impl<'a> Envelope<'a> {
    /// Peek at the root element of already-decoded envelope text.
    pub fn peek(raw: &'a [u8], text: &str) -> Result<Self, FeedError> {
        let mut reader = Reader::from_str(text);
        loop {
            let event = reader
                .read_event()
                .map_err(|e| FeedError::Decode(format!("malformed envelope: {e}")))?;
            match event {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Text(t) if t.iter().all(u8::is_ascii_whitespace) => {}
                Event::Empty(start) => {
                    return Ok(Self {
                        raw,
                        root: local_name(&start),
                        text: String::new(),
                    });
                }
                Event::Start(start) => {
                    let root = local_name(&start);
                    let text = match reader.read_text(start.name()) {
                        Ok(inner) => inner.into_owned(),
                        Err(e) if is_control_root(&root) => {
                            return Err(FeedError::Decode(format!("malformed <{root}>: {e}")));
                        }
                        // Malformed documents are the decoder's problem.
                        Err(_) => String::new(),
                    };
                    return Ok(Self { raw, root, text });
                }
                Event::Eof => {
                    return Err(FeedError::Decode("envelope has no root element".into()));
                }
                _ => {
                    return Err(FeedError::Decode(
                        "unexpected content before root element".into(),
                    ));
                }
            }
        }
    }

    /// Whether the root element marks a vendor control message.
    pub fn is_control(&self) -> bool {
        is_control_root(&self.root)
    }

    /// Map a control envelope to its [`FeedError`]; `None` for documents.
    pub fn control_error(&self) -> Option<FeedError> {
        if !self.is_control() {
            return None;
        }
        let text = self.text.clone();
        Some(if text.starts_with(RATE_LIMITED_PREFIX) {
            FeedError::RateLimited(text)
        } else if text == NO_NEW_DATA_MESSAGE {
            FeedError::NoNewData(text)
        } else {
            FeedError::UnknownControlMessage(text)
        })
    }
}

/// Classify raw envelope bytes with an explicitly declared charset.
///
/// The bytes are decoded once; the same buffer is read for the root peek and
/// for the full document decode.
pub fn classify<D: Decoder>(
    decoder: &D,
    bytes: &[u8],
    declared_charset: Option<&str>,
) -> Result<D::Document, FeedError> {
    let text = charset::decode(bytes, declared_charset)?;
    let envelope = Envelope::peek(bytes, &text)?;
    if let Some(err) = envelope.control_error() {
        return Err(err);
    }
    decoder.decode(&text)
}

/// Classify raw envelope bytes, taking the charset from the XML declaration.
///
/// `fallback_charset` is used when the declaration names none, typically the
/// charset of the HTTP `Content-Type`.
pub fn classify_envelope<D: Decoder>(
    decoder: &D,
    bytes: &[u8],
    fallback_charset: Option<&str>,
) -> Result<D::Document, FeedError> {
    let declared = charset::declared_charset(bytes);
    classify(decoder, bytes, declared.as_deref().or(fallback_charset))
}

fn is_control_root(name: &str) -> bool {
    CONTROL_ROOTS.contains(&name)
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}
