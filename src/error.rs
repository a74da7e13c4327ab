//! Error types for the WNS feed client.

/// Construction-time errors. These are fatal and reported before any
/// streaming begins.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid source URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme {scheme:?}, expected {expected:?}")]
    UnsupportedScheme { scheme: String, expected: String },

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),
}

/// Errors surfaced while pulling the feed.
///
/// The first three variants are vendor control messages: syntactically valid
/// XML envelopes whose root is `error` or `error-message`. They carry the
/// vendor text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("No new files available ({0})")]
    NoNewData(String),

    #[error("Too frequent requests ({0})")]
    RateLimited(String),

    #[error("Unknown control message ({0})")]
    UnknownControlMessage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),
}

impl FeedError {
    /// Whether this error came from a vendor control envelope rather than
    /// from transport or decoding.
    pub fn is_control_message(&self) -> bool {
        matches!(
            self,
            FeedError::NoNewData(_)
                | FeedError::RateLimited(_)
                | FeedError::UnknownControlMessage(_)
        )
    }

    /// Whether the same request is expected to succeed on a later tick
    /// without any change on the caller's side.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FeedError::NoNewData(_)
                | FeedError::RateLimited(_)
                | FeedError::UnknownControlMessage(_)
                | FeedError::Transport(_)
        )
    }

    /// Short label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::NoNewData(_) => "no_new_data",
            FeedError::RateLimited(_) => "rate_limited",
            FeedError::UnknownControlMessage(_) => "unknown_control_message",
            FeedError::Transport(_) => "transport",
            FeedError::Decode(_) => "decode",
            FeedError::UnsupportedCharset(_) => "unsupported_charset",
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        FeedError::Transport(e.to_string())
    }
}

impl From<suppaftp::FtpError> for FeedError {
    fn from(e: suppaftp::FtpError) -> Self {
        FeedError::Transport(e.to_string())
    }
}
