//! HTTP mailbox delivery: WNS "FileGet" single-slot queue.
//!
//! The server holds at most one pending document. Fetching without
//! deletion returns the same document again; fetching with deletion
//! consumes it and exposes the next one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::{MAILBOX_MIN_SPACING, MailboxConfig};
use crate::delivery::DeliveryAdapter;
use crate::diagnostics::{Diagnostics, NoopDiagnostics};
use crate::document::{BetData, Decoder, XmlDecoder};
use crate::envelope::{charset, classify_envelope};
use crate::error::{ConfigError, FeedError};

/// The mailbox has exactly one unnamed slot.
const MAILBOX_SLOT: &str = "";

/// HTTP-pull client for the WNS mailbox.
pub struct MailboxAdapter<D = XmlDecoder<BetData>> {
    url: Url,
    config: MailboxConfig,
    client: reqwest::Client,
    decoder: D,
    diagnostics: Arc<dyn Diagnostics>,
}

impl MailboxAdapter {
    /// Validate the config and build the HTTP client.
    pub fn new(config: MailboxConfig) -> Result<Self, ConfigError> {
        let url = Url::parse(&config.url).map_err(|e| ConfigError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
                expected: "http or https".into(),
            });
        }
        if config.bookmaker.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "bookmaker".into(),
                hint: "The Betradar bookmaker name is required".into(),
            });
        }

        // Every request opens its own connection.
        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(0);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            url,
            config,
            client,
            decoder: XmlDecoder::new(),
            diagnostics: Arc::new(NoopDiagnostics),
        })
    }
}

impl<D: Decoder> MailboxAdapter<D> {
    /// Replace the document decoder.
    pub fn with_decoder<D2: Decoder>(self, decoder: D2) -> MailboxAdapter<D2> {
        MailboxAdapter {
            url: self.url,
            config: self.config,
            client: self.client,
            decoder,
            diagnostics: self.diagnostics,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Fetch the queued document.
    ///
    /// With `delete_after` unset the document stays queued and the next
    /// fetch returns it again.
    pub async fn fetch(&self, delete_after: bool) -> Result<D::Document, FeedError> {
        debug!(delete_after, "Fetching WNS mailbox");
        let resp = self
            .client
            .get(self.url.clone())
            .query(&self.params("deleteAfterTransfer", yes_no(delete_after)))
            .send()
            .await?;

        let status = resp.status();
        let header_charset = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset::content_type_charset);
        let body = resp.bytes().await?;

        self.diagnostics.envelope(MAILBOX_SLOT, &body);
        let result = classify_envelope(&self.decoder, &body, header_charset.as_deref());
        if status.is_success() {
            return result;
        }

        // Only a vendor control envelope is trusted on an error status.
        match result {
            Err(e) if e.is_control_message() => Err(e),
            _ => Err(FeedError::Transport(format!("mailbox returned HTTP {status}"))),
        }
    }

    /// Purge every queued document. The response body is ignored.
    pub async fn clear(&self) -> Result<(), FeedError> {
        self.client
            .get(self.url.clone())
            .query(&self.params("deleteFullQueue", "yes"))
            .send()
            .await?;
        info!(bookmaker = %self.config.bookmaker, "Cleared WNS mailbox queue");
        Ok(())
    }

    fn params<'a>(&'a self, flag: &'a str, value: &'a str) -> [(&'a str, &'a str); 4] {
        [
            ("bookmakerName", self.config.bookmaker.as_str()),
            ("key", self.config.key.expose_secret()),
            ("xmlFeedName", "FileGet"),
            (flag, value),
        ]
    }
}

#[async_trait]
impl<D: Decoder> DeliveryAdapter for MailboxAdapter<D> {
    type Document = D::Document;

    fn name(&self) -> &str {
        "mailbox"
    }

    fn min_interval(&self) -> Option<Duration> {
        Some(MAILBOX_MIN_SPACING)
    }

    async fn discover(&self, _cursor: &str) -> Result<Vec<String>, FeedError> {
        // The slot's content is only known by fetching it.
        Ok(vec![MAILBOX_SLOT.to_string()])
    }

    async fn fetch_batch(&self, _ids: &[String]) -> Result<Vec<Self::Document>, FeedError> {
        self.fetch(true).await.map(|doc| vec![doc])
    }

    async fn delete_batch(&self, _ids: &[String]) -> Result<(), FeedError> {
        // Consumed on transfer.
        Ok(())
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
