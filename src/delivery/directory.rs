//! File-directory delivery: many discrete feed files, oldest first.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::delivery::DeliveryAdapter;
use crate::delivery::listing::{DirEntry, compute_missing, order_files};
use crate::diagnostics::{Diagnostics, NoopDiagnostics};
use crate::document::{BetData, Decoder, XmlDecoder};
use crate::envelope::classify_envelope;
use crate::error::FeedError;

/// Raw access to a remote feed directory.
///
/// Every call is one self-contained session: connect, authenticate, work,
/// disconnect.
#[async_trait]
pub trait DirectoryTransport: Send + Sync + 'static {
    /// List the base directory.
    async fn list(&self) -> Result<Vec<DirEntry>, FeedError>;

    /// Retrieve the named files in order within one session. Fails on the
    /// first file that cannot be read.
    async fn retrieve(&self, names: &[String]) -> Result<Vec<Vec<u8>>, FeedError>;

    /// Remove the named files.
    async fn remove(&self, names: &[String]) -> Result<(), FeedError>;
}

#[async_trait]
impl<T: DirectoryTransport> DirectoryTransport for Arc<T> {
    async fn list(&self) -> Result<Vec<DirEntry>, FeedError> {
        (**self).list().await
    }

    async fn retrieve(&self, names: &[String]) -> Result<Vec<Vec<u8>>, FeedError> {
        (**self).retrieve(names).await
    }

    async fn remove(&self, names: &[String]) -> Result<(), FeedError> {
        (**self).remove(names).await
    }
}

/// Directory adapter: orders the listing, decodes files, tracks nothing.
pub struct DirectoryAdapter<T, D = XmlDecoder<BetData>> {
    transport: T,
    decoder: D,
    diagnostics: Arc<dyn Diagnostics>,
}

impl<T: DirectoryTransport> DirectoryAdapter<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: XmlDecoder::new(),
            diagnostics: Arc::new(NoopDiagnostics),
        }
    }
}

impl<T: DirectoryTransport, D: Decoder> DirectoryAdapter<T, D> {
    /// Replace the document decoder.
    pub fn with_decoder<D2: Decoder>(self, decoder: D2) -> DirectoryAdapter<T, D2> {
        DirectoryAdapter {
            transport: self.transport,
            decoder,
            diagnostics: self.diagnostics,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Regular files in progress order: (modification time, name).
    pub async fn list_files(&self) -> Result<Vec<String>, FeedError> {
        let entries = self.transport.list().await?;
        Ok(order_files(entries))
    }

    /// Retrieve and decode the named files. Any failure discards the whole
    /// batch.
    pub async fn fetch_batch(&self, names: &[String]) -> Result<Vec<D::Document>, FeedError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self.transport.retrieve(names).await?;
        if raw.len() != names.len() {
            return Err(FeedError::Transport(format!(
                "requested {} files, retrieved {}",
                names.len(),
                raw.len()
            )));
        }

        let mut docs = Vec::with_capacity(names.len());
        for (name, bytes) in names.iter().zip(&raw) {
            self.diagnostics.envelope(name, bytes);
            let doc = classify_envelope(&self.decoder, bytes, None).map_err(|e| match e {
                FeedError::Decode(reason) => FeedError::Decode(format!("{name}: {reason}")),
                // Stored in a file, this is content, not an empty directory.
                FeedError::NoNewData(text) => {
                    FeedError::UnknownControlMessage(format!("{name}: {text}"))
                }
                other => other,
            })?;
            docs.push(doc);
        }
        debug!(files = names.len(), "Fetched directory batch");
        Ok(docs)
    }

    /// Remove processed files. Not atomic with [`fetch_batch`](Self::fetch_batch).
    pub async fn delete_batch(&self, names: &[String]) -> Result<(), FeedError> {
        if names.is_empty() {
            return Ok(());
        }
        self.transport.remove(names).await?;
        info!(files = names.len(), "Removed delivered feed files");
        Ok(())
    }

    /// Every document currently in the directory, oldest first, plus the
    /// name of the newest file. An empty directory yields `([], "")`.
    pub async fn snapshot(&self) -> Result<(Vec<D::Document>, String), FeedError> {
        let files = self.list_files().await?;
        let Some(last) = files.last().cloned() else {
            return Ok((Vec::new(), String::new()));
        };
        let docs = self.fetch_batch(&files).await?;
        Ok((docs, last))
    }
}

#[async_trait]
impl<T: DirectoryTransport, D: Decoder> DeliveryAdapter for DirectoryAdapter<T, D> {
    type Document = D::Document;

    fn name(&self) -> &str {
        "directory"
    }

    async fn discover(&self, cursor: &str) -> Result<Vec<String>, FeedError> {
        let files = self.list_files().await?;
        Ok(compute_missing(cursor, &files).to_vec())
    }

    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Self::Document>, FeedError> {
        DirectoryAdapter::fetch_batch(self, ids).await
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<(), FeedError> {
        DirectoryAdapter::delete_batch(self, ids).await
    }
}
