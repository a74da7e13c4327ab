//! Delivery adapters: the two ways WNS hands out documents.
//!
//! - [`MailboxAdapter`]: HTTP pull, one queued document at a time.
//! - [`DirectoryAdapter`]: FTP pull, a directory of timestamped files.
//!
//! Both implement [`DeliveryAdapter`], so the sync engine never needs to
//! know which delivery model it is driving.

pub mod directory;
pub mod ftp;
pub mod listing;
pub mod mailbox;
pub mod memory;

pub use directory::{DirectoryAdapter, DirectoryTransport};
pub use ftp::FtpDirectory;
pub use listing::{DirEntry, EntryKind, compute_missing, order_files};
pub use mailbox::MailboxAdapter;
pub use memory::MemoryDirectory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FeedError;

/// Discover, fetch and delete units of work from a feed source.
///
/// Identifiers are filenames for the directory model; the mailbox has a
/// single unnamed slot whose identifier is the empty string.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync + 'static {
    type Document: Send + 'static;

    /// Short name for logs.
    fn name(&self) -> &str;

    /// Shortest request spacing the source tolerates, if it enforces one.
    fn min_interval(&self) -> Option<Duration> {
        None
    }

    /// Identifiers of work not yet delivered after `cursor`, in order.
    async fn discover(&self, cursor: &str) -> Result<Vec<String>, FeedError>;

    /// Retrieve and decode a batch. All-or-nothing.
    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Self::Document>, FeedError>;

    /// Remove delivered items from the source.
    async fn delete_batch(&self, ids: &[String]) -> Result<(), FeedError>;
}
