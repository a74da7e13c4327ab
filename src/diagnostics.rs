//! Diagnostics hooks: raw envelope capture and tick outcomes.
//!
//! Adapters report every raw envelope they receive before classification;
//! the engine reports the outcome of every tick. The default is a no-op.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, warn};

use crate::engine::TickOutcome;

/// Observer for raw feed traffic and engine progress.
///
/// Hooks are called from async code and must not block.
pub trait Diagnostics: Send + Sync {
    /// A raw envelope arrived. `source` is the filename, or empty for the
    /// HTTP mailbox.
    fn envelope(&self, source: &str, bytes: &[u8]);

    /// A tick finished.
    fn tick(&self, _outcome: &TickOutcome) {}
}

/// Diagnostics that record nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {
    fn envelope(&self, _source: &str, _bytes: &[u8]) {}
}

/// Writes every raw envelope to `wns-debug-<unix>-<seq>.xml` in a directory.
///
/// Inside a tokio runtime the write runs on the blocking pool.
#[derive(Debug)]
pub struct EnvelopeDump {
    dir: PathBuf,
    seq: AtomicU64,
}

impl EnvelopeDump {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// Build from `WNS_DEBUG_DIR`. Returns `None` if the variable is unset.
    pub fn from_env() -> Option<Self> {
        std::env::var("WNS_DEBUG_DIR").ok().map(Self::new)
    }
}

impl Diagnostics for EnvelopeDump {
    fn envelope(&self, source: &str, bytes: &[u8]) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("wns-debug-{}-{seq}.xml", Utc::now().timestamp()));
        let source = source.to_string();
        let bytes = bytes.to_vec();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || write_dump(&path, &source, &bytes));
            }
            Err(_) => write_dump(&path, &source, &bytes),
        }
    }
}

fn write_dump(path: &Path, source: &str, bytes: &[u8]) {
    match std::fs::write(path, bytes) {
        Ok(()) => debug!(source = %source, path = %path.display(), "Dumped raw envelope"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to dump raw envelope"),
    }
}
