//! In-memory feed directory for tests and offline replay.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::delivery::directory::DirectoryTransport;
use crate::delivery::listing::{DirEntry, EntryKind};
use crate::error::FeedError;

#[derive(Debug, Clone)]
struct StoredFile {
    modified: DateTime<Utc>,
    bytes: Vec<u8>,
}

/// A directory held in memory. Each transport call counts as one session.
#[derive(Debug)]
pub struct MemoryDirectory {
    files: Mutex<BTreeMap<String, StoredFile>>,
    subdirs: Mutex<Vec<DirEntry>>,
    available: AtomicBool,
    sessions: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            subdirs: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            sessions: AtomicUsize::new(0),
        }
    }

    /// Add or replace a file.
    pub fn insert(&self, name: impl Into<String>, modified: DateTime<Utc>, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), StoredFile { modified, bytes });
    }

    /// Add a subdirectory entry; it shows up in listings but holds nothing.
    pub fn insert_dir(&self, name: impl Into<String>, modified: DateTime<Utc>) {
        self.subdirs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(DirEntry {
                name: name.into(),
                modified,
                kind: EntryKind::Directory,
            });
    }

    /// Simulate the server going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of sessions opened so far.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    fn open_session(&self) -> Result<(), FeedError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FeedError::Transport("connection refused".into()))
        }
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectoryTransport for MemoryDirectory {
    async fn list(&self) -> Result<Vec<DirEntry>, FeedError> {
        self.open_session()?;
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<DirEntry> = files
            .iter()
            .map(|(name, file)| DirEntry::file(name.clone(), file.modified))
            .collect();
        entries.extend(
            self.subdirs
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned(),
        );
        Ok(entries)
    }

    async fn retrieve(&self, names: &[String]) -> Result<Vec<Vec<u8>>, FeedError> {
        self.open_session()?;
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        names
            .iter()
            .map(|name| {
                files
                    .get(name)
                    .map(|file| file.bytes.clone())
                    .ok_or_else(|| FeedError::Transport(format!("550 {name}: no such file")))
            })
            .collect()
    }

    async fn remove(&self, names: &[String]) -> Result<(), FeedError> {
        self.open_session()?;
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        for name in names {
            if files.remove(name).is_none() {
                return Err(FeedError::Transport(format!("550 {name}: no such file")));
            }
        }
        Ok(())
    }
}
