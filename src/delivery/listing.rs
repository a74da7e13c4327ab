//! Directory listings and the progress order of feed files.
//!
//! Files are ordered by server modification time with the filename as
//! tie-break. That order is the axis the resume cursor moves along.

use chrono::{DateTime, Utc};

/// Kind of a remote directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Link,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub modified: DateTime<Utc>,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn file(name: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            modified,
            kind: EntryKind::File,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Sort entries by (modification time, name) and keep regular files only.
pub fn order_files(mut entries: Vec<DirEntry>) -> Vec<String> {
    entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
    entries
        .into_iter()
        .filter(DirEntry::is_file)
        .map(|entry| entry.name)
        .collect()
}

/// Files strictly after `cursor` in an ordered listing.
///
/// A cursor that is empty or no longer listed (rotated out of the directory)
/// yields the whole listing.
pub fn compute_missing<'a>(cursor: &str, ordered: &'a [String]) -> &'a [String] {
    match ordered.iter().position(|name| name == cursor) {
        Some(i) => &ordered[i + 1..],
        None => ordered,
    }
}
