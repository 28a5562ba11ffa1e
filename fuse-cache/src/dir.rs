//! Directory listings

use crate::types::{FileIdentity, FileType};

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use memchr::memchr;

/// An entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// i-number
    pub ino: FileIdentity,
    /// file type
    pub file_type: FileType,
    /// name (without NUL)
    pub name: OsString,
}

/// A name which can not appear in a directory
#[derive(Debug, thiserror::Error)]
pub enum NameError {
    #[error("empty entry name")]
    Empty,

    #[error("interior nul byte in entry name at position {pos}")]
    Nul { pos: usize },
}

/// An ordered directory listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Directory {
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap),
        }
    }

    /// Appends an entry
    pub fn add_entry(
        &mut self,
        ino: FileIdentity,
        file_type: FileType,
        name: &[u8],
    ) -> Result<&mut Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if let Some(pos) = memchr(0, name) {
            return Err(NameError::Nul { pos });
        }
        self.entries.push(DirEntry {
            ino,
            file_type,
            name: OsStr::from_bytes(name).to_owned(),
        });
        Ok(self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns at most `count` entries starting at `offset`.
    /// An offset past the end yields an empty listing.
    #[must_use]
    pub fn window(&self, offset: usize, count: usize) -> &[DirEntry] {
        let start = offset.min(self.entries.len());
        let end = start.saturating_add(count).min(self.entries.len());
        &self.entries[start..end]
    }

    /// Looks up an entry by name
    #[must_use]
    pub fn find(&self, name: &[u8]) -> Option<&DirEntry> {
        self.entries.iter().find(|e| e.name.as_bytes() == name)
    }
}
