//! Node attributes and entry replies

use crate::types::{FileIdentity, FileType, StMode};

use std::time::{Duration, SystemTime};

/// Attributes of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub ino: FileIdentity,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub mode: StMode,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
}

impl Default for Attr {
    fn default() -> Self {
        Self {
            ino: 0,
            size: 0,
            blocks: 0,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            mode: StMode::default(),
            nlink: 0,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 0,
        }
    }
}

impl Attr {
    setters!(
        ino: FileIdentity,
        size: u64,
        blocks: u64,
        atime: SystemTime,
        mtime: SystemTime,
        ctime: SystemTime,
        mode: StMode,
        nlink: u32,
        uid: u32,
        gid: u32,
        rdev: u32,
        blksize: u32,
    );

    /// The file type encoded in `mode`
    #[must_use]
    pub fn file_type(&self) -> FileType {
        self.mode.file_type()
    }
}

/// The reply of a lookup and of node-creating operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Entry {
    pub nodeid: FileIdentity,
    pub generation: u64,
    pub attr: Attr,
    pub entry_valid: Duration,
    pub attr_valid: Duration,
}

impl Entry {
    setters!(
        nodeid: FileIdentity,
        generation: u64,
        attr: Attr,
        entry_valid: Duration,
        attr_valid: Duration,
    );
}

/// The changes requested by a setattr, `None` fields are left untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
}

impl SetAttr {
    /// Whether the request truncates or extends the file
    #[must_use]
    pub const fn changes_size(&self) -> bool {
        self.size.is_some()
    }
}

/// File system statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileMode;

    #[test]
    fn chained_setters() {
        let mut attr = Attr::default();
        attr.ino(2)
            .mode(StMode::new(FileType::Regular, FileMode::RUSR))
            .size(13);
        assert_eq!(attr.file_type(), FileType::Regular);
        assert_eq!(attr.mode.file_mode(), FileMode::RUSR);
        assert_eq!(attr.size, 13);

        let mut entry = Entry::default();
        entry.nodeid(2).attr(attr).entry_valid(Duration::from_secs(1));
        assert_eq!(entry.attr.ino, 2);

        let changes = SetAttr {
            size: Some(0),
            ..SetAttr::default()
        };
        assert!(changes.changes_size());
        assert!(!SetAttr::default().changes_size());
    }
}
