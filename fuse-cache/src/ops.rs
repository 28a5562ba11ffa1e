//! FUSE operations and their replies

use crate::attr::{Attr, Entry, SetAttr, StatFs};
use crate::dir::DirEntry;
use crate::types::FileIdentity;

use std::ffi::OsString;
use std::time::Duration;

use bytes::Bytes;

/// FUSE operations, one variant per primitive
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Operation {
    Init,
    Destroy,
    Lookup {
        parent: FileIdentity,
        name: OsString,
    },
    Forget {
        ino: FileIdentity,
        nlookup: u64,
    },
    GetAttr {
        ino: FileIdentity,
    },
    SetAttr {
        ino: FileIdentity,
        changes: SetAttr,
    },
    ReadLink {
        ino: FileIdentity,
    },
    MkNod {
        parent: FileIdentity,
        name: OsString,
        mode: u32,
        rdev: u32,
    },
    MkDir {
        parent: FileIdentity,
        name: OsString,
        mode: u32,
    },
    Unlink {
        parent: FileIdentity,
        name: OsString,
    },
    RmDir {
        parent: FileIdentity,
        name: OsString,
    },
    Rename {
        parent: FileIdentity,
        name: OsString,
        newparent: FileIdentity,
        newname: OsString,
    },
    Open {
        ino: FileIdentity,
        flags: u32,
    },
    Read {
        ino: FileIdentity,
        fh: u64,
        offset: u64,
        size: u32,
    },
    Write {
        ino: FileIdentity,
        fh: u64,
        offset: u64,
        data: Bytes,
    },
    Flush {
        ino: FileIdentity,
        fh: u64,
    },
    Release {
        ino: FileIdentity,
        fh: u64,
        flags: u32,
    },
    FSync {
        ino: FileIdentity,
        fh: u64,
        datasync: bool,
    },
    OpenDir {
        ino: FileIdentity,
        flags: u32,
    },
    ReadDir {
        ino: FileIdentity,
        fh: u64,
        offset: u64,
    },
    ReleaseDir {
        ino: FileIdentity,
        fh: u64,
    },
    StatFs {
        ino: FileIdentity,
    },
    Access {
        ino: FileIdentity,
        mask: i32,
    },
    GetXAttr {
        ino: FileIdentity,
        name: OsString,
        size: u32,
    },
    SetXAttr {
        ino: FileIdentity,
        name: OsString,
        value: Bytes,
        flags: i32,
    },
    ListXAttr {
        ino: FileIdentity,
        size: u32,
    },
    RemoveXAttr {
        ino: FileIdentity,
        name: OsString,
    },
}

impl Operation {
    /// The name of the operation, for logging
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Destroy => "destroy",
            Self::Lookup { .. } => "lookup",
            Self::Forget { .. } => "forget",
            Self::GetAttr { .. } => "getattr",
            Self::SetAttr { .. } => "setattr",
            Self::ReadLink { .. } => "readlink",
            Self::MkNod { .. } => "mknod",
            Self::MkDir { .. } => "mkdir",
            Self::Unlink { .. } => "unlink",
            Self::RmDir { .. } => "rmdir",
            Self::Rename { .. } => "rename",
            Self::Open { .. } => "open",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Flush { .. } => "flush",
            Self::Release { .. } => "release",
            Self::FSync { .. } => "fsync",
            Self::OpenDir { .. } => "opendir",
            Self::ReadDir { .. } => "readdir",
            Self::ReleaseDir { .. } => "releasedir",
            Self::StatFs { .. } => "statfs",
            Self::Access { .. } => "access",
            Self::GetXAttr { .. } => "getxattr",
            Self::SetXAttr { .. } => "setxattr",
            Self::ListXAttr { .. } => "listxattr",
            Self::RemoveXAttr { .. } => "removexattr",
        }
    }
}

/// The reply of an open or opendir
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Opened {
    /// file handle
    pub fh: u64,
    /// `FOPEN_*` flags
    pub open_flags: u32,
}

/// Successful replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Empty,
    Attr { attr: Attr, valid: Duration },
    Entry(Entry),
    Open(Opened),
    Data(Bytes),
    Written(u32),
    Directory(Vec<DirEntry>),
    ReadLink(OsString),
    XAttr(Bytes),
    XAttrSize(u32),
    StatFs(StatFs),
}
