//! A single-file backend for trying out the read cache
//!
//! The root directory holds one read-only file, `hello`.

#![deny(unused_extern_crates, clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use fuse_cache::attr::{Attr, Entry};
use fuse_cache::cache;
use fuse_cache::dir::{DirEntry, Directory};
use fuse_cache::ops::Opened;
use fuse_cache::types::{AccessMode, FileMode, FileType, StMode};
use fuse_cache::{Backend, ConnectivityState, Error, FileIdentity, Request, Result, ROOT_ID};

use std::convert::TryFrom;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

pub const HELLO_ID: FileIdentity = 2;

const HELLO_STR: &str = "Hello World!\n";
const HELLO_NAME: &str = "hello";
const HELLO_CONTENT: &[u8] = b"trololol\n";

/// The connectivity reported by a [`HelloFs`], shared with whoever flips it
pub type StatusHandle = Arc<Mutex<ConnectivityState>>;

#[derive(Debug)]
pub struct HelloFs {
    status: StatusHandle,
}

impl Default for HelloFs {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

impl HelloFs {
    #[must_use]
    pub fn new(status: ConnectivityState) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
        }
    }

    /// Returns the handle controlling the reported connectivity
    #[must_use]
    pub fn status_handle(&self) -> StatusHandle {
        Arc::clone(&self.status)
    }

    pub fn set_status(&self, status: ConnectivityState) {
        *self.status.lock() = status;
    }
}

fn stat(ino: FileIdentity) -> Option<Attr> {
    let mut attr = Attr::default();

    let init_time: SystemTime = {
        static INIT_TIME: Lazy<SystemTime> = Lazy::new(SystemTime::now);
        *INIT_TIME
    };

    attr.ino(ino)
        .blocks(8)
        .blksize(4096)
        .uid(0)
        .gid(0)
        .atime(init_time)
        .ctime(init_time)
        .mtime(init_time);

    match ino {
        ROOT_ID => attr
            .mode(StMode::new(
                FileType::Directory,
                FileMode::from_bits_truncate(0o755),
            ))
            .nlink(2)
            .size(4096),

        HELLO_ID => attr
            .mode(StMode::new(
                FileType::Regular,
                FileMode::from_bits_truncate(0o444),
            ))
            .nlink(1)
            .size(HELLO_STR.len() as u64),

        _ => return None,
    };

    Some(attr)
}

fn root_dir() -> &'static Directory {
    static DIR: Lazy<Directory> = Lazy::new(|| {
        let mut dir = Directory::with_capacity(3);
        let entries: [(FileIdentity, FileType, &[u8]); 3] = [
            (ROOT_ID, FileType::Directory, b"."),
            (ROOT_ID, FileType::Directory, b".."),
            (HELLO_ID, FileType::Regular, HELLO_NAME.as_bytes()),
        ];
        for &(ino, file_type, name) in &entries {
            if let Err(err) = dir.add_entry(ino, file_type, name) {
                tracing::error!(%err, "invalid entry name");
            }
        }
        dir
    });
    &*DIR
}

fn read_only(flags: u32) -> Result<()> {
    debug!(open_flags = flags);
    match AccessMode::from_flags(flags) {
        Some(mode) if !mode.is_writable() => Ok(()),
        _ => Err(Error::PermissionDenied),
    }
}

#[async_trait::async_trait]
impl Backend for HelloFs {
    async fn status(&self) -> ConnectivityState {
        *self.status.lock()
    }

    async fn resolve_attributes(&self, ino: FileIdentity) -> Result<Attr> {
        stat(ino).ok_or(Error::NotFound)
    }

    async fn fetch_content(&self, ino: FileIdentity, size: u64, offset: u64) -> Result<Bytes> {
        match ino {
            HELLO_ID => {
                let size = u32::try_from(size).unwrap_or(u32::MAX);
                let content = Bytes::from_static(HELLO_CONTENT);
                Ok(cache::slice(&content, offset, size))
            }
            ROOT_ID => Err(Error::WrongType {
                expected: FileType::Regular,
            }),
            _ => Err(Error::NotFound),
        }
    }

    async fn lookup(&self, _: &Request, parent: FileIdentity, name: &OsStr) -> Result<Entry> {
        if parent != ROOT_ID {
            return Err(Error::NotFound);
        }

        debug!(?name);
        let ino = match root_dir().find(name.as_bytes()) {
            Some(found) if found.file_type == FileType::Regular => found.ino,
            _ => return Err(Error::NotFound),
        };

        let attr = stat(ino).ok_or(Error::NotFound)?;
        let mut entry = Entry::default();
        entry
            .attr_valid(Duration::from_secs(1))
            .entry_valid(Duration::from_secs(1))
            .attr(attr)
            .nodeid(ino);
        debug!(?entry);

        Ok(entry)
    }

    async fn open(&self, _: &Request, ino: FileIdentity, flags: u32) -> Result<Opened> {
        if ino != HELLO_ID {
            return Err(Error::WrongType {
                expected: FileType::Regular,
            });
        }
        read_only(flags)?;
        Ok(Opened::default())
    }

    async fn flush(&self, _: &Request, _: FileIdentity, _: u64) -> Result<()> {
        Ok(())
    }

    async fn opendir(&self, _: &Request, ino: FileIdentity, flags: u32) -> Result<Opened> {
        if ino != ROOT_ID {
            return Err(Error::WrongType {
                expected: FileType::Directory,
            });
        }
        read_only(flags)?;
        Ok(Opened::default())
    }

    async fn readdir(
        &self,
        _: &Request,
        ino: FileIdentity,
        _: u64,
        offset: u64,
    ) -> Result<Vec<DirEntry>> {
        if ino != ROOT_ID {
            return Err(Error::WrongType {
                expected: FileType::Directory,
            });
        }
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(root_dir().window(offset, usize::MAX).to_vec())
    }

    async fn releasedir(&self, _: &Request, _: FileIdentity, _: u64) -> Result<()> {
        Ok(())
    }

    async fn getxattr(&self, _: &Request, _: FileIdentity, _: &OsStr) -> Result<Bytes> {
        Err(Error::NoSuchAttribute)
    }
}
