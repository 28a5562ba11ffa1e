//! The contract a concrete file system fulfils under [`CacheFs`](crate::CacheFs)

use crate::attr::{Attr, Entry, SetAttr, StatFs};
use crate::dir::DirEntry;
use crate::error::{Error, Result};
use crate::ops::Opened;
use crate::state::ConnectivityState;
use crate::types::FileIdentity;

use std::ffi::{OsStr, OsString};

use bytes::Bytes;

/// The caller of an operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Request {
    unique: u64,
    uid: u32,
    gid: u32,
    pid: u32,
}

impl Request {
    #[must_use]
    pub const fn new(unique: u64, uid: u32, gid: u32, pid: u32) -> Self {
        Self {
            unique,
            uid,
            gid,
            pid,
        }
    }

    getters!(unique: u64, uid: u32, gid: u32, pid: u32,);
}

/// A concrete file system.
///
/// `status`, `resolve_attributes` and `fetch_content` drive the read cache.
/// Every other operation is relayed unchanged by [`CacheFs`](crate::CacheFs)
/// and defaults to [`Error::NotSupported`], except the lifecycle hooks
/// `init`, `destroy`, `forget`, `release` and `releasedir`, which succeed.
///
/// A backend doing network I/O applies its own timeouts and reports an
/// unreachable server as [`Error::BackendUnavailable`].
#[async_trait::async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Reports whether the backend can be reached
    async fn status(&self) -> ConnectivityState;

    /// Returns the attributes of `ino`, [`Error::NotFound`] if it does not exist
    async fn resolve_attributes(&self, ino: FileIdentity) -> Result<Attr>;

    /// Returns up to `size` bytes of `ino` starting at `offset`.
    /// Fewer bytes, including none, are returned at the end of the content.
    async fn fetch_content(&self, ino: FileIdentity, size: u64, offset: u64) -> Result<Bytes>;

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn destroy(&self) {}

    async fn lookup(&self, req: &Request, parent: FileIdentity, name: &OsStr) -> Result<Entry> {
        let _ = (req, parent, name);
        Err(Error::NotSupported)
    }

    async fn forget(&self, ino: FileIdentity, nlookup: u64) {
        let _ = (ino, nlookup);
    }

    async fn setattr(&self, req: &Request, ino: FileIdentity, changes: &SetAttr) -> Result<Attr> {
        let _ = (req, ino, changes);
        Err(Error::NotSupported)
    }

    async fn readlink(&self, req: &Request, ino: FileIdentity) -> Result<OsString> {
        let _ = (req, ino);
        Err(Error::NotSupported)
    }

    async fn mknod(
        &self,
        req: &Request,
        parent: FileIdentity,
        name: &OsStr,
        mode: u32,
        rdev: u32,
    ) -> Result<Entry> {
        let _ = (req, parent, name, mode, rdev);
        Err(Error::NotSupported)
    }

    async fn mkdir(
        &self,
        req: &Request,
        parent: FileIdentity,
        name: &OsStr,
        mode: u32,
    ) -> Result<Entry> {
        let _ = (req, parent, name, mode);
        Err(Error::NotSupported)
    }

    async fn unlink(&self, req: &Request, parent: FileIdentity, name: &OsStr) -> Result<()> {
        let _ = (req, parent, name);
        Err(Error::NotSupported)
    }

    async fn rmdir(&self, req: &Request, parent: FileIdentity, name: &OsStr) -> Result<()> {
        let _ = (req, parent, name);
        Err(Error::NotSupported)
    }

    async fn rename(
        &self,
        req: &Request,
        parent: FileIdentity,
        name: &OsStr,
        newparent: FileIdentity,
        newname: &OsStr,
    ) -> Result<()> {
        let _ = (req, parent, name, newparent, newname);
        Err(Error::NotSupported)
    }

    async fn open(&self, req: &Request, ino: FileIdentity, flags: u32) -> Result<Opened> {
        let _ = (req, ino, flags);
        Err(Error::NotSupported)
    }

    async fn write(
        &self,
        req: &Request,
        ino: FileIdentity,
        fh: u64,
        offset: u64,
        data: &[u8],
    ) -> Result<u32> {
        let _ = (req, ino, fh, offset, data);
        Err(Error::NotSupported)
    }

    async fn flush(&self, req: &Request, ino: FileIdentity, fh: u64) -> Result<()> {
        let _ = (req, ino, fh);
        Err(Error::NotSupported)
    }

    async fn release(&self, req: &Request, ino: FileIdentity, fh: u64, flags: u32) -> Result<()> {
        let _ = (req, ino, fh, flags);
        Ok(())
    }

    async fn fsync(&self, req: &Request, ino: FileIdentity, fh: u64, datasync: bool) -> Result<()> {
        let _ = (req, ino, fh, datasync);
        Err(Error::NotSupported)
    }

    async fn opendir(&self, req: &Request, ino: FileIdentity, flags: u32) -> Result<Opened> {
        let _ = (req, ino, flags);
        Err(Error::NotSupported)
    }

    /// Returns the entries of a directory starting at `offset`
    async fn readdir(
        &self,
        req: &Request,
        ino: FileIdentity,
        fh: u64,
        offset: u64,
    ) -> Result<Vec<DirEntry>> {
        let _ = (req, ino, fh, offset);
        Err(Error::NotSupported)
    }

    async fn releasedir(&self, req: &Request, ino: FileIdentity, fh: u64) -> Result<()> {
        let _ = (req, ino, fh);
        Ok(())
    }

    async fn statfs(&self, req: &Request, ino: FileIdentity) -> Result<StatFs> {
        let _ = (req, ino);
        Err(Error::NotSupported)
    }

    async fn access(&self, req: &Request, ino: FileIdentity, mask: i32) -> Result<()> {
        let _ = (req, ino, mask);
        Err(Error::NotSupported)
    }

    /// Returns the value of an extended attribute
    async fn getxattr(&self, req: &Request, ino: FileIdentity, name: &OsStr) -> Result<Bytes> {
        let _ = (req, ino, name);
        Err(Error::NotSupported)
    }

    async fn setxattr(
        &self,
        req: &Request,
        ino: FileIdentity,
        name: &OsStr,
        value: &[u8],
        flags: i32,
    ) -> Result<()> {
        let _ = (req, ino, name, value, flags);
        Err(Error::NotSupported)
    }

    /// Returns the names of all extended attributes
    async fn listxattr(&self, req: &Request, ino: FileIdentity) -> Result<Vec<OsString>> {
        let _ = (req, ino);
        Err(Error::NotSupported)
    }

    async fn removexattr(&self, req: &Request, ino: FileIdentity, name: &OsStr) -> Result<()> {
        let _ = (req, ino, name);
        Err(Error::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_std::task;

    struct Empty;

    #[async_trait::async_trait]
    impl Backend for Empty {
        async fn status(&self) -> ConnectivityState {
            ConnectivityState::Offline
        }

        async fn resolve_attributes(&self, _: FileIdentity) -> Result<Attr> {
            Err(Error::NotFound)
        }

        async fn fetch_content(&self, _: FileIdentity, _: u64, _: u64) -> Result<Bytes> {
            Ok(Bytes::new())
        }
    }

    #[test]
    fn default_operations() {
        let fs = Empty;
        let req = Request::new(7, 1000, 1000, 42);
        assert_eq!((req.unique(), req.uid(), req.gid(), req.pid()), (7, 1000, 1000, 42));

        task::block_on(async {
            assert!(fs.init().await.is_ok());
            fs.forget(2, 1).await;
            assert!(fs.release(&req, 2, 0, 0).await.is_ok());
            assert!(fs.releasedir(&req, 1, 0).await.is_ok());
            fs.destroy().await;

            let hello = OsStr::new("hello");
            assert!(matches!(fs.lookup(&req, 1, hello).await, Err(Error::NotSupported)));
            assert!(matches!(fs.unlink(&req, 1, hello).await, Err(Error::NotSupported)));
            assert!(matches!(fs.readdir(&req, 1, 0, 0).await, Err(Error::NotSupported)));
            assert!(matches!(fs.flush(&req, 2, 0).await, Err(Error::NotSupported)));
            assert!(matches!(fs.getxattr(&req, 2, hello).await, Err(Error::NotSupported)));
        });
    }
}
