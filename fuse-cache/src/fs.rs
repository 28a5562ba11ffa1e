//! The caching decorator

use crate::attr::{Attr, Entry, SetAttr, StatFs};
use crate::backend::{Backend, Request};
use crate::cache::{self, CacheStore};
use crate::config::CacheConfig;
use crate::dir::DirEntry;
use crate::errno::Errno;
use crate::error::{Error, Result};
use crate::ops::{Opened, Operation, Reply};
use crate::state::{ConnectivityState, ReadPolicy};
use crate::types::{FileIdentity, FileType};

use std::convert::TryFrom;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;

use async_std::task;
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};
use tracing_futures::Instrument;

/// A file system answering [`Operation`]s
#[async_trait::async_trait]
pub trait FileSystem: Sync {
    async fn dispatch(&self, req: &Request, op: Operation) -> Result<Reply>;
}

/// A [`Backend`] decorated with a read cache
pub struct CacheFs<B> {
    backend: Arc<B>,
    store: Arc<CacheStore>,
    config: CacheConfig,
}

impl<B> Clone for CacheFs<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<B> fmt::Debug for CacheFs<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheFs")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

/// Size of the follow-up requests when content outgrows its reported size
const FETCH_CHUNK: u64 = 128 * 1024;

/// Fetches the whole content of `ino` along with its attributes.
///
/// The first request asks for one byte more than the larger of the reported
/// size and `want`, so a correct size ends with a short read. Content longer
/// than reported is fetched on in chunks until the backend returns a short
/// read.
async fn fetch_whole<B: Backend>(
    backend: &B,
    ino: FileIdentity,
    want: u64,
) -> Result<(Bytes, Option<Attr>)> {
    let attr = backend.resolve_attributes(ino).await?;
    if attr.mode.is_dir() {
        return Err(Error::WrongType {
            expected: FileType::Regular,
        });
    }

    let mut size = attr.size.max(want).saturating_add(1);
    let mut content = BytesMut::new();
    loop {
        let offset = content.len() as u64;
        debug!(ino, offset, size, "fetching content");
        let chunk = backend.fetch_content(ino, size, offset).await?;
        let short = (chunk.len() as u64) < size;
        if short && content.is_empty() {
            return Ok((chunk, Some(attr)));
        }
        content.extend_from_slice(&chunk);
        if short {
            break;
        }
        size = FETCH_CHUNK;
    }
    Ok((content.freeze(), Some(attr)))
}

/// Encodes a list of xattr names as NUL-terminated strings
fn xattr_names(names: &[OsString]) -> Bytes {
    let cap = names.iter().map(|n| n.len() + 1).sum();
    let mut buf = BytesMut::with_capacity(cap);
    for name in names {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&[0]);
    }
    buf.freeze()
}

/// Replies the size of an xattr value when `size` is zero, the value if it fits
fn xattr_reply(value: Bytes, size: u32) -> Result<Reply> {
    let len = u32::try_from(value.len()).map_err(|_| Error::from(Errno::ERANGE))?;
    if size == 0 {
        Ok(Reply::XAttrSize(len))
    } else if len > size {
        Err(Errno::ERANGE.into())
    } else {
        Ok(Reply::XAttr(value))
    }
}

impl<B: Backend> CacheFs<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, config: CacheConfig) -> Self {
        Self {
            backend,
            store: Arc::new(CacheStore::new()),
            config,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Queries the connectivity of the backend
    pub async fn status(&self) -> ConnectivityState {
        self.backend.status().await
    }

    fn cached_slice(&self, ino: FileIdentity, offset: u64, size: u32) -> Bytes {
        self.store
            .get(ino)
            .map_or_else(Bytes::new, |content| cache::slice(&content, offset, size))
    }

    /// Refreshes `ino` on another task unless a refresh is already running
    fn spawn_refresh(&self, ino: FileIdentity) {
        if !self.config.background_refresh {
            return;
        }
        if self.store.is_refreshing(ino) {
            debug!(ino, "background refresh already in flight");
            return;
        }

        let backend = Arc::clone(&self.backend);
        let store = Arc::clone(&self.store);
        let span = tracing::debug_span!("background refresh", ino);

        let _ = task::spawn(
            async move {
                let backend = &*backend;
                match store.refresh(ino, || fetch_whole(backend, ino, 0)).await {
                    Ok(true) => debug!("refreshed"),
                    Ok(false) => debug!("skipped, another refresh is running"),
                    Err(err) => warn!(%err, "background refresh failed"),
                }
            }
            .instrument(span),
        );
    }

    /// Reads `size` bytes of `ino` at `offset`.
    ///
    /// Online, a miss fetches the whole content and caches it. Offline the
    /// cache alone answers and a miss reads as end of file. Synchronizing
    /// answers like offline and refreshes the entry in the background.
    #[tracing::instrument(skip(self))]
    pub async fn read(
        &self,
        ino: FileIdentity,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> Result<Bytes> {
        let state = self.backend.status().await;
        match state.read_policy() {
            ReadPolicy::Fetch => {
                let want = offset.saturating_add(u64::from(size));
                let backend = &*self.backend;
                match self.store.fill(ino, || fetch_whole(backend, ino, want)).await {
                    Ok(fill) => Ok(cache::slice(&fill.into_content(), offset, size)),
                    Err(err) if err.is_unavailable() => {
                        warn!(ino, %err, "backend unavailable, serving cached content");
                        Ok(self.cached_slice(ino, offset, size))
                    }
                    Err(err) => Err(err),
                }
            }
            ReadPolicy::CacheOnly => {
                debug!(ino, offset, size, "serving cached content offline");
                Ok(self.cached_slice(ino, offset, size))
            }
            ReadPolicy::CacheThenRefresh => {
                debug!(ino, offset, size, "serving cached content while synchronizing");
                let data = self.cached_slice(ino, offset, size);
                self.spawn_refresh(ino);
                Ok(data)
            }
        }
    }

    /// Returns the attributes of `ino`, from the snapshot unless online
    #[tracing::instrument(skip(self))]
    pub async fn getattr(&self, ino: FileIdentity) -> Result<Attr> {
        let state = self.backend.status().await;
        if !state.is_online() {
            if let Some(attr) = self.store.get_attr(ino) {
                debug!(ino, %state, "serving cached attributes");
                return Ok(attr);
            }
        }

        match self.backend.resolve_attributes(ino).await {
            Ok(attr) => {
                self.store.put_attr(ino, attr);
                Ok(attr)
            }
            Err(err) if err.is_unavailable() => match self.store.get_attr(ino) {
                Some(attr) => {
                    warn!(ino, %err, "backend unavailable, serving cached attributes");
                    Ok(attr)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Sets the configured validity on an entry reply
    fn stamp(&self, mut entry: Entry) -> Entry {
        entry
            .entry_valid(self.config.entry_timeout)
            .attr_valid(self.config.attr_timeout);
        entry
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn lookup(&self, req: &Request, parent: FileIdentity, name: &OsStr) -> Result<Entry> {
        let entry = self.backend.lookup(req, parent, name).await?;
        Ok(self.stamp(entry))
    }

    #[tracing::instrument(skip(self))]
    pub async fn forget(&self, ino: FileIdentity, nlookup: u64) {
        self.backend.forget(ino, nlookup).await;
        self.store.forget(ino);
    }

    /// Forwards a setattr. The snapshot is dropped, and the content too when
    /// the size changes.
    #[tracing::instrument(skip(self, req))]
    pub async fn setattr(
        &self,
        req: &Request,
        ino: FileIdentity,
        changes: &SetAttr,
    ) -> Result<Attr> {
        let ret = self.backend.setattr(req, ino, changes).await;
        if changes.changes_size() {
            self.store.invalidate(ino);
        } else {
            self.store.invalidate_attr(ino);
        }
        ret
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn readlink(&self, req: &Request, ino: FileIdentity) -> Result<OsString> {
        self.backend.readlink(req, ino).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn mknod(
        &self,
        req: &Request,
        parent: FileIdentity,
        name: &OsStr,
        mode: u32,
        rdev: u32,
    ) -> Result<Entry> {
        let ret = self.backend.mknod(req, parent, name, mode, rdev).await;
        self.store.invalidate_attr(parent);
        ret.map(|entry| self.stamp(entry))
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn mkdir(
        &self,
        req: &Request,
        parent: FileIdentity,
        name: &OsStr,
        mode: u32,
    ) -> Result<Entry> {
        let ret = self.backend.mkdir(req, parent, name, mode).await;
        self.store.invalidate_attr(parent);
        ret.map(|entry| self.stamp(entry))
    }

    /// Resolves the identity behind a name, `None` if the backend can't tell
    async fn resolve_child(
        &self,
        req: &Request,
        parent: FileIdentity,
        name: &OsStr,
    ) -> Option<FileIdentity> {
        match self.backend.lookup(req, parent, name).await {
            Ok(entry) => Some(entry.nodeid),
            Err(err) => {
                debug!(parent, ?name, %err, "child not resolved");
                None
            }
        }
    }

    fn invalidate_child(&self, parent: FileIdentity, child: Option<FileIdentity>) {
        if let Some(ino) = child {
            self.store.invalidate(ino);
        }
        self.store.invalidate_attr(parent);
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn unlink(&self, req: &Request, parent: FileIdentity, name: &OsStr) -> Result<()> {
        let child = self.resolve_child(req, parent, name).await;
        let ret = self.backend.unlink(req, parent, name).await;
        self.invalidate_child(parent, child);
        ret
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn rmdir(&self, req: &Request, parent: FileIdentity, name: &OsStr) -> Result<()> {
        let child = self.resolve_child(req, parent, name).await;
        let ret = self.backend.rmdir(req, parent, name).await;
        self.invalidate_child(parent, child);
        ret
    }

    /// Forwards a rename, then invalidates the moved node, the node it
    /// replaced and both parents
    #[tracing::instrument(skip(self, req))]
    pub async fn rename(
        &self,
        req: &Request,
        parent: FileIdentity,
        name: &OsStr,
        newparent: FileIdentity,
        newname: &OsStr,
    ) -> Result<()> {
        let moved = self.resolve_child(req, parent, name).await;
        let replaced = self.resolve_child(req, newparent, newname).await;
        let ret = self
            .backend
            .rename(req, parent, name, newparent, newname)
            .await;
        self.invalidate_child(parent, moved);
        self.invalidate_child(newparent, replaced);
        ret
    }

    /// Forwards an open. Opening with `O_TRUNC` drops the cached content.
    #[tracing::instrument(skip(self, req))]
    pub async fn open(&self, req: &Request, ino: FileIdentity, flags: u32) -> Result<Opened> {
        let opened = self.backend.open(req, ino, flags).await?;
        #[allow(clippy::cast_possible_wrap)]
        let truncates = (flags as i32) & libc::O_TRUNC != 0;
        if truncates {
            self.store.invalidate(ino);
        }
        Ok(opened)
    }

    /// Forwards a write, then invalidates `ino` whether the write succeeded
    /// or not
    #[tracing::instrument(skip(self, req, data), fields(len = data.len()))]
    pub async fn write(
        &self,
        req: &Request,
        ino: FileIdentity,
        fh: u64,
        offset: u64,
        data: &[u8],
    ) -> Result<u32> {
        let ret = self.backend.write(req, ino, fh, offset, data).await;
        self.store.invalidate(ino);
        ret
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn flush(&self, req: &Request, ino: FileIdentity, fh: u64) -> Result<()> {
        self.backend.flush(req, ino, fh).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn release(
        &self,
        req: &Request,
        ino: FileIdentity,
        fh: u64,
        flags: u32,
    ) -> Result<()> {
        self.backend.release(req, ino, fh, flags).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn fsync(
        &self,
        req: &Request,
        ino: FileIdentity,
        fh: u64,
        datasync: bool,
    ) -> Result<()> {
        self.backend.fsync(req, ino, fh, datasync).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn opendir(&self, req: &Request, ino: FileIdentity, flags: u32) -> Result<Opened> {
        self.backend.opendir(req, ino, flags).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn readdir(
        &self,
        req: &Request,
        ino: FileIdentity,
        fh: u64,
        offset: u64,
    ) -> Result<Vec<DirEntry>> {
        self.backend.readdir(req, ino, fh, offset).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn releasedir(&self, req: &Request, ino: FileIdentity, fh: u64) -> Result<()> {
        self.backend.releasedir(req, ino, fh).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn statfs(&self, req: &Request, ino: FileIdentity) -> Result<StatFs> {
        self.backend.statfs(req, ino).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn access(&self, req: &Request, ino: FileIdentity, mask: i32) -> Result<()> {
        self.backend.access(req, ino, mask).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn getxattr(
        &self,
        req: &Request,
        ino: FileIdentity,
        name: &OsStr,
        size: u32,
    ) -> Result<Reply> {
        let value = self.backend.getxattr(req, ino, name).await?;
        xattr_reply(value, size)
    }

    #[tracing::instrument(skip(self, req, value))]
    pub async fn setxattr(
        &self,
        req: &Request,
        ino: FileIdentity,
        name: &OsStr,
        value: &[u8],
        flags: i32,
    ) -> Result<()> {
        self.backend.setxattr(req, ino, name, value, flags).await
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn listxattr(&self, req: &Request, ino: FileIdentity, size: u32) -> Result<Reply> {
        let names = self.backend.listxattr(req, ino).await?;
        xattr_reply(xattr_names(&names), size)
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn removexattr(&self, req: &Request, ino: FileIdentity, name: &OsStr) -> Result<()> {
        self.backend.removexattr(req, ino, name).await
    }
}

#[async_trait::async_trait]
impl<B: Backend> FileSystem for CacheFs<B> {
    async fn dispatch(&self, req: &Request, op: Operation) -> Result<Reply> {
        debug!(
            op = op.name(),
            unique = req.unique(),
            uid = req.uid(),
            gid = req.gid(),
            pid = req.pid()
        );

        let empty = |()| Reply::Empty;
        match op {
            Operation::Init => self.backend.init().await.map(empty),
            Operation::Destroy => {
                self.backend.destroy().await;
                Ok(Reply::Empty)
            }
            Operation::Lookup { parent, name } => {
                self.lookup(req, parent, &name).await.map(Reply::Entry)
            }
            Operation::Forget { ino, nlookup } => {
                self.forget(ino, nlookup).await;
                Ok(Reply::Empty)
            }
            Operation::GetAttr { ino } => {
                let attr = self.getattr(ino).await?;
                Ok(Reply::Attr {
                    attr,
                    valid: self.config.attr_timeout,
                })
            }
            Operation::SetAttr { ino, changes } => {
                let attr = self.setattr(req, ino, &changes).await?;
                Ok(Reply::Attr {
                    attr,
                    valid: self.config.attr_timeout,
                })
            }
            Operation::ReadLink { ino } => self.readlink(req, ino).await.map(Reply::ReadLink),
            Operation::MkNod {
                parent,
                name,
                mode,
                rdev,
            } => self
                .mknod(req, parent, &name, mode, rdev)
                .await
                .map(Reply::Entry),
            Operation::MkDir { parent, name, mode } => {
                self.mkdir(req, parent, &name, mode).await.map(Reply::Entry)
            }
            Operation::Unlink { parent, name } => {
                self.unlink(req, parent, &name).await.map(empty)
            }
            Operation::RmDir { parent, name } => self.rmdir(req, parent, &name).await.map(empty),
            Operation::Rename {
                parent,
                name,
                newparent,
                newname,
            } => self
                .rename(req, parent, &name, newparent, &newname)
                .await
                .map(empty),
            Operation::Open { ino, flags } => self.open(req, ino, flags).await.map(Reply::Open),
            Operation::Read {
                ino,
                fh,
                offset,
                size,
            } => self.read(ino, fh, offset, size).await.map(Reply::Data),
            Operation::Write {
                ino,
                fh,
                offset,
                data,
            } => self
                .write(req, ino, fh, offset, &data)
                .await
                .map(Reply::Written),
            Operation::Flush { ino, fh } => self.flush(req, ino, fh).await.map(empty),
            Operation::Release { ino, fh, flags } => {
                self.release(req, ino, fh, flags).await.map(empty)
            }
            Operation::FSync { ino, fh, datasync } => {
                self.fsync(req, ino, fh, datasync).await.map(empty)
            }
            Operation::OpenDir { ino, flags } => {
                self.opendir(req, ino, flags).await.map(Reply::Open)
            }
            Operation::ReadDir { ino, fh, offset } => self
                .readdir(req, ino, fh, offset)
                .await
                .map(Reply::Directory),
            Operation::ReleaseDir { ino, fh } => self.releasedir(req, ino, fh).await.map(empty),
            Operation::StatFs { ino } => self.statfs(req, ino).await.map(Reply::StatFs),
            Operation::Access { ino, mask } => self.access(req, ino, mask).await.map(empty),
            Operation::GetXAttr { ino, name, size } => self.getxattr(req, ino, &name, size).await,
            Operation::SetXAttr {
                ino,
                name,
                value,
                flags,
            } => self
                .setxattr(req, ino, &name, &value, flags)
                .await
                .map(empty),
            Operation::ListXAttr { ino, size } => self.listxattr(req, ino, size).await,
            Operation::RemoveXAttr { ino, name } => {
                self.removexattr(req, ino, &name).await.map(empty)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileMode, StMode};

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    const DIR_ID: FileIdentity = 1;
    const FILE_ID: FileIdentity = 2;
    const SUB_ID: FileIdentity = 3;
    const HELLO: &[u8] = b"trololol\n";

    struct MockBackend {
        state: Mutex<ConnectivityState>,
        content: Mutex<Bytes>,
        delay: Option<Duration>,
        reported_size: Option<u64>,
        unavailable: AtomicBool,
        fetches: AtomicUsize,
        lookups: AtomicUsize,
    }

    impl MockBackend {
        fn new(state: ConnectivityState) -> Self {
            Self {
                state: Mutex::new(state),
                content: Mutex::new(Bytes::from_static(HELLO)),
                delay: None,
                reported_size: None,
                unavailable: AtomicBool::new(false),
                fetches: AtomicUsize::new(0),
                lookups: AtomicUsize::new(0),
            }
        }

        fn set_state(&self, state: ConnectivityState) {
            *self.state.lock() = state;
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Backend for MockBackend {
        async fn status(&self) -> ConnectivityState {
            *self.state.lock()
        }

        async fn resolve_attributes(&self, ino: FileIdentity) -> Result<Attr> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(Error::unavailable("connection refused"));
            }
            let mut attr = Attr::default();
            match ino {
                DIR_ID => attr
                    .mode(StMode::new(FileType::Directory, FileMode::from_bits_truncate(0o755)))
                    .nlink(2),
                FILE_ID => attr
                    .mode(StMode::new(FileType::Regular, FileMode::from_bits_truncate(0o644)))
                    .nlink(1)
                    .size(
                        self.reported_size
                            .unwrap_or_else(|| self.content.lock().len() as u64),
                    ),
                _ => return Err(Error::NotFound),
            };
            Ok(*attr.ino(ino))
        }

        async fn fetch_content(&self, ino: FileIdentity, size: u64, offset: u64) -> Result<Bytes> {
            assert_eq!(ino, FILE_ID);
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                task::sleep(delay).await;
            }
            let content = self.content.lock().clone();
            Ok(cache::slice(&content, offset, u32::try_from(size).unwrap()))
        }

        async fn lookup(&self, _: &Request, parent: FileIdentity, name: &OsStr) -> Result<Entry> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if parent != DIR_ID {
                return Err(Error::NotFound);
            }
            let mut entry = Entry::default();
            if name == "hello" {
                let attr = self.resolve_attributes(FILE_ID).await?;
                entry.nodeid(FILE_ID).attr(attr);
            } else if name == "sub" {
                entry.nodeid(SUB_ID);
            } else {
                return Err(Error::NotFound);
            }
            Ok(entry)
        }

        async fn unlink(&self, _: &Request, _: FileIdentity, _: &OsStr) -> Result<()> {
            Ok(())
        }

        async fn rmdir(&self, _: &Request, _: FileIdentity, _: &OsStr) -> Result<()> {
            Ok(())
        }

        async fn mknod(
            &self,
            _: &Request,
            _: FileIdentity,
            _: &OsStr,
            _: u32,
            _: u32,
        ) -> Result<Entry> {
            Ok(Entry::default())
        }

        async fn rename(
            &self,
            _: &Request,
            _: FileIdentity,
            _: &OsStr,
            _: FileIdentity,
            _: &OsStr,
        ) -> Result<()> {
            Ok(())
        }

        async fn mkdir(&self, _: &Request, _: FileIdentity, _: &OsStr, _: u32) -> Result<Entry> {
            Ok(Entry::default())
        }

        async fn open(&self, _: &Request, _: FileIdentity, _: u32) -> Result<Opened> {
            Ok(Opened::default())
        }

        async fn setattr(&self, _: &Request, ino: FileIdentity, changes: &SetAttr) -> Result<Attr> {
            if let Some(size) = changes.size {
                let mut content = self.content.lock();
                *content = content.slice(..usize::try_from(size).unwrap().min(content.len()));
            }
            self.resolve_attributes(ino).await
        }

        async fn write(
            &self,
            _: &Request,
            _: FileIdentity,
            _: u64,
            _: u64,
            data: &[u8],
        ) -> Result<u32> {
            *self.content.lock() = Bytes::copy_from_slice(data);
            Ok(u32::try_from(data.len()).unwrap())
        }

        async fn getxattr(&self, _: &Request, _: FileIdentity, name: &OsStr) -> Result<Bytes> {
            if name == "user.tag" {
                Ok(Bytes::from_static(b"blue"))
            } else {
                Err(Error::NoSuchAttribute)
            }
        }

        async fn listxattr(&self, _: &Request, _: FileIdentity) -> Result<Vec<OsString>> {
            Ok(vec!["user.tag".into(), "user.owner".into()])
        }
    }

    fn cache_fs(state: ConnectivityState) -> CacheFs<MockBackend> {
        CacheFs::new(Arc::new(MockBackend::new(state)), CacheConfig::default())
    }

    async fn read(fs: &CacheFs<MockBackend>, offset: u64, size: u32) -> Bytes {
        fs.read(FILE_ID, 0, offset, size).await.unwrap()
    }

    #[test]
    fn online_read_fetches_once() {
        let fs = cache_fs(ConnectivityState::Online);
        task::block_on(async {
            assert_eq!(&read(&fs, 0, 64).await[..], HELLO);
            assert_eq!(&read(&fs, 0, 64).await[..], HELLO);
        });
        assert_eq!(fs.backend().fetches(), 1);
        assert_eq!(fs.store().get(FILE_ID).as_deref(), Some(HELLO));
        assert_eq!(fs.store().get_attr(FILE_ID).map(|a| a.size), Some(9));
    }

    #[test]
    fn offline_read_never_fetches() {
        let fs = cache_fs(ConnectivityState::Offline);
        let data = task::block_on(read(&fs, 0, 64));
        assert!(data.is_empty());
        assert_eq!(fs.backend().fetches(), 0);
    }

    #[test]
    fn offline_read_serves_cache() {
        let fs = cache_fs(ConnectivityState::Online);
        task::block_on(async {
            let _ = read(&fs, 0, 64).await;
            fs.backend().set_state(ConnectivityState::Offline);
            assert_eq!(&read(&fs, 3, 5).await[..], b"lolol");
        });
        assert_eq!(fs.backend().fetches(), 1);
    }

    #[test]
    fn concurrent_first_reads_fetch_once() {
        let mut backend = MockBackend::new(ConnectivityState::Online);
        backend.delay = Some(Duration::from_millis(50));
        let fs = CacheFs::new(Arc::new(backend), CacheConfig::default());

        let (a, b) = task::block_on(async { futures::join!(read(&fs, 0, 64), read(&fs, 0, 4)) });

        assert_eq!(&a[..], HELLO);
        assert_eq!(&b[..], b"trol");
        assert_eq!(fs.backend().fetches(), 1);
    }

    #[test]
    fn windows_are_clipped() {
        let fs = cache_fs(ConnectivityState::Online);
        task::block_on(async {
            assert!(read(&fs, 20, 64).await.is_empty());
            assert_eq!(&read(&fs, 5, 64).await[..], b"lol\n");
            assert_eq!(&read(&fs, 0, 4).await[..], b"trol");
        });
    }

    #[test]
    fn write_invalidates() {
        let fs = cache_fs(ConnectivityState::Online);
        let req = Request::default();
        task::block_on(async {
            let _ = read(&fs, 0, 64).await;
            let n = fs.write(&req, FILE_ID, 0, 0, b"fresh\n").await.unwrap();
            assert_eq!(n, 6);
            assert!(fs.store().get(FILE_ID).is_none());
            assert_eq!(&read(&fs, 0, 64).await[..], b"fresh\n");
        });
        assert_eq!(fs.backend().fetches(), 2);
    }

    #[test]
    fn truncate_invalidates() {
        let fs = cache_fs(ConnectivityState::Online);
        let req = Request::default();
        let changes = SetAttr {
            size: Some(4),
            ..SetAttr::default()
        };
        task::block_on(async {
            let _ = read(&fs, 0, 64).await;
            let attr = fs.setattr(&req, FILE_ID, &changes).await.unwrap();
            assert_eq!(attr.size, 4);
            assert_eq!(&read(&fs, 0, 64).await[..], b"trol");
        });
    }

    #[test]
    fn unlink_invalidates_child() {
        let fs = cache_fs(ConnectivityState::Online);
        let req = Request::default();
        task::block_on(async {
            let _ = read(&fs, 0, 64).await;
            fs.unlink(&req, DIR_ID, OsStr::new("hello")).await.unwrap();
        });
        assert!(fs.store().get(FILE_ID).is_none());
        assert_eq!(fs.backend().lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn structural_ops_invalidate() {
        let fs = cache_fs(ConnectivityState::Online);
        let req = Request::default();
        let store = fs.store();
        task::block_on(async {
            let _ = read(&fs, 0, 64).await;
            let _ = fs.getattr(DIR_ID).await.unwrap();
            fs.rename(&req, DIR_ID, OsStr::new("hello"), DIR_ID, OsStr::new("bye"))
                .await
                .unwrap();
            assert!(store.entry(FILE_ID).is_none());
            assert!(store.get_attr(DIR_ID).is_none());

            let _ = read(&fs, 0, 64).await;
            let _ = fs.open(&req, FILE_ID, 0).await.unwrap();
            assert!(store.entry(FILE_ID).is_some());
            #[allow(clippy::cast_sign_loss)]
            let trunc = libc::O_TRUNC as u32;
            let _ = fs.open(&req, FILE_ID, trunc).await.unwrap();
            assert!(store.entry(FILE_ID).is_none());

            let _ = fs.getattr(DIR_ID).await.unwrap();
            let _ = fs.mkdir(&req, DIR_ID, OsStr::new("sub"), 0o755).await.unwrap();
            assert!(store.get_attr(DIR_ID).is_none());
        });
        assert_eq!(fs.backend().lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rmdir_invalidates_child_and_parent() {
        let fs = cache_fs(ConnectivityState::Online);
        let req = Request::default();
        let store = fs.store();
        store.put(SUB_ID, Bytes::from_static(b"stale"));
        task::block_on(async {
            let _ = fs.getattr(DIR_ID).await.unwrap();
            fs.rmdir(&req, DIR_ID, OsStr::new("sub")).await.unwrap();
        });
        assert!(store.entry(SUB_ID).is_none());
        assert!(store.get_attr(DIR_ID).is_none());
    }

    #[test]
    fn mknod_invalidates_parent() {
        let fs = cache_fs(ConnectivityState::Online);
        let req = Request::default();
        task::block_on(async {
            let _ = fs.getattr(DIR_ID).await.unwrap();
            #[allow(clippy::cast_sign_loss, trivial_numeric_casts)]
            let mode = (libc::S_IFIFO | 0o644) as u32;
            let _ = fs.mknod(&req, DIR_ID, OsStr::new("fifo"), mode, 0).await.unwrap();
        });
        assert!(fs.store().get_attr(DIR_ID).is_none());
    }

    #[test]
    fn entries_carry_configured_validity() {
        let mut config = CacheConfig::default();
        config
            .entry_timeout(Duration::from_secs(5))
            .attr_timeout(Duration::from_secs(7));
        let fs = CacheFs::new(Arc::new(MockBackend::new(ConnectivityState::Online)), config);
        let req = Request::default();
        task::block_on(async {
            let entry = fs.lookup(&req, DIR_ID, OsStr::new("hello")).await.unwrap();
            assert_eq!(entry.entry_valid, Duration::from_secs(5));
            assert_eq!(entry.attr_valid, Duration::from_secs(7));

            let entry = fs.mkdir(&req, DIR_ID, OsStr::new("sub"), 0o755).await.unwrap();
            assert_eq!(entry.entry_valid, Duration::from_secs(5));

            let reply = fs.dispatch(&req, Operation::GetAttr { ino: FILE_ID }).await.unwrap();
            assert!(matches!(reply, Reply::Attr { valid, .. } if valid == Duration::from_secs(7)));
        });
    }

    #[test]
    fn content_longer_than_reported_size() {
        let mut backend = MockBackend::new(ConnectivityState::Online);
        backend.reported_size = Some(4);
        let fs = CacheFs::new(Arc::new(backend), CacheConfig::default());
        task::block_on(async {
            assert_eq!(&read(&fs, 0, 4).await[..], b"trol");
            assert_eq!(&read(&fs, 4, 5).await[..], b"olol\n");
            assert_eq!(&read(&fs, 0, 64).await[..], HELLO);
        });
        assert_eq!(fs.store().get(FILE_ID).as_deref(), Some(HELLO));
        assert_eq!(fs.backend().fetches(), 2);
    }

    #[test]
    fn synchronizing_serves_stale_content_without_waiting() {
        let mut backend = MockBackend::new(ConnectivityState::Synchronizing);
        backend.delay = Some(Duration::from_millis(500));
        let fs = CacheFs::new(Arc::new(backend), CacheConfig::default());
        fs.store().put(FILE_ID, Bytes::from_static(b"old"));

        task::block_on(async {
            let started = Instant::now();
            assert_eq!(&read(&fs, 0, 64).await[..], b"old");
            assert!(started.elapsed() < Duration::from_millis(250));

            for _ in 0..200 {
                if fs.store().get(FILE_ID).as_deref() == Some(HELLO) {
                    break;
                }
                task::sleep(Duration::from_millis(10)).await;
            }
        });
        assert_eq!(fs.store().get(FILE_ID).as_deref(), Some(HELLO));
        assert_eq!(fs.backend().fetches(), 1);
    }

    #[test]
    fn synchronizing_refreshes_in_background() {
        let fs = cache_fs(ConnectivityState::Synchronizing);
        task::block_on(async {
            assert!(read(&fs, 0, 64).await.is_empty());
            for _ in 0..100 {
                if fs.store().entry(FILE_ID).and_then(|e| e.content).is_some() {
                    break;
                }
                task::sleep(Duration::from_millis(10)).await;
            }
            fs.backend().set_state(ConnectivityState::Offline);
            assert_eq!(&read(&fs, 0, 64).await[..], HELLO);
        });
        assert_eq!(fs.backend().fetches(), 1);
    }

    #[test]
    fn synchronizing_without_refresh() {
        let backend = Arc::new(MockBackend::new(ConnectivityState::Synchronizing));
        let config = CacheConfig::default().background_refresh(false).clone();
        let fs = CacheFs::new(backend, config);
        assert!(task::block_on(read(&fs, 0, 64)).is_empty());
        assert_eq!(fs.backend().fetches(), 0);
    }

    #[test]
    fn unavailable_backend_degrades() {
        let fs = cache_fs(ConnectivityState::Online);
        fs.backend().unavailable.store(true, Ordering::SeqCst);
        let data = task::block_on(read(&fs, 0, 64));
        assert!(data.is_empty());
    }

    #[test]
    fn read_errors() {
        let fs = cache_fs(ConnectivityState::Online);
        task::block_on(async {
            let err = fs.read(DIR_ID, 0, 0, 64).await.unwrap_err();
            assert_eq!(err.errno(), Errno::EISDIR);
            let err = fs.read(42, 0, 0, 64).await.unwrap_err();
            assert_eq!(err.errno(), Errno::ENOENT);
        });
        assert!(fs.store().get(DIR_ID).is_none());
    }

    #[test]
    fn getattr_offline_uses_snapshot() {
        let fs = cache_fs(ConnectivityState::Online);
        task::block_on(async {
            let online = fs.getattr(FILE_ID).await.unwrap();
            fs.backend().set_state(ConnectivityState::Offline);
            fs.backend().unavailable.store(true, Ordering::SeqCst);
            assert_eq!(fs.getattr(FILE_ID).await.unwrap(), online);
            assert!(fs.getattr(3).await.unwrap_err().is_unavailable());
        });
    }

    #[test]
    fn xattr_size_queries() {
        let fs = cache_fs(ConnectivityState::Online);
        let req = Request::default();
        let tag = OsStr::new("user.tag");
        task::block_on(async {
            assert_eq!(fs.getxattr(&req, 2, tag, 0).await.unwrap(), Reply::XAttrSize(4));
            assert_eq!(
                fs.getxattr(&req, 2, tag, 64).await.unwrap(),
                Reply::XAttr(Bytes::from_static(b"blue"))
            );
            let err = fs.getxattr(&req, 2, tag, 2).await.unwrap_err();
            assert_eq!(err.errno(), Errno::ERANGE);
            let err = fs.getxattr(&req, 2, OsStr::new("user.none"), 0).await.unwrap_err();
            assert_eq!(err.errno(), Errno::ENODATA);

            assert_eq!(
                fs.listxattr(&req, 2, 64).await.unwrap(),
                Reply::XAttr(Bytes::from_static(b"user.tag\0user.owner\0"))
            );
        });
    }

    #[test]
    fn dispatch_routes() {
        let fs = cache_fs(ConnectivityState::Online);
        let req = Request::new(1, 0, 0, 0);
        task::block_on(async {
            let reply = fs
                .dispatch(
                    &req,
                    Operation::Read {
                        ino: FILE_ID,
                        fh: 0,
                        offset: 0,
                        size: 64,
                    },
                )
                .await
                .unwrap();
            assert_eq!(reply, Reply::Data(Bytes::from_static(HELLO)));

            let reply = fs
                .dispatch(
                    &req,
                    Operation::Lookup {
                        parent: DIR_ID,
                        name: "hello".into(),
                    },
                )
                .await
                .unwrap();
            assert!(matches!(reply, Reply::Entry(e) if e.nodeid == FILE_ID));

            let err = fs
                .dispatch(&req, Operation::ReadLink { ino: FILE_ID })
                .await
                .unwrap_err();
            assert_eq!(err.errno(), Errno::ENOSYS);

            let reply = fs
                .dispatch(
                    &req,
                    Operation::Forget {
                        ino: FILE_ID,
                        nlookup: 1,
                    },
                )
                .await
                .unwrap();
            assert_eq!(reply, Reply::Empty);
        });
        assert!(fs.store().entry(FILE_ID).is_none());
    }
}
