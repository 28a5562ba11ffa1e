//! Per-inode cache of file content and attributes
//!
//! Each inode owns a slot. A slot holds the cached [`CacheEntry`], an epoch
//! bumped by every invalidation and an async fill lock. Fills of one inode are
//! serialized on its fill lock, so concurrent misses collapse into a single
//! backend fetch while fills of other inodes proceed independently. A fill
//! publishes its result only if the epoch did not move while it was fetching.

use crate::attr::Attr;
use crate::error::Result;
use crate::types::FileIdentity;

use std::collections::HashMap;
use std::convert::TryFrom;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

/// Cached data of an inode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    /// whole content of the file
    pub content: Option<Bytes>,
    /// attribute snapshot
    pub attr: Option<Attr>,
}

impl CacheEntry {
    fn is_empty(&self) -> bool {
        self.content.is_none() && self.attr.is_none()
    }
}

#[derive(Debug, Default)]
struct SlotState {
    entry: CacheEntry,
    epoch: u64,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    fill: async_std::sync::Mutex<()>,
    refreshing: AtomicBool,
}

impl Slot {
    fn content(&self) -> Option<Bytes> {
        self.state.lock().entry.content.clone()
    }

    fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Stores a fetched result unless the slot was invalidated since `epoch`
    fn publish(&self, epoch: u64, content: Bytes, attr: Option<Attr>) -> bool {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return false;
        }
        state.entry.content = Some(content);
        if attr.is_some() {
            state.entry.attr = attr;
        }
        true
    }
}

/// Clears the refreshing flag of a slot when dropped
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fills: AtomicU64,
    coalesced: AtomicU64,
    invalidations: AtomicU64,
    refreshes: AtomicU64,
}

/// A snapshot of cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// lookups answered from cache
    pub hits: u64,
    /// lookups which found nothing
    pub misses: u64,
    /// backend fetches which populated the cache
    pub fills: u64,
    /// misses which waited for another in-flight fill
    pub coalesced: u64,
    /// invalidations of a present slot
    pub invalidations: u64,
    /// completed background refreshes
    pub refreshes: u64,
}

/// The outcome of [`CacheStore::fill`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fill {
    /// the content was already cached
    Hit(Bytes),
    /// another caller fetched the content while this one waited
    Coalesced(Bytes),
    /// this caller fetched the content from the backend
    Fetched(Bytes),
}

impl Fill {
    #[must_use]
    pub fn into_content(self) -> Bytes {
        match self {
            Self::Hit(b) | Self::Coalesced(b) | Self::Fetched(b) => b,
        }
    }

    #[must_use]
    pub const fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

/// Cache of file content and attributes keyed by inode
#[derive(Debug, Default)]
pub struct CacheStore {
    slots: Mutex<HashMap<FileIdentity, Arc<Slot>>>,
    counters: Counters,
}

impl CacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, ino: FileIdentity) -> Option<Arc<Slot>> {
        self.slots.lock().get(&ino).cloned()
    }

    fn slot_or_insert(&self, ino: FileIdentity) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(ino).or_default())
    }

    /// Removes the slot of `ino` after a failed fetch if nothing is cached
    /// in it and no other caller holds it
    fn discard_if_unused(&self, ino: FileIdentity, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock();
        let unused = slots.get(&ino).map_or(false, |s| Arc::ptr_eq(s, slot))
            && Arc::strong_count(slot) == 2
            && slot.state.lock().entry.is_empty();
        if unused {
            let _ = slots.remove(&ino);
        }
    }

    fn count(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the cached content of `ino`
    #[must_use]
    pub fn get(&self, ino: FileIdentity) -> Option<Bytes> {
        let content = self.slot(ino).and_then(|slot| slot.content());
        match content {
            Some(_) => Self::count(&self.counters.hits),
            None => Self::count(&self.counters.misses),
        }
        content
    }

    /// Stores or replaces the content of `ino`
    pub fn put(&self, ino: FileIdentity, content: Bytes) {
        let slot = self.slot_or_insert(ino);
        slot.state.lock().entry.content = Some(content);
    }

    /// Removes the cached content and attributes of `ino`.
    /// A fill of `ino` in flight will not publish its result.
    pub fn invalidate(&self, ino: FileIdentity) {
        if let Some(slot) = self.slot(ino) {
            let mut state = slot.state.lock();
            state.entry = CacheEntry::default();
            state.epoch = state.epoch.wrapping_add(1);
            Self::count(&self.counters.invalidations);
            debug!(ino, epoch = state.epoch, "invalidated");
        }
    }

    /// Returns the attribute snapshot of `ino`
    #[must_use]
    pub fn get_attr(&self, ino: FileIdentity) -> Option<Attr> {
        let slot = self.slot(ino)?;
        let state = slot.state.lock();
        state.entry.attr
    }

    /// Stores or replaces the attribute snapshot of `ino`
    pub fn put_attr(&self, ino: FileIdentity, attr: Attr) {
        let slot = self.slot_or_insert(ino);
        slot.state.lock().entry.attr = Some(attr);
    }

    /// Removes the attribute snapshot of `ino`, keeping its content
    pub fn invalidate_attr(&self, ino: FileIdentity) {
        if let Some(slot) = self.slot(ino) {
            slot.state.lock().entry.attr = None;
        }
    }

    /// Returns a copy of everything cached for `ino`
    #[must_use]
    pub fn entry(&self, ino: FileIdentity) -> Option<CacheEntry> {
        let slot = self.slot(ino)?;
        let state = slot.state.lock();
        if state.entry.is_empty() {
            None
        } else {
            Some(state.entry.clone())
        }
    }

    /// Drops `ino` entirely, the kernel may reuse the identity afterwards
    pub fn forget(&self, ino: FileIdentity) {
        let removed = self.slots.lock().remove(&ino);
        if let Some(slot) = removed {
            let mut state = slot.state.lock();
            state.epoch = state.epoch.wrapping_add(1);
            debug!(ino, "forgotten");
        }
    }

    /// The number of inodes with cached content
    #[must_use]
    pub fn len(&self) -> usize {
        let slots: Vec<Arc<Slot>> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.content().is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a background refresh of `ino` is in flight
    #[must_use]
    pub fn is_refreshing(&self, ino: FileIdentity) -> bool {
        self.slot(ino)
            .map_or(false, |slot| slot.refreshing.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            fills: c.fills.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
            refreshes: c.refreshes.load(Ordering::Relaxed),
        }
    }

    /// Returns the content of `ino`, calling `fetch` on a miss.
    ///
    /// At most one `fetch` per inode runs at a time. Callers missing while a
    /// fetch is in flight wait for it and share its result. The lock held
    /// while fetching covers `ino` only.
    pub async fn fill<F, Fut>(&self, ino: FileIdentity, fetch: F) -> Result<Fill>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(Bytes, Option<Attr>)>>,
    {
        let slot = self.slot_or_insert(ino);

        if let Some(content) = slot.content() {
            Self::count(&self.counters.hits);
            debug!(ino, "cache hit");
            return Ok(Fill::Hit(content));
        }

        let fill_guard = slot.fill.lock().await;

        if let Some(content) = slot.content() {
            Self::count(&self.counters.coalesced);
            debug!(ino, "cache hit after waiting for an in-flight fill");
            return Ok(Fill::Coalesced(content));
        }

        Self::count(&self.counters.misses);
        debug!(ino, "cache miss");

        let epoch = slot.epoch();
        let (content, attr) = match fetch().await {
            Ok(fetched) => fetched,
            Err(err) => {
                drop(fill_guard);
                self.discard_if_unused(ino, &slot);
                return Err(err);
            }
        };

        Self::count(&self.counters.fills);
        if !slot.publish(epoch, content.clone(), attr) {
            debug!(ino, "invalidated while fetching, result not cached");
        }
        Ok(Fill::Fetched(content))
    }

    /// Replaces the content of `ino` with a fresh fetch.
    ///
    /// Returns `false` without fetching if a refresh of `ino` is already in
    /// flight. Waits for a foreground fill of the same inode to finish first.
    pub async fn refresh<F, Fut>(&self, ino: FileIdentity, fetch: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(Bytes, Option<Attr>)>>,
    {
        let slot = self.slot_or_insert(ino);

        if slot.refreshing.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let refresh_guard = RefreshGuard(&slot.refreshing);

        let fill_guard = slot.fill.lock().await;

        let epoch = slot.epoch();
        let (content, attr) = match fetch().await {
            Ok(fetched) => fetched,
            Err(err) => {
                drop(fill_guard);
                drop(refresh_guard);
                self.discard_if_unused(ino, &slot);
                return Err(err);
            }
        };

        if slot.publish(epoch, content, attr) {
            Self::count(&self.counters.refreshes);
        } else {
            debug!(ino, "invalidated while refreshing, result not cached");
        }
        Ok(true)
    }
}

/// Returns the window `[offset, offset + size)` of `content`, clipped to its
/// length. An offset at or past the end yields an empty buffer.
#[must_use]
pub fn slice(content: &Bytes, offset: u64, size: u32) -> Bytes {
    let start = match usize::try_from(offset) {
        Ok(start) if start < content.len() => start,
        _ => return Bytes::new(),
    };
    let size = usize::try_from(size).unwrap_or(usize::MAX);
    let end = start.saturating_add(size).min(content.len());
    content.slice(start..end)
}
