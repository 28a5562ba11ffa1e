//! Connectivity of the backend

use std::fmt;

/// Whether the backend can currently be reached.
///
/// The state is reported by the backend on every read; the cache layer never
/// decides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    /// the backend is reachable
    Online,
    /// the backend is unreachable
    Offline,
    /// the backend is reachable but synchronization is still in progress
    Synchronizing,
}

/// How a read is served in a given [`ConnectivityState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    /// serve from cache, fetch and populate on a miss
    Fetch,
    /// serve from cache only, a miss is an empty read
    CacheOnly,
    /// serve from cache only and refresh the entry in the background
    CacheThenRefresh,
}

impl ConnectivityState {
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }

    #[must_use]
    pub const fn read_policy(self) -> ReadPolicy {
        match self {
            Self::Online => ReadPolicy::Fetch,
            Self::Offline => ReadPolicy::CacheOnly,
            Self::Synchronizing => ReadPolicy::CacheThenRefresh,
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Synchronizing => "synchronizing",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ConnectivityState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "synchronizing" | "sync" => Ok(Self::Synchronizing),
            _ => Err(UnknownState(s.to_owned())),
        }
    }
}

/// An unrecognized connectivity state name
#[derive(Debug, thiserror::Error)]
#[error("unknown connectivity state: {0:?}")]
pub struct UnknownState(String);
