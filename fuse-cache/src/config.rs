//! Cache configuration

use std::time::Duration;

/// Configuration of a [`CacheFs`](crate::CacheFs)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// validity of entries replied from cached snapshots
    pub entry_timeout: Duration,
    /// validity of attributes replied from cached snapshots
    pub attr_timeout: Duration,
    /// refresh cached content in the background while synchronizing
    pub background_refresh: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_timeout: Duration::from_secs(1),
            attr_timeout: Duration::from_secs(1),
            background_refresh: true,
        }
    }
}

impl CacheConfig {
    setters!(
        entry_timeout: Duration,
        attr_timeout: Duration,
        background_refresh: bool,
    );
}
