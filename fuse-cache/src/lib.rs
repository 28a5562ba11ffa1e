//! A read-caching decorator for FUSE file systems.
//!
//! [`CacheFs`] sits between a request dispatcher and a [`Backend`]. Reads are
//! answered from a per-inode [`CacheStore`] according to the backend's
//! [`ConnectivityState`]; mutating operations are forwarded and then
//! invalidate whatever they touched; everything else is passed through.

#![deny(
    trivial_numeric_casts,
    unstable_features,
    unused_extern_crates,
    unused_import_braces,
    clippy::all,
    clippy::pedantic
)]
#![allow(
    missing_copy_implementations,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

#[macro_use]
mod internal_macros;

mod errno;
mod error;

pub mod attr;
pub mod backend;
pub mod cache;
pub mod config;
pub mod dir;
pub mod fs;
pub mod ops;
pub mod state;
pub mod types;

pub use self::backend::{Backend, Request};
pub use self::cache::{CacheEntry, CacheStats, CacheStore};
pub use self::config::CacheConfig;
pub use self::errno::Errno;
pub use self::error::{Error, Result};
pub use self::fs::{CacheFs, FileSystem};
pub use self::ops::{Operation, Reply};
pub use self::state::ConnectivityState;
pub use self::types::{FileIdentity, ROOT_ID};
