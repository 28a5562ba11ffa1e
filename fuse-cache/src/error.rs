use crate::errno::Errno;
use crate::types::FileType;

use std::io;

/// `Result` of cache and backend operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors of cache and backend operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The inode or name is unknown to the backend
    #[error("no such entry")]
    NotFound,

    /// The operation does not apply to this kind of node
    #[error("wrong file type: expected {expected:?}")]
    WrongType {
        /// the file type the operation needs
        expected: FileType,
    },

    /// The caller may not perform the operation
    #[error("permission denied")]
    PermissionDenied,

    /// An extended attribute query matched no key
    #[error("no such extended attribute")]
    NoSuchAttribute,

    /// The backend could not be reached
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend does not implement the operation
    #[error("operation not supported")]
    NotSupported,

    /// Any other error number reported by the backend
    #[error("os error: {0}")]
    Os(Errno),

    /// I/O error of the backend
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Creates a [`Error::BackendUnavailable`]
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable(reason.into())
    }

    /// Whether the backend could not be reached
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Converts the error to the errno replied to the kernel
    #[must_use]
    pub fn errno(&self) -> Errno {
        match *self {
            Self::NotFound => Errno::ENOENT,
            Self::WrongType {
                expected: FileType::Directory,
            } => Errno::ENOTDIR,
            Self::WrongType { .. } => Errno::EISDIR,
            Self::PermissionDenied => Errno::EACCES,
            Self::NoSuchAttribute => Errno::ENODATA,
            Self::BackendUnavailable(_) => Errno::EIO,
            Self::NotSupported => Errno::ENOSYS,
            Self::Os(errno) => errno,
            Self::Io(ref err) => err.raw_os_error().map_or(Errno::EIO, Errno::from_raw),
        }
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::ENOENT => Self::NotFound,
            Errno::EACCES => Self::PermissionDenied,
            Errno::ENODATA => Self::NoSuchAttribute,
            Errno::ENOSYS => Self::NotSupported,
            _ => Self::Os(errno),
        }
    }
}
