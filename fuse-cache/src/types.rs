//! File identities and mode bits

use std::convert::TryFrom;

use bitflags::bitflags;

/// Kernel-assigned identity of a node, stable until the kernel forgets it
pub type FileIdentity = u64;

/// The identity of the root directory
pub const ROOT_ID: FileIdentity = 1;

/// Access mode of an open request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// `O_RDONLY`
    ReadOnly,
    /// `O_WRONLY`
    WriteOnly,
    /// `O_RDWR`
    ReadWrite,
}

impl AccessMode {
    /// Extracts the access mode from open flags
    #[must_use]
    pub fn from_flags(o_flags: u32) -> Option<Self> {
        let flags = i32::try_from(o_flags).ok()?;
        match flags & libc::O_ACCMODE {
            libc::O_RDONLY => Some(Self::ReadOnly),
            libc::O_WRONLY => Some(Self::WriteOnly),
            libc::O_RDWR => Some(Self::ReadWrite),
            _ => None,
        }
    }

    /// Whether the mode allows writing
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// File type of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// unknown
    Unknown,
    /// FIFO
    NamedPipe,
    /// character device
    CharacterDevice,
    /// directory
    Directory,
    /// block device
    BlockDevice,
    /// regular file
    Regular,
    /// symbolic link
    SymbolicLink,
    /// unix socket
    Socket,
}

impl FileType {
    /// Converts a `d_type` value, unrecognized values become [`FileType::Unknown`]
    #[must_use]
    pub const fn from_raw(d_type: u8) -> Self {
        match d_type {
            libc::DT_FIFO => Self::NamedPipe,
            libc::DT_CHR => Self::CharacterDevice,
            libc::DT_DIR => Self::Directory,
            libc::DT_BLK => Self::BlockDevice,
            libc::DT_REG => Self::Regular,
            libc::DT_LNK => Self::SymbolicLink,
            libc::DT_SOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }

    /// Returns the `d_type` value
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Unknown => libc::DT_UNKNOWN,
            Self::NamedPipe => libc::DT_FIFO,
            Self::CharacterDevice => libc::DT_CHR,
            Self::Directory => libc::DT_DIR,
            Self::BlockDevice => libc::DT_BLK,
            Self::Regular => libc::DT_REG,
            Self::SymbolicLink => libc::DT_LNK,
            Self::Socket => libc::DT_SOCK,
        }
    }

    /// Returns the `d_type` value as `u32`
    #[must_use]
    pub fn as_u32(self) -> u32 {
        u32::from(self.as_raw())
    }
}

bitflags! {
    /// Permission bits of `st_mode`
    pub struct FileMode: u32 {
        const RWXO = 0o0007;
        const ROTH = 0o0004;
        const WOTH = 0o0002;
        const XOTH = 0o0001;

        const RWXG = 0o0070;
        const RGRP = 0o0040;
        const WGRP = 0o0020;
        const XGRP = 0o0010;

        const RWXU = 0o0700;
        const RUSR = 0o0400;
        const WUSR = 0o0200;
        const XUSR = 0o0100;

        const SUID = 0o4000;
        const SGID = 0o2000;
        const SVTX = 0o1000;
    }
}

/// `st_mode`: file type and permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StMode(u32);

impl StMode {
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn new(ty: FileType, mode: FileMode) -> Self {
        Self(ty.as_u32().wrapping_shl(12) | mode.bits())
    }

    #[must_use]
    pub fn file_type(self) -> FileType {
        u8::try_from(self.0.wrapping_shr(12) & 0o17).map_or(FileType::Unknown, FileType::from_raw)
    }

    #[must_use]
    pub const fn file_mode(self) -> FileMode {
        FileMode::from_bits_truncate(self.0)
    }

    #[must_use]
    pub fn is_dir(self) -> bool {
        self.file_type() == FileType::Directory
    }
}

impl Default for StMode {
    fn default() -> Self {
        Self::new(FileType::Regular, FileMode::empty())
    }
}
