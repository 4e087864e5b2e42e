use std::fmt;
use std::io;

use thiserror::Error;

use crate::fs_layout::InodeNo;

/// Which single-block bound an operation ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    InodeTable,
    BlockBitmap,
    DirectoryBlock,
    FileBlock,
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capacity::InodeTable => "inode table is full",
            Capacity::BlockBitmap => "no free data blocks",
            Capacity::DirectoryBlock => "directory block is full",
            Capacity::FileBlock => "write exceeds the single file block",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum FsError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(Capacity),
    #[error("name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },
    #[error("invalid name")]
    InvalidName,
    #[error("inode {0} not found")]
    NotFound(InodeNo),
    #[error("entry already exists")]
    AlreadyExists,
    #[error("inode {0} is not a directory")]
    NotADirectory(InodeNo),
    #[error("inode {0} is not a regular file")]
    NotAFile(InodeNo),
    #[error("device too small: need {needed} blocks, have {available}")]
    DeviceTooSmall { needed: u64, available: u64 },
    #[error("storage I/O error: {0}")]
    StorageIo(#[from] io::Error),
}

impl FsError {
    /// The errno an OS integration layer should report for this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::InvalidFormat(_) | FsError::InvalidName => libc::EINVAL,
            FsError::CapacityExceeded(Capacity::FileBlock) => libc::EFBIG,
            FsError::CapacityExceeded(_) | FsError::DeviceTooSmall { .. } => libc::ENOSPC,
            FsError::NameTooLong { .. } => libc::ENAMETOOLONG,
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::NotAFile(_) => libc::EISDIR,
            FsError::StorageIo(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
