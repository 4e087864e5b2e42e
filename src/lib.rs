//! SBFS library
//!
//! A small filesystem where every file and directory lives in exactly one
//! block. Shared by all SBFS binaries (mkfs, mount, info, dump).
//!
//! Layering, bottom to top:
//! - [`block_store`] / [`png_store`]: fixed-size block devices
//! - [`superblock`]: format, load, persist, first-fit allocation
//! - [`inode_table`]: packed inode records in block 1
//! - [`directory`]: directory blocks as arrays of name/inode entries
//! - [`fs`]: the operations (`create_file`, `lookup_child`, `read_file`, ...)
//! - [`mount_fuse`]: FUSE adapter over [`fs::Sbfs`]

pub mod block_store;
pub mod config;
pub mod directory;
pub mod error;
pub mod fs;
pub mod fs_layout;
pub mod inode_table;
pub mod mount_fuse;
pub mod png_store;
pub mod superblock;

pub use block_store::{BlockStore, FileBlockStore, MemBlockStore};
pub use error::{Capacity, FsError, Result};
pub use fs::{FsStats, Sbfs};
pub use fs_layout::{DirEntry, InodeKind, InodeNo, InodeRecord, SuperblockInfo};
pub use png_store::PngBlockStore;
