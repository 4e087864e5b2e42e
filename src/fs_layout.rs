//! On-disk layout of an SBFS volume.
//!
//! ```text
//! block 0        superblock (magic, version, block size, inode count, free bitmap)
//! block 1        inode table (packed InodeRecord array)
//! blocks 2..66   one data block per live object
//! ```
//!
//! Every record is serialized field by field, little-endian, into a
//! caller-provided slice. Nothing here touches a block store.

use static_assertions::const_assert;

pub type BlockNumber = u64;
pub type InodeNo = u64;

pub const MAGIC: u32 = u32::from_le_bytes(*b"SBFS");
pub const VERSION: u32 = 1;

pub const BLOCK_SIZE: usize = 4096;

pub const SUPERBLOCK_BLOCK: BlockNumber = 0;
pub const INODE_TABLE_BLOCK: BlockNumber = 1;
pub const RESERVED_BLOCKS: u64 = 2;

/// Maximum number of live objects, root included.
pub const MAX_OBJECTS: u64 = 64;

/// Every object owns exactly one data block, so the device needs one block
/// per object on top of the reserved ones.
pub const TOTAL_BLOCKS: u64 = MAX_OBJECTS + RESERVED_BLOCKS;
pub const BITMAP_BYTES: usize = ((TOTAL_BLOCKS + 7) / 8) as usize;

pub const ROOT_INODE_NO: InodeNo = 1;

pub const INODE_RECORD_SIZE: usize = 40;

pub const MAX_FILENAME_LEN: usize = 56;
pub const DIR_ENTRY_SIZE: usize = MAX_FILENAME_LEN + 8;
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const PERM_MASK: u32 = 0o7777;

const SUPERBLOCK_BITMAP_OFFSET: usize = 24;

const_assert!(SUPERBLOCK_BITMAP_OFFSET + BITMAP_BYTES <= BLOCK_SIZE);
const_assert!(MAX_OBJECTS as usize * INODE_RECORD_SIZE <= BLOCK_SIZE);
const_assert!(DIR_ENTRIES_PER_BLOCK * DIR_ENTRY_SIZE <= BLOCK_SIZE);
const_assert!(DIR_ENTRIES_PER_BLOCK as u64 >= MAX_OBJECTS - 1);

fn read_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

// Bit helpers over the free-block bitmap. A set bit means "free".

pub fn test_bit(bm: &[u8], idx: u64) -> bool {
    let b = (idx / 8) as usize;
    let i = (idx % 8) as u8;
    bm[b] & (1 << i) != 0
}

pub fn set_bit(bm: &mut [u8], idx: u64) {
    let b = (idx / 8) as usize;
    let i = (idx % 8) as u8;
    bm[b] |= 1 << i;
}

pub fn clear_bit(bm: &mut [u8], idx: u64) {
    let b = (idx / 8) as usize;
    let i = (idx % 8) as u8;
    bm[b] &= !(1 << i);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SuperblockInfo {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub inode_count: u64,
    pub free_blocks: [u8; BITMAP_BYTES],
}

impl SuperblockInfo {
    /// A freshly formatted superblock: no inodes, every non-reserved block free.
    pub fn new() -> Self {
        let mut free_blocks = [0u8; BITMAP_BYTES];
        for blk in RESERVED_BLOCKS..TOTAL_BLOCKS {
            set_bit(&mut free_blocks, blk);
        }

        Self {
            magic: MAGIC,
            version: VERSION,
            block_size: BLOCK_SIZE as u32,
            inode_count: 0,
            free_blocks,
        }
    }

    pub fn is_free(&self, blk: BlockNumber) -> bool {
        blk < TOTAL_BLOCKS && test_bit(&self.free_blocks, blk)
    }

    pub fn free_block_count(&self) -> u64 {
        (0..TOTAL_BLOCKS).filter(|&b| self.is_free(b)).count() as u64
    }

    /// Writes every field into `buf` and zeroes the remainder.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf.fill(0);
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.block_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.inode_count.to_le_bytes());
        buf[SUPERBLOCK_BITMAP_OFFSET..SUPERBLOCK_BITMAP_OFFSET + BITMAP_BYTES]
            .copy_from_slice(&self.free_blocks);
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut free_blocks = [0u8; BITMAP_BYTES];
        free_blocks.copy_from_slice(
            &buf[SUPERBLOCK_BITMAP_OFFSET..SUPERBLOCK_BITMAP_OFFSET + BITMAP_BYTES],
        );

        Self {
            magic: read_u32(buf, 0),
            version: read_u32(buf, 4),
            block_size: read_u32(buf, 8),
            inode_count: read_u64(buf, 16),
            free_blocks,
        }
    }
}

impl Default for SuperblockInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
}

impl InodeKind {
    pub fn mode_bits(self) -> u32 {
        match self {
            InodeKind::File => S_IFREG,
            InodeKind::Directory => S_IFDIR,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InodeRecord {
    pub inode_no: InodeNo,
    pub mode: u32,
    pub data_block_number: BlockNumber,
    pub file_size: u64,
    pub dir_children_count: u64,
}

impl InodeRecord {
    pub fn new(inode_no: InodeNo, kind: InodeKind, perm: u32, data_block_number: BlockNumber) -> Self {
        Self {
            inode_no,
            mode: kind.mode_bits() | (perm & PERM_MASK),
            data_block_number,
            file_size: 0,
            dir_children_count: 0,
        }
    }

    pub fn kind(&self) -> InodeKind {
        if self.mode & S_IFMT == S_IFDIR {
            InodeKind::Directory
        } else {
            InodeKind::File
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == InodeKind::Directory
    }

    pub fn perm(&self) -> u32 {
        self.mode & PERM_MASK
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[..INODE_RECORD_SIZE].fill(0);
        buf[0..8].copy_from_slice(&self.inode_no.to_le_bytes());
        buf[8..12].copy_from_slice(&self.mode.to_le_bytes());
        buf[16..24].copy_from_slice(&self.data_block_number.to_le_bytes());
        buf[24..32].copy_from_slice(&self.file_size.to_le_bytes());
        buf[32..40].copy_from_slice(&self.dir_children_count.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            inode_no: read_u64(buf, 0),
            mode: read_u32(buf, 8),
            data_block_number: read_u64(buf, 16),
            file_size: read_u64(buf, 24),
            dir_children_count: read_u64(buf, 32),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; MAX_FILENAME_LEN],
    pub inode_no: InodeNo,
}

impl DirEntry {
    /// Builds an entry; `name` must already be validated to fit.
    pub fn new(name: &[u8], inode_no: InodeNo) -> Self {
        let mut e = Self {
            name: [0; MAX_FILENAME_LEN],
            inode_no,
        };
        let len = name.len().min(MAX_FILENAME_LEN);
        e.name[..len].copy_from_slice(&name[..len]);
        e
    }

    /// The stored name without its NUL padding.
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_FILENAME_LEN);
        &self.name[..len]
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[..MAX_FILENAME_LEN].copy_from_slice(&self.name);
        buf[MAX_FILENAME_LEN..DIR_ENTRY_SIZE].copy_from_slice(&self.inode_no.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut name = [0u8; MAX_FILENAME_LEN];
        name.copy_from_slice(&buf[..MAX_FILENAME_LEN]);
        Self {
            name,
            inode_no: read_u64(buf, MAX_FILENAME_LEN),
        }
    }
}
