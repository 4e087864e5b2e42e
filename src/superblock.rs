//! Superblock manager: format, load, persist, and first-fit block allocation.

use log::{debug, info};

use crate::block_store::BlockStore;
use crate::error::{Capacity, FsError, Result};
use crate::fs_layout::*;
use crate::inode_table;

/// Serializes `sb` into a fresh block buffer, writes block 0, and flushes it.
pub fn persist<S: BlockStore + ?Sized>(store: &S, sb: &SuperblockInfo) -> Result<()> {
    let mut buf = vec![0u8; store.block_size()];
    sb.encode_into(&mut buf);
    store.write_block(SUPERBLOCK_BLOCK, &buf)?;
    store.flush(SUPERBLOCK_BLOCK)?;
    Ok(())
}

/// Reads block 0 and checks that it describes a volume this engine can mount.
pub fn load<S: BlockStore + ?Sized>(store: &S) -> Result<SuperblockInfo> {
    check_block_size(store.block_size() as u64)?;
    let buf = store.read_block(SUPERBLOCK_BLOCK)?;
    let sb = SuperblockInfo::decode(&buf);

    if sb.magic != MAGIC {
        return Err(FsError::InvalidFormat(format!(
            "bad magic {:#010x} (expected {:#010x})",
            sb.magic, MAGIC
        )));
    }
    if sb.version != VERSION {
        return Err(FsError::InvalidFormat(format!(
            "unsupported version {}",
            sb.version
        )));
    }
    check_block_size(sb.block_size as u64)?;
    if sb.inode_count > MAX_OBJECTS {
        return Err(FsError::InvalidFormat(format!(
            "inode count {} exceeds {}",
            sb.inode_count, MAX_OBJECTS
        )));
    }
    if sb.is_free(SUPERBLOCK_BLOCK) || sb.is_free(INODE_TABLE_BLOCK) {
        return Err(FsError::InvalidFormat(
            "bitmap marks a reserved block free".into(),
        ));
    }
    if store.block_count() < TOTAL_BLOCKS {
        return Err(FsError::DeviceTooSmall {
            needed: TOTAL_BLOCKS,
            available: store.block_count(),
        });
    }

    debug!(
        "loaded superblock: {} inodes, {} free blocks",
        sb.inode_count,
        sb.free_block_count()
    );
    Ok(sb)
}

fn check_block_size(block_size: u64) -> Result<()> {
    if block_size != BLOCK_SIZE as u64 {
        return Err(FsError::InvalidFormat(format!(
            "block size {} (expected {})",
            block_size, BLOCK_SIZE
        )));
    }
    Ok(())
}

/// Writes an empty volume to `store`: superblock, empty inode table, and the
/// root directory with its (empty) data block.
pub fn format<S: BlockStore + ?Sized>(store: &S, block_size: usize) -> Result<SuperblockInfo> {
    check_block_size(block_size as u64)?;
    check_block_size(store.block_size() as u64)?;
    if store.block_count() < TOTAL_BLOCKS {
        return Err(FsError::DeviceTooSmall {
            needed: TOTAL_BLOCKS,
            available: store.block_count(),
        });
    }

    let mut sb = SuperblockInfo::new();
    persist(store, &sb)?;

    let zero = vec![0u8; BLOCK_SIZE];
    store.write_block(INODE_TABLE_BLOCK, &zero)?;
    store.flush(INODE_TABLE_BLOCK)?;

    // No parent directory exists yet, so the root is linked by hand.
    let root_block = allocate_block(store, &mut sb)?;
    store.write_block(root_block, &zero)?;
    store.flush(root_block)?;

    let root = InodeRecord::new(ROOT_INODE_NO, InodeKind::Directory, 0o755, root_block);
    inode_table::append(store, &mut sb, &root)?;

    info!(
        "formatted volume: {} blocks of {} bytes, root directory in block {}",
        TOTAL_BLOCKS, BLOCK_SIZE, root_block
    );
    Ok(sb)
}

/// Takes the lowest free data block and persists the superblock right away.
pub fn allocate_block<S: BlockStore + ?Sized>(
    store: &S,
    sb: &mut SuperblockInfo,
) -> Result<BlockNumber> {
    let blk = (RESERVED_BLOCKS..TOTAL_BLOCKS)
        .find(|&b| test_bit(&sb.free_blocks, b))
        .ok_or(FsError::CapacityExceeded(Capacity::BlockBitmap))?;

    clear_bit(&mut sb.free_blocks, blk);
    persist(store, sb)?;

    debug!("allocated block {}", blk);
    Ok(blk)
}
