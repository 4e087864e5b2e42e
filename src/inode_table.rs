//! The inode table: a packed array of [`InodeRecord`]s in block 1.
//!
//! Slots `0..inode_count` are live and appear in creation order. Lookups scan
//! the live slots; the table never holds more than `MAX_OBJECTS` records.

use log::error;

use crate::block_store::BlockStore;
use crate::error::{Capacity, FsError, Result};
use crate::fs_layout::*;
use crate::superblock;

fn slot(i: u64) -> std::ops::Range<usize> {
    let off = i as usize * INODE_RECORD_SIZE;
    off..off + INODE_RECORD_SIZE
}

fn scan(buf: &[u8], sb: &SuperblockInfo, inode_no: InodeNo) -> Option<u64> {
    (0..sb.inode_count).find(|&i| InodeRecord::decode(&buf[slot(i)]).inode_no == inode_no)
}

fn write_table<S: BlockStore + ?Sized>(store: &S, buf: &[u8]) -> Result<()> {
    store.write_block(INODE_TABLE_BLOCK, buf)?;
    store.flush(INODE_TABLE_BLOCK)?;
    Ok(())
}

/// Stores `record` in the next free slot and bumps the superblock counter.
pub fn append<S: BlockStore + ?Sized>(
    store: &S,
    sb: &mut SuperblockInfo,
    record: &InodeRecord,
) -> Result<()> {
    if sb.inode_count >= MAX_OBJECTS {
        return Err(FsError::CapacityExceeded(Capacity::InodeTable));
    }

    let mut buf = store.read_block(INODE_TABLE_BLOCK)?;
    record.encode_into(&mut buf[slot(sb.inode_count)]);
    write_table(store, &buf)?;

    sb.inode_count += 1;
    superblock::persist(store, sb)
}

/// Returns a copy of the record numbered `inode_no`, if it is live.
pub fn find<S: BlockStore + ?Sized>(
    store: &S,
    sb: &SuperblockInfo,
    inode_no: InodeNo,
) -> Result<Option<InodeRecord>> {
    let buf = store.read_block(INODE_TABLE_BLOCK)?;
    Ok(scan(&buf, sb, inode_no).map(|i| InodeRecord::decode(&buf[slot(i)])))
}

/// Overwrites the slot holding `record.inode_no` with `record`.
pub fn update<S: BlockStore + ?Sized>(
    store: &S,
    sb: &SuperblockInfo,
    record: &InodeRecord,
) -> Result<()> {
    let mut buf = store.read_block(INODE_TABLE_BLOCK)?;
    let Some(i) = scan(&buf, sb, record.inode_no) else {
        error!("update of inode {} which was never appended", record.inode_no);
        return Err(FsError::NotFound(record.inode_no));
    };

    record.encode_into(&mut buf[slot(i)]);
    write_table(store, &buf)
}

/// Every live record in slot order.
pub fn records<S: BlockStore + ?Sized>(store: &S, sb: &SuperblockInfo) -> Result<Vec<InodeRecord>> {
    let buf = store.read_block(INODE_TABLE_BLOCK)?;
    Ok((0..sb.inode_count)
        .map(|i| InodeRecord::decode(&buf[slot(i)]))
        .collect())
}
