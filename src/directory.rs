//! Directory blocks: a data block read as an array of [`DirEntry`] records.
//!
//! Only the first `count` entries of a block are meaningful, where `count` is
//! the owning directory's `dir_children_count`.

use crate::block_store::BlockStore;
use crate::error::{Capacity, FsError, Result};
use crate::fs_layout::*;

fn slot(i: u64) -> std::ops::Range<usize> {
    let off = i as usize * DIR_ENTRY_SIZE;
    off..off + DIR_ENTRY_SIZE
}

fn check_count(count: u64) -> Result<()> {
    if count > DIR_ENTRIES_PER_BLOCK as u64 {
        return Err(FsError::InvalidFormat(format!(
            "directory claims {} entries, a block holds {}",
            count, DIR_ENTRIES_PER_BLOCK
        )));
    }
    Ok(())
}

/// Checks a name before anything is allocated for it.
pub fn validate_name(name: &[u8]) -> Result<()> {
    if name.len() > MAX_FILENAME_LEN {
        return Err(FsError::NameTooLong {
            len: name.len(),
            max: MAX_FILENAME_LEN,
        });
    }
    if name.is_empty() || name == b"." || name == b".." || name.iter().any(|&b| b == b'/' || b == 0) {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

/// Decodes the first `count` entries of `block`.
pub fn read_entries<S: BlockStore + ?Sized>(
    store: &S,
    block: BlockNumber,
    count: u64,
) -> Result<Vec<DirEntry>> {
    check_count(count)?;
    let buf = store.read_block(block)?;
    Ok((0..count).map(|i| DirEntry::decode(&buf[slot(i)])).collect())
}

/// Writes `{name, child}` into slot `count` of `block`.
pub fn append_entry<S: BlockStore + ?Sized>(
    store: &S,
    block: BlockNumber,
    count: u64,
    name: &[u8],
    child: InodeNo,
) -> Result<()> {
    if name.len() > MAX_FILENAME_LEN {
        return Err(FsError::NameTooLong {
            len: name.len(),
            max: MAX_FILENAME_LEN,
        });
    }
    if count >= DIR_ENTRIES_PER_BLOCK as u64 {
        return Err(FsError::CapacityExceeded(Capacity::DirectoryBlock));
    }

    let mut buf = store.read_block(block)?;
    DirEntry::new(name, child).encode_into(&mut buf[slot(count)]);
    store.write_block(block, &buf)?;
    store.flush(block)?;
    Ok(())
}

/// First entry whose name equals `name` byte for byte.
pub fn find_entry<S: BlockStore + ?Sized>(
    store: &S,
    block: BlockNumber,
    count: u64,
    name: &[u8],
) -> Result<Option<InodeNo>> {
    Ok(read_entries(store, block, count)?
        .into_iter()
        .find(|e| e.name_bytes() == name)
        .map(|e| e.inode_no))
}
