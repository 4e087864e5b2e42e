//! Filesystem operations over a [`BlockStore`].
//!
//! `Sbfs` owns the store and the cached superblock. One `RwLock` covers the
//! whole instance: creations and writes hold it exclusively for their full
//! allocate, link, persist sequence, while lookups, listings and reads share
//! it.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};

use crate::block_store::BlockStore;
use crate::directory;
use crate::error::{Capacity, FsError, Result};
use crate::fs_layout::*;
use crate::inode_table;
use crate::superblock;

/// Usage figures for `statfs` and the info tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub block_size: u64,
    pub data_blocks: u64,
    pub free_blocks: u64,
    pub inodes: u64,
    pub free_inodes: u64,
    pub name_max: u64,
}

pub struct Sbfs<S: BlockStore> {
    store: S,
    sb: RwLock<SuperblockInfo>,
}

impl<S: BlockStore> Sbfs<S> {
    /// Formats `store` and returns a handle to the empty volume.
    pub fn format(store: S) -> Result<Self> {
        let sb = superblock::format(&store, BLOCK_SIZE)?;
        Ok(Self {
            store,
            sb: RwLock::new(sb),
        })
    }

    /// Mounts an already formatted store.
    pub fn open(store: S) -> Result<Self> {
        let sb = superblock::load(&store)?;
        match inode_table::find(&store, &sb, ROOT_INODE_NO)? {
            Some(root) if root.is_dir() => {}
            _ => {
                return Err(FsError::InvalidFormat(
                    "root directory missing from inode table".into(),
                ))
            }
        }

        info!(
            "opened volume: {} of {} objects in use",
            sb.inode_count, MAX_OBJECTS
        );
        Ok(Self {
            store,
            sb: RwLock::new(sb),
        })
    }

    /// Gives the block store back, e.g. to reopen it.
    pub fn into_store(self) -> S {
        self.store
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, SuperblockInfo>> {
        self.sb
            .read()
            .map_err(|_| FsError::StorageIo(std::io::Error::other("filesystem lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, SuperblockInfo>> {
        self.sb
            .write()
            .map_err(|_| FsError::StorageIo(std::io::Error::other("filesystem lock poisoned")))
    }

    fn record(&self, sb: &SuperblockInfo, inode_no: InodeNo) -> Result<InodeRecord> {
        inode_table::find(&self.store, sb, inode_no)?.ok_or(FsError::NotFound(inode_no))
    }

    fn dir_record(&self, sb: &SuperblockInfo, inode_no: InodeNo) -> Result<InodeRecord> {
        let rec = self.record(sb, inode_no)?;
        if !rec.is_dir() {
            return Err(FsError::NotADirectory(inode_no));
        }
        Ok(rec)
    }

    fn file_record(&self, sb: &SuperblockInfo, inode_no: InodeNo) -> Result<InodeRecord> {
        let rec = self.record(sb, inode_no)?;
        if rec.is_dir() {
            return Err(FsError::NotAFile(inode_no));
        }
        if rec.file_size > BLOCK_SIZE as u64 {
            return Err(FsError::InvalidFormat(format!(
                "inode {} claims {} bytes",
                inode_no, rec.file_size
            )));
        }
        Ok(rec)
    }

    /// A copy of the cached superblock.
    pub fn superblock(&self) -> Result<SuperblockInfo> {
        Ok(*self.read()?)
    }

    pub fn inode(&self, inode_no: InodeNo) -> Result<InodeRecord> {
        let sb = self.read()?;
        self.record(&sb, inode_no)
    }

    pub fn root(&self) -> Result<InodeRecord> {
        self.inode(ROOT_INODE_NO)
    }

    /// All live inode records in creation order.
    pub fn inodes(&self) -> Result<Vec<InodeRecord>> {
        let sb = self.read()?;
        inode_table::records(&self.store, &sb)
    }

    pub fn stats(&self) -> Result<FsStats> {
        let sb = self.read()?;
        Ok(FsStats {
            block_size: BLOCK_SIZE as u64,
            data_blocks: TOTAL_BLOCKS - RESERVED_BLOCKS,
            free_blocks: sb.free_block_count(),
            inodes: sb.inode_count,
            free_inodes: MAX_OBJECTS - sb.inode_count,
            name_max: MAX_FILENAME_LEN as u64,
        })
    }

    /// Creates a file or directory named `name` inside directory `parent`.
    ///
    /// Every precondition is checked before a block is allocated. A storage
    /// failure after allocation leaves the block (and possibly the inode)
    /// orphaned; it is logged, not rolled back.
    pub fn create_object(
        &self,
        parent: InodeNo,
        name: &[u8],
        kind: InodeKind,
        perm: u32,
    ) -> Result<InodeRecord> {
        directory::validate_name(name)?;

        let mut sb = self.write()?;
        let mut parent_rec = self.dir_record(&sb, parent)?;

        if sb.inode_count >= MAX_OBJECTS {
            return Err(FsError::CapacityExceeded(Capacity::InodeTable));
        }
        if parent_rec.dir_children_count >= DIR_ENTRIES_PER_BLOCK as u64 {
            return Err(FsError::CapacityExceeded(Capacity::DirectoryBlock));
        }
        if directory::find_entry(
            &self.store,
            parent_rec.data_block_number,
            parent_rec.dir_children_count,
            name,
        )?
        .is_some()
        {
            return Err(FsError::AlreadyExists);
        }

        let blk = superblock::allocate_block(&self.store, &mut sb)?;
        let record = InodeRecord::new(sb.inode_count + 1, kind, perm, blk);

        if let Err(e) = self.link(&mut sb, &mut parent_rec, name, &record) {
            warn!(
                "create of {:?} in inode {} failed after allocating block {}: {}",
                String::from_utf8_lossy(name),
                parent,
                blk,
                e
            );
            return Err(e);
        }

        debug!(
            "created {:?} {:?} as inode {} (block {}) in inode {}",
            kind,
            String::from_utf8_lossy(name),
            record.inode_no,
            blk,
            parent
        );
        Ok(record)
    }

    fn link(
        &self,
        sb: &mut SuperblockInfo,
        parent: &mut InodeRecord,
        name: &[u8],
        record: &InodeRecord,
    ) -> Result<()> {
        // Fresh blocks may hold bytes from an earlier format.
        let zero = vec![0u8; BLOCK_SIZE];
        self.store.write_block(record.data_block_number, &zero)?;
        self.store.flush(record.data_block_number)?;

        inode_table::append(&self.store, sb, record)?;

        directory::append_entry(
            &self.store,
            parent.data_block_number,
            parent.dir_children_count,
            name,
            record.inode_no,
        )?;

        parent.dir_children_count += 1;
        inode_table::update(&self.store, sb, parent)
    }

    pub fn create_file(&self, parent: InodeNo, name: &[u8], perm: u32) -> Result<InodeRecord> {
        self.create_object(parent, name, InodeKind::File, perm)
    }

    pub fn create_directory(&self, parent: InodeNo, name: &[u8], perm: u32) -> Result<InodeRecord> {
        self.create_object(parent, name, InodeKind::Directory, perm)
    }

    pub fn lookup_child(&self, parent: InodeNo, name: &[u8]) -> Result<Option<InodeRecord>> {
        let sb = self.read()?;
        let parent_rec = self.dir_record(&sb, parent)?;

        let Some(child) = directory::find_entry(
            &self.store,
            parent_rec.data_block_number,
            parent_rec.dir_children_count,
            name,
        )?
        else {
            return Ok(None);
        };
        inode_table::find(&self.store, &sb, child)
    }

    /// The entries of directory `dir`, in creation order.
    pub fn list_children(&self, dir: InodeNo) -> Result<Vec<DirEntry>> {
        let sb = self.read()?;
        let rec = self.dir_record(&sb, dir)?;
        directory::read_entries(&self.store, rec.data_block_number, rec.dir_children_count)
    }

    /// Up to `max_len` bytes of `file` starting at `offset`, never past its size.
    pub fn read_file(&self, file: InodeNo, offset: u64, max_len: usize) -> Result<Vec<u8>> {
        let sb = self.read()?;
        let rec = self.file_record(&sb, file)?;

        if offset >= rec.file_size {
            return Ok(Vec::new());
        }
        let len = (rec.file_size - offset).min(max_len as u64) as usize;
        let start = offset as usize;

        let buf = self.store.read_block(rec.data_block_number)?;
        Ok(buf[start..start + len].to_vec())
    }

    /// Writes `data` at `offset` within the single block of `file`.
    pub fn write_file(&self, file: InodeNo, offset: u64, data: &[u8]) -> Result<usize> {
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= BLOCK_SIZE as u64)
            .ok_or(FsError::CapacityExceeded(Capacity::FileBlock))?;

        let sb = self.write()?;
        let mut rec = self.file_record(&sb, file)?;

        let mut buf = self.store.read_block(rec.data_block_number)?;
        buf[offset as usize..end as usize].copy_from_slice(data);
        self.store.write_block(rec.data_block_number, &buf)?;
        self.store.flush(rec.data_block_number)?;

        rec.file_size = rec.file_size.max(end);
        inode_table::update(&self.store, &sb, &rec)?;

        debug!(
            "wrote {} bytes at {} to inode {} (size now {})",
            data.len(),
            offset,
            file,
            rec.file_size
        );
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_store::MemBlockStore;

    fn fresh() -> Sbfs<MemBlockStore> {
        Sbfs::format(MemBlockStore::new(TOTAL_BLOCKS)).unwrap()
    }

    #[test]
    fn inode_numbers_follow_creation_rank() {
        let fs = fresh();
        let a = fs.create_file(ROOT_INODE_NO, b"a", 0o644).unwrap();
        let d = fs.create_directory(ROOT_INODE_NO, b"d", 0o755).unwrap();
        let b = fs.create_file(d.inode_no, b"b", 0o600).unwrap();

        assert_eq!((a.inode_no, d.inode_no, b.inode_no), (2, 3, 4));
        assert_eq!(fs.superblock().unwrap().inode_count, 4);
        assert_eq!(fs.root().unwrap().dir_children_count, 2);
        assert_eq!(fs.inode(3).unwrap().dir_children_count, 1);
    }

    #[test]
    fn lookup_finds_fresh_children_only() {
        let fs = fresh();
        let a = fs.create_file(ROOT_INODE_NO, b"a.txt", 0o644).unwrap();
        assert_eq!(fs.lookup_child(ROOT_INODE_NO, b"a.txt").unwrap(), Some(a));
        assert_eq!(fs.lookup_child(ROOT_INODE_NO, b"b.txt").unwrap(), None);
    }

    #[test]
    fn duplicate_names_are_rejected_without_allocating() {
        let fs = fresh();
        fs.create_file(ROOT_INODE_NO, b"x", 0o644).unwrap();
        let before = fs.superblock().unwrap();

        assert!(matches!(
            fs.create_directory(ROOT_INODE_NO, b"x", 0o755),
            Err(FsError::AlreadyExists)
        ));
        assert_eq!(fs.superblock().unwrap(), before);
    }

    #[test]
    fn bad_names_fail_before_allocation() {
        let fs = fresh();
        let long = [b'a'; MAX_FILENAME_LEN + 1];
        assert!(matches!(
            fs.create_file(ROOT_INODE_NO, &long, 0o644),
            Err(FsError::NameTooLong { .. })
        ));
        assert!(matches!(
            fs.create_file(ROOT_INODE_NO, b"a/b", 0o644),
            Err(FsError::InvalidName)
        ));
        assert_eq!(fs.stats().unwrap().free_blocks, MAX_OBJECTS - 1);
    }

    #[test]
    fn files_are_not_parents() {
        let fs = fresh();
        let f = fs.create_file(ROOT_INODE_NO, b"f", 0o644).unwrap();
        assert!(matches!(
            fs.create_file(f.inode_no, b"g", 0o644),
            Err(FsError::NotADirectory(2))
        ));
        assert!(matches!(fs.list_children(f.inode_no), Err(FsError::NotADirectory(2))));
        assert!(matches!(
            fs.create_file(42, b"g", 0o644),
            Err(FsError::NotFound(42))
        ));
    }

    #[test]
    fn directories_do_not_hold_bytes() {
        let fs = fresh();
        assert!(matches!(
            fs.write_file(ROOT_INODE_NO, 0, b"hi"),
            Err(FsError::NotAFile(1))
        ));
        assert!(matches!(
            fs.read_file(ROOT_INODE_NO, 0, 1),
            Err(FsError::NotAFile(1))
        ));
    }

    #[test]
    fn read_stops_at_file_size() {
        let fs = fresh();
        let f = fs.create_file(ROOT_INODE_NO, b"f", 0o644).unwrap();
        fs.write_file(f.inode_no, 0, b"hello world").unwrap();

        assert_eq!(fs.read_file(f.inode_no, 6, 100).unwrap(), b"world");
        assert_eq!(fs.read_file(f.inode_no, 0, 5).unwrap(), b"hello");
        assert!(fs.read_file(f.inode_no, 11, 10).unwrap().is_empty());
        assert!(fs.read_file(f.inode_no, 500, 10).unwrap().is_empty());
    }

    #[test]
    fn overwrite_inside_file_keeps_size() {
        let fs = fresh();
        let f = fs.create_file(ROOT_INODE_NO, b"f", 0o644).unwrap();
        fs.write_file(f.inode_no, 0, b"abcdef").unwrap();
        fs.write_file(f.inode_no, 1, b"XY").unwrap();

        assert_eq!(fs.inode(f.inode_no).unwrap().file_size, 6);
        assert_eq!(fs.read_file(f.inode_no, 0, 64).unwrap(), b"aXYdef");
    }

    #[test]
    fn writes_are_bounded_by_one_block() {
        let fs = fresh();
        let f = fs.create_file(ROOT_INODE_NO, b"f", 0o644).unwrap();

        let full = vec![0x5Au8; BLOCK_SIZE];
        assert_eq!(fs.write_file(f.inode_no, 0, &full).unwrap(), BLOCK_SIZE);
        assert!(matches!(
            fs.write_file(f.inode_no, 1, &full),
            Err(FsError::CapacityExceeded(Capacity::FileBlock))
        ));
        assert!(matches!(
            fs.write_file(f.inode_no, u64::MAX, b"x"),
            Err(FsError::CapacityExceeded(Capacity::FileBlock))
        ));
        assert_eq!(fs.inode(f.inode_no).unwrap().file_size, BLOCK_SIZE as u64);
    }

    #[test]
    fn sibling_files_do_not_share_bytes() {
        let fs = fresh();
        let a = fs.create_file(ROOT_INODE_NO, b"a", 0o644).unwrap();
        let b = fs.create_file(ROOT_INODE_NO, b"b", 0o644).unwrap();
        fs.write_file(a.inode_no, 0, b"aaaa").unwrap();
        fs.write_file(b.inode_no, 0, b"bb").unwrap();

        assert_eq!(fs.read_file(a.inode_no, 0, 10).unwrap(), b"aaaa");
        assert_eq!(fs.read_file(b.inode_no, 0, 10).unwrap(), b"bb");
    }

    #[test]
    fn stats_track_usage() {
        let fs = fresh();
        fs.create_file(ROOT_INODE_NO, b"a", 0o644).unwrap();
        let st = fs.stats().unwrap();
        assert_eq!(st.inodes, 2);
        assert_eq!(st.free_inodes, MAX_OBJECTS - 2);
        assert_eq!(st.free_blocks, MAX_OBJECTS - 2);
        assert_eq!(st.data_blocks, MAX_OBJECTS);
    }
}
