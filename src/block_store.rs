//! Block stores: the fixed-size block device the filesystem sits on.
//!
//! The engine writes a block and then flushes it; a block is only
//! considered durable once `flush` has returned.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use crate::fs_layout::{BlockNumber, BLOCK_SIZE};

pub trait BlockStore: Send + Sync {
    /// Bytes per block. Every buffer going in or out has this length.
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// Number of addressable blocks.
    fn block_count(&self) -> u64;

    fn read_block(&self, number: BlockNumber) -> io::Result<Vec<u8>>;

    fn write_block(&self, number: BlockNumber, buf: &[u8]) -> io::Result<()>;

    fn flush(&self, number: BlockNumber) -> io::Result<()>;
}

impl<T: BlockStore + ?Sized> BlockStore for Box<T> {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn read_block(&self, number: BlockNumber) -> io::Result<Vec<u8>> {
        (**self).read_block(number)
    }

    fn write_block(&self, number: BlockNumber, buf: &[u8]) -> io::Result<()> {
        (**self).write_block(number, buf)
    }

    fn flush(&self, number: BlockNumber) -> io::Result<()> {
        (**self).flush(number)
    }
}

pub(crate) fn check_request(
    store: &impl BlockStore,
    number: BlockNumber,
    len: Option<usize>,
) -> io::Result<()> {
    if number >= store.block_count() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("block {} out of range (device has {})", number, store.block_count()),
        ));
    }
    if let Some(len) = len {
        if len != store.block_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer is {} bytes, block size is {}", len, store.block_size()),
            ));
        }
    }
    Ok(())
}

/// A store backed by a single image file.
pub struct FileBlockStore {
    file: Mutex<File>,
    blocks: u64,
}

impl FileBlockStore {
    /// Creates (or truncates) an image holding `blocks` zeroed blocks.
    pub fn create(path: impl AsRef<Path>, blocks: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(blocks * BLOCK_SIZE as u64)?;

        Ok(Self {
            file: Mutex::new(file),
            blocks,
        })
    }

    /// Opens an existing image; trailing bytes short of a block are ignored.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let blocks = file.metadata()?.len() / BLOCK_SIZE as u64;

        Ok(Self {
            file: Mutex::new(file),
            blocks,
        })
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| io::Error::other("image file lock poisoned"))
    }
}

impl BlockStore for FileBlockStore {
    fn block_count(&self) -> u64 {
        self.blocks
    }

    fn read_block(&self, number: BlockNumber) -> io::Result<Vec<u8>> {
        check_request(self, number, None)?;
        let mut file = self.lock()?;

        let mut buf = vec![0u8; BLOCK_SIZE];
        file.seek(SeekFrom::Start(number * BLOCK_SIZE as u64))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_block(&self, number: BlockNumber, buf: &[u8]) -> io::Result<()> {
        check_request(self, number, Some(buf.len()))?;
        let mut file = self.lock()?;

        file.seek(SeekFrom::Start(number * BLOCK_SIZE as u64))?;
        file.write_all(buf)
    }

    fn flush(&self, number: BlockNumber) -> io::Result<()> {
        check_request(self, number, None)?;
        let file = self.lock()?;
        file.sync_data()
    }
}

/// A store that keeps every block in memory.
pub struct MemBlockStore {
    blocks: Mutex<Vec<Vec<u8>>>,
    count: u64,
}

impl MemBlockStore {
    pub fn new(count: u64) -> Self {
        Self {
            blocks: Mutex::new(vec![vec![0u8; BLOCK_SIZE]; count as usize]),
            count,
        }
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Vec<Vec<u8>>>> {
        self.blocks
            .lock()
            .map_err(|_| io::Error::other("memory store lock poisoned"))
    }
}

impl BlockStore for MemBlockStore {
    fn block_count(&self) -> u64 {
        self.count
    }

    fn read_block(&self, number: BlockNumber) -> io::Result<Vec<u8>> {
        check_request(self, number, None)?;
        Ok(self.lock()?[number as usize].clone())
    }

    fn write_block(&self, number: BlockNumber, buf: &[u8]) -> io::Result<()> {
        check_request(self, number, Some(buf.len()))?;
        self.lock()?[number as usize].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self, number: BlockNumber) -> io::Result<()> {
        check_request(self, number, None)
    }
}
