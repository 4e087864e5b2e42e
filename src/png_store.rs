//! A block store that keeps each block as a grayscale PNG.
//!
//! One pixel holds one byte, so a 4096-byte block is a 64x64 image named
//! `block_<n>.png` inside the store directory. Writes land in a dirty map
//! and are encoded to disk on `flush`.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use image::{GrayImage, ImageBuffer, Luma};

use crate::block_store::{check_request, BlockStore};
use crate::fs_layout::{BlockNumber, BLOCK_SIZE};

pub const BLOCK_W: u32 = 64;
pub const BLOCK_H: u32 = 64;

static_assertions::const_assert_eq!((BLOCK_W * BLOCK_H) as usize, BLOCK_SIZE);

/// Lays `buf` out row by row; bytes past the image are dropped and missing
/// pixels stay black.
pub fn block_to_image(buf: &[u8], width: u32, height: u32) -> GrayImage {
    let mut img: GrayImage = ImageBuffer::new(width, height);
    for (i, &value) in buf.iter().take((width * height) as usize).enumerate() {
        let x = i as u32 % width;
        let y = i as u32 / width;
        img.put_pixel(x, y, Luma([value]));
    }
    img
}

/// Reads an image back into a block, zero-filling anything the image lacks.
pub fn image_to_block(img: &GrayImage) -> Vec<u8> {
    let mut out = vec![0u8; BLOCK_SIZE];
    let w = img.width().min(BLOCK_W);
    let h = img.height().min(BLOCK_H);
    for y in 0..h {
        for x in 0..w {
            out[(y * BLOCK_W + x) as usize] = img.get_pixel(x, y)[0];
        }
    }
    out
}

pub struct PngBlockStore {
    dir: PathBuf,
    blocks: u64,
    dirty: Mutex<HashMap<BlockNumber, Vec<u8>>>,
}

impl PngBlockStore {
    /// Opens (creating if needed) a store of `blocks` blocks under `dir`.
    pub fn open(dir: impl AsRef<Path>, blocks: u64) -> io::Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            blocks,
            dirty: Mutex::new(HashMap::new()),
        })
    }

    pub fn block_path(&self, number: BlockNumber) -> PathBuf {
        self.dir.join(format!("block_{}.png", number))
    }

    fn load_block_from_path(path: &Path) -> io::Result<Vec<u8>> {
        if !path.exists() {
            return Ok(vec![0u8; BLOCK_SIZE]);
        }
        let img = image::open(path).map_err(io::Error::other)?;
        Ok(image_to_block(&img.to_luma8()))
    }

    fn save_block_to_path(path: &Path, buf: &[u8]) -> io::Result<()> {
        block_to_image(buf, BLOCK_W, BLOCK_H)
            .save(path)
            .map_err(io::Error::other)
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<BlockNumber, Vec<u8>>>> {
        self.dirty
            .lock()
            .map_err(|_| io::Error::other("png store lock poisoned"))
    }
}

impl BlockStore for PngBlockStore {
    fn block_count(&self) -> u64 {
        self.blocks
    }

    fn read_block(&self, number: BlockNumber) -> io::Result<Vec<u8>> {
        check_request(self, number, None)?;
        if let Some(buf) = self.lock()?.get(&number) {
            return Ok(buf.clone());
        }
        Self::load_block_from_path(&self.block_path(number))
    }

    fn write_block(&self, number: BlockNumber, buf: &[u8]) -> io::Result<()> {
        check_request(self, number, Some(buf.len()))?;
        self.lock()?.insert(number, buf.to_vec());
        Ok(())
    }

    fn flush(&self, number: BlockNumber) -> io::Result<()> {
        check_request(self, number, None)?;
        let mut dirty = self.lock()?;
        if let Some(buf) = dirty.get(&number) {
            Self::save_block_to_path(&self.block_path(number), buf)?;
            dirty.remove(&number);
        }
        Ok(())
    }
}
