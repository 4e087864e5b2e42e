//! Configuration loader for SBFS.
//!
//! `mkfs_sbfs`, `mount_sbfs` and the inspection tools all read the same
//! `config.ini`:
//!
//! ```ini
//! [filesystem]
//! name = sbfs
//! block_size = 4096
//!
//! [storage]
//! backend = file
//! data_dir = /tmp/sbfs_data
//! image_prefix = sbfs
//!
//! [mount]
//! read_only = false
//! auto_unmount = true
//! ```
//!
//! Every `[filesystem]` and `[storage]` key is mandatory. The `[mount]`
//! section is optional.

use std::{io, path::PathBuf};

use configparser::ini::Ini;
use thiserror::Error;

use crate::block_store::{BlockStore, FileBlockStore};
use crate::fs_layout::{BLOCK_SIZE, TOTAL_BLOCKS};
use crate::png_store::PngBlockStore;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where blocks are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// One `.img` file holding every block.
    File,
    /// One grayscale PNG per block inside a directory.
    Png,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbfsConfig {
    /// Human-readable name, used as the FUSE fsname.
    pub name: String,

    /// Size of one block in bytes. Must match the compiled-in block size.
    pub block_size: u64,

    pub backend: Backend,

    /// Directory holding the image file or the PNG block directory.
    pub data_dir: String,

    /// Example: "sbfs" -> "sbfs.img" (file) or "sbfs/" (png)
    pub image_prefix: String,

    pub read_only: bool,
    pub auto_unmount: bool,
}

impl SbfsConfig {
    /// Path of the backing store: an image file or a PNG directory.
    pub fn image_path(&self) -> PathBuf {
        let base = PathBuf::from(&self.data_dir);
        match self.backend {
            Backend::File => base.join(format!("{}.img", self.image_prefix)),
            Backend::Png => base.join(&self.image_prefix),
        }
    }

    /// Creates an empty backing store sized for a full volume.
    pub fn create_store(&self) -> io::Result<Box<dyn BlockStore>> {
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.image_path();
        let store: Box<dyn BlockStore> = match self.backend {
            Backend::File => Box::new(FileBlockStore::create(path, TOTAL_BLOCKS)?),
            Backend::Png => {
                if path.exists() {
                    std::fs::remove_dir_all(&path)?;
                }
                Box::new(PngBlockStore::open(path, TOTAL_BLOCKS)?)
            }
        };
        Ok(store)
    }

    /// Opens the existing backing store.
    pub fn open_store(&self) -> io::Result<Box<dyn BlockStore>> {
        let path = self.image_path();
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no filesystem at {}", path.display()),
            ));
        }
        let store: Box<dyn BlockStore> = match self.backend {
            Backend::File => Box::new(FileBlockStore::open(path)?),
            Backend::Png => Box::new(PngBlockStore::open(path, TOTAL_BLOCKS)?),
        };
        Ok(store)
    }
}

/// Loads and validates the configuration at `path`.
pub fn load_config(path: &str) -> Result<SbfsConfig, ConfigError> {
    let mut ini = Ini::new();
    ini.load(path).map_err(|reason| ConfigError::Load {
        path: path.to_string(),
        reason,
    })?;
    parse(&ini)
}

/// Same as [`load_config`] but from INI text already in memory.
pub fn parse_config(text: &str) -> Result<SbfsConfig, ConfigError> {
    let mut ini = Ini::new();
    ini.read(text.to_string()).map_err(|reason| ConfigError::Load {
        path: "<string>".to_string(),
        reason,
    })?;
    parse(&ini)
}

fn parse(ini: &Ini) -> Result<SbfsConfig, ConfigError> {
    // [filesystem]
    let name = required(ini, "filesystem", "name", "filesystem.name")?;

    let block_size = ini
        .getuint("filesystem", "block_size")
        .map_err(|reason| ConfigError::Invalid {
            key: "filesystem.block_size",
            reason,
        })?
        .ok_or(ConfigError::Missing("filesystem.block_size"))?;
    if block_size != BLOCK_SIZE as u64 {
        return Err(ConfigError::Invalid {
            key: "filesystem.block_size",
            reason: format!("{} is not supported, use {}", block_size, BLOCK_SIZE),
        });
    }

    // [storage]
    let backend = match required(ini, "storage", "backend", "storage.backend")?.as_str() {
        "file" => Backend::File,
        "png" => Backend::Png,
        other => {
            return Err(ConfigError::Invalid {
                key: "storage.backend",
                reason: format!("unknown backend {:?} (expected file or png)", other),
            })
        }
    };
    let data_dir = required(ini, "storage", "data_dir", "storage.data_dir")?;
    let image_prefix = required(ini, "storage", "image_prefix", "storage.image_prefix")?;

    // [mount]
    let read_only = flag(ini, "read_only", "mount.read_only", false)?;
    let auto_unmount = flag(ini, "auto_unmount", "mount.auto_unmount", true)?;

    Ok(SbfsConfig {
        name,
        block_size,
        backend,
        data_dir,
        image_prefix,
        read_only,
        auto_unmount,
    })
}

fn required(
    ini: &Ini,
    section: &str,
    key: &str,
    full: &'static str,
) -> Result<String, ConfigError> {
    ini.get(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(full))
}

fn flag(ini: &Ini, key: &str, full: &'static str, default: bool) -> Result<bool, ConfigError> {
    ini.getboolcoerce("mount", key)
        .map_err(|reason| ConfigError::Invalid { key: full, reason })
        .map(|v| v.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[filesystem]
name = testfs
block_size = 4096

[storage]
backend = png
data_dir = /tmp/sbfs_test
image_prefix = vol
";

    #[test]
    fn mount_section_is_optional() {
        let cfg = parse_config(SAMPLE).unwrap();
        assert_eq!(cfg.name, "testfs");
        assert_eq!(cfg.backend, Backend::Png);
        assert!(!cfg.read_only);
        assert!(cfg.auto_unmount);
        assert_eq!(cfg.image_path(), PathBuf::from("/tmp/sbfs_test/vol"));
    }

    #[test]
    fn file_backend_names_an_img() {
        let text = SAMPLE.replace("backend = png", "backend = file");
        let cfg = parse_config(&text).unwrap();
        assert_eq!(cfg.image_path(), PathBuf::from("/tmp/sbfs_test/vol.img"));
    }

    #[test]
    fn rejects_foreign_block_size() {
        let text = SAMPLE.replace("4096", "512");
        assert!(matches!(
            parse_config(&text),
            Err(ConfigError::Invalid { key: "filesystem.block_size", .. })
        ));
    }

    #[test]
    fn rejects_unknown_backend() {
        let text = SAMPLE.replace("backend = png", "backend = tape");
        assert!(matches!(
            parse_config(&text),
            Err(ConfigError::Invalid { key: "storage.backend", .. })
        ));
    }

    #[test]
    fn reports_missing_keys() {
        let text = SAMPLE.replace("image_prefix = vol\n", "");
        assert!(matches!(
            parse_config(&text),
            Err(ConfigError::Missing("storage.image_prefix"))
        ));
    }

    #[test]
    fn reads_mount_flags() {
        let text = format!("{}\n[mount]\nread_only = true\nauto_unmount = false\n", SAMPLE);
        let cfg = parse_config(&text).unwrap();
        assert!(cfg.read_only);
        assert!(!cfg.auto_unmount);
    }
}
