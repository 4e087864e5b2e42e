//! CLI entry point for `sbfs_info`
//!
//! Usage:
//!     sbfs_info <image_file>
//!     sbfs_info -c config.ini

use anyhow::{bail, Context, Result};
use clap::Parser;
use sbfs::{config, fs_layout, BlockStore, FileBlockStore, InodeNo, Sbfs};

/// Simple inspection tool for SBFS volumes
#[derive(Parser)]
struct Cli {
    /// Path to the .img file
    image: Option<String>,

    /// Read the backing store from a config file instead
    #[arg(short, long)]
    config: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Cli::parse();
    let store: Box<dyn BlockStore> = match (&args.image, &args.config) {
        (Some(image), None) => Box::new(
            FileBlockStore::open(image).with_context(|| format!("cannot open {}", image))?,
        ),
        (None, Some(cfg)) => config::load_config(cfg)?.open_store()?,
        _ => bail!("pass either an image path or --config"),
    };

    let fs = Sbfs::open(store).context("not an SBFS volume")?;
    print_fs_info(&fs)
}

fn print_fs_info<S: BlockStore>(fs: &Sbfs<S>) -> Result<()> {
    let sb = fs.superblock()?;
    let stats = fs.stats()?;

    println!("====== SBFS SUPERBLOCK ======");
    println!(
        "Magic:           {:?}",
        std::str::from_utf8(&sb.magic.to_le_bytes()).unwrap_or("???")
    );
    println!("Version:         {}", sb.version);
    println!("Block size:      {} bytes", sb.block_size);
    println!("Inode count:     {} / {}", sb.inode_count, fs_layout::MAX_OBJECTS);
    println!("Free blocks:     {} / {}", stats.free_blocks, stats.data_blocks);
    print!("Free bitmap:     ");
    for blk in 0..fs_layout::TOTAL_BLOCKS {
        print!("{}", if sb.is_free(blk) { '.' } else { '#' });
    }
    println!();

    println!("\n====== INODE TABLE ======");
    for rec in fs.inodes()? {
        let kind = if rec.is_dir() { "dir " } else { "file" };
        let size = if rec.is_dir() {
            format!("{} entries", rec.dir_children_count)
        } else {
            format!("{} bytes", rec.file_size)
        };
        println!(
            "- inode {:>2} : {} 0o{:04o} block {:>2} {}",
            rec.inode_no,
            kind,
            rec.perm(),
            rec.data_block_number,
            size
        );
    }

    println!("\n====== DIRECTORY TREE ======");
    println!("/");
    print_tree(fs, fs_layout::ROOT_INODE_NO, 1)
}

fn print_tree<S: BlockStore>(fs: &Sbfs<S>, dir: InodeNo, depth: usize) -> Result<()> {
    for entry in fs.list_children(dir)? {
        let rec = fs.inode(entry.inode_no)?;
        let suffix = if rec.is_dir() { "/" } else { "" };
        println!(
            "{}{}{} (inode {})",
            "  ".repeat(depth),
            entry.name_lossy(),
            suffix,
            rec.inode_no
        );
        if rec.is_dir() {
            print_tree(fs, rec.inode_no, depth + 1)?;
        }
    }
    Ok(())
}
