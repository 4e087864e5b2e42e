//! Entry point for the `mkfs_sbfs` tool.

use anyhow::{Context, Result};
use clap::Parser;
use sbfs::{config, fs_layout, Sbfs};

/// Creates and formats an SBFS volume described by a config file
#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    let cfg = config::load_config(&args.config)?;

    let store = cfg
        .create_store()
        .with_context(|| format!("cannot create {}", cfg.image_path().display()))?;
    let fs = Sbfs::format(store).context("format failed")?;
    let stats = fs.stats()?;

    println!("SBFS volume {:?} created at {}", cfg.name, cfg.image_path().display());
    println!(
        "  {} blocks of {} bytes, {} objects max, {} free data blocks",
        fs_layout::TOTAL_BLOCKS,
        stats.block_size,
        fs_layout::MAX_OBJECTS,
        stats.free_blocks
    );
    println!("To mount: mount_sbfs -c {} <mountpoint>", args.config);
    Ok(())
}
