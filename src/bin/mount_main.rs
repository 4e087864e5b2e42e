//! Entry point for the `mount_sbfs` tool.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use sbfs::{config, mount_fuse::SbfsFuse, Sbfs};

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config: String,

    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    let cfg = config::load_config(&args.config)?;

    if !Path::new(&args.mountpoint).exists() {
        bail!(
            "mount point {} does not exist, create it first: mkdir -p {}",
            args.mountpoint,
            args.mountpoint
        );
    }

    let store = cfg
        .open_store()
        .context("run mkfs_sbfs first to create the filesystem")?;
    let fs = Sbfs::open(store).context("not an SBFS volume")?;

    let mut options = vec![fuser::MountOption::FSName(cfg.name.clone())];
    options.push(if cfg.read_only {
        fuser::MountOption::RO
    } else {
        fuser::MountOption::RW
    });
    if cfg.auto_unmount {
        options.push(fuser::MountOption::AutoUnmount);
    }

    info!(
        "mounting {} on {} (press Ctrl+C to unmount)",
        cfg.image_path().display(),
        args.mountpoint
    );
    fuser::mount2(SbfsFuse::new(fs), &args.mountpoint, &options)
        .with_context(|| format!("failed to mount on {}", args.mountpoint))?;

    info!("filesystem unmounted");
    Ok(())
}
