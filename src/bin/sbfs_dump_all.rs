use std::{collections::HashMap, fs::create_dir_all, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use sbfs::{
    config, fs_layout,
    png_store::{block_to_image, BLOCK_H, BLOCK_W},
    BlockStore, InodeNo, Sbfs,
};

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config: String,

    #[arg(short, long)]
    out: String,
}

// Recorre el árbol desde la raíz y asocia cada inodo con su ruta
fn build_inode_to_path_map<S: BlockStore>(fs: &Sbfs<S>) -> Result<HashMap<InodeNo, String>> {
    let mut map = HashMap::new();
    map.insert(fs_layout::ROOT_INODE_NO, "/".to_string());

    let mut pending = vec![(fs_layout::ROOT_INODE_NO, String::new())];
    while let Some((dir, prefix)) = pending.pop() {
        for entry in fs.list_children(dir)? {
            let path = format!("{}/{}", prefix, entry.name_lossy());
            if fs.inode(entry.inode_no)?.is_dir() {
                pending.push((entry.inode_no, path.clone()));
            }
            map.insert(entry.inode_no, path);
        }
    }

    Ok(map)
}

// Extrae el bloque de datos de un inodo y lo guarda como PNG en escala de grises
fn dump_png<S: BlockStore>(
    fs: &Sbfs<S>,
    inode_no: InodeNo,
    block_id: u64,
    name: &str,
    out_dir: &Path,
) -> Result<()> {
    let raw = fs.store().read_block(block_id)?;
    let safe = name.trim_start_matches('/').replace('/', "_");
    let png_path = out_dir.join(format!("inode_{}_blk_{}_{}.png", inode_no, block_id, safe));

    block_to_image(&raw, BLOCK_W, BLOCK_H)
        .save(&png_path)
        .with_context(|| format!("cannot write {}", png_path.display()))?;
    println!("dumped {}", png_path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Cli::parse();
    let cfg = config::load_config(&args.config)?;
    let out_dir = Path::new(&args.out);
    create_dir_all(out_dir).with_context(|| format!("cannot create {}", args.out))?;

    let fs = Sbfs::open(cfg.open_store()?).context("not an SBFS volume")?;
    let names = build_inode_to_path_map(&fs)?;

    for rec in fs.inodes()? {
        let name = names
            .get(&rec.inode_no)
            .map(|n| if n == "/" { "root" } else { n.as_str() })
            .unwrap_or("orphan");
        dump_png(&fs, rec.inode_no, rec.data_block_number, name, out_dir)?;
    }

    println!("done -> {}", args.out);
    Ok(())
}
