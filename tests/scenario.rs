use std::collections::HashSet;

use sbfs::fs_layout::{BLOCK_SIZE, MAX_OBJECTS, RESERVED_BLOCKS, ROOT_INODE_NO, TOTAL_BLOCKS};
use sbfs::{Capacity, FsError, MemBlockStore, Sbfs};

fn fresh() -> Sbfs<MemBlockStore> {
    Sbfs::format(MemBlockStore::new(TOTAL_BLOCKS)).unwrap()
}

#[test]
fn fresh_volume_walkthrough() {
    let fs = fresh();
    let root = fs.root().unwrap();
    assert!(root.is_dir());
    assert_eq!(root.dir_children_count, 0);
    assert!(fs.list_children(ROOT_INODE_NO).unwrap().is_empty());

    let a = fs.create_file(ROOT_INODE_NO, b"a.txt", 0o644).unwrap();
    let listing: Vec<_> = fs
        .list_children(ROOT_INODE_NO)
        .unwrap()
        .iter()
        .map(|e| (e.name_lossy(), e.inode_no))
        .collect();
    assert_eq!(listing, vec![("a.txt".to_string(), 2)]);
    assert_eq!(a.inode_no, 2);

    let data = b"0123456789";
    assert_eq!(fs.write_file(2, 0, data).unwrap(), 10);
    assert_eq!(fs.read_file(2, 0, 100).unwrap(), data);
    assert_eq!(fs.inode(2).unwrap().file_size, 10);
}

#[test]
fn sixty_fifth_object_is_refused() {
    let fs = fresh();
    for i in 2..=MAX_OBJECTS {
        let rec = fs
            .create_file(ROOT_INODE_NO, format!("f{}", i).as_bytes(), 0o644)
            .unwrap();
        assert_eq!(rec.inode_no, i);
    }
    assert_eq!(fs.superblock().unwrap().inode_count, MAX_OBJECTS);

    let before = fs.superblock().unwrap();
    let err = fs.create_file(ROOT_INODE_NO, b"one-too-many", 0o644).unwrap_err();
    assert!(matches!(err, FsError::CapacityExceeded(Capacity::InodeTable)));
    assert_eq!(fs.superblock().unwrap(), before);
}

#[test]
fn inode_numbers_are_unique_creation_ranks() {
    let fs = fresh();
    let mut seen = HashSet::new();
    seen.insert(ROOT_INODE_NO);

    let docs = fs.create_directory(ROOT_INODE_NO, b"docs", 0o755).unwrap();
    let mut expected = 3;
    for name in ["a", "b", "c"] {
        let rec = fs.create_file(docs.inode_no, name.as_bytes(), 0o644).unwrap();
        assert_eq!(rec.inode_no, expected);
        assert!(seen.insert(rec.inode_no));
        expected += 1;
    }
    let nested = fs.create_directory(docs.inode_no, b"nested", 0o700).unwrap();
    assert!(seen.insert(nested.inode_no));

    // 1 root + docs + 3 files + nested
    assert_eq!(fs.superblock().unwrap().inode_count, 6);
    let all: Vec<_> = fs.inodes().unwrap().iter().map(|r| r.inode_no).collect();
    assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn listing_matches_child_count_and_repeats() {
    let fs = fresh();
    let d = fs.create_directory(ROOT_INODE_NO, b"d", 0o755).unwrap();
    for i in 0..5 {
        fs.create_file(d.inode_no, format!("n{}", i).as_bytes(), 0o644)
            .unwrap();
    }

    let first = fs.list_children(d.inode_no).unwrap();
    let second = fs.list_children(d.inode_no).unwrap();
    assert_eq!(first.len() as u64, fs.inode(d.inode_no).unwrap().dir_children_count);
    assert_eq!(first, second);
    assert_eq!(first[0].name_lossy(), "n0");
    assert_eq!(first[4].name_lossy(), "n4");
}

#[test]
fn lookup_descends_through_directories() {
    let fs = fresh();
    let a = fs.create_directory(ROOT_INODE_NO, b"a", 0o755).unwrap();
    let b = fs.create_directory(a.inode_no, b"b", 0o755).unwrap();
    let leaf = fs.create_file(b.inode_no, b"leaf", 0o644).unwrap();

    let found_a = fs.lookup_child(ROOT_INODE_NO, b"a").unwrap().unwrap();
    let found_b = fs.lookup_child(found_a.inode_no, b"b").unwrap().unwrap();
    let found_leaf = fs.lookup_child(found_b.inode_no, b"leaf").unwrap().unwrap();
    assert_eq!(found_leaf, leaf);

    // names are scoped to their directory
    assert_eq!(fs.lookup_child(ROOT_INODE_NO, b"leaf").unwrap(), None);
}

#[test]
fn same_name_in_different_directories() {
    let fs = fresh();
    let a = fs.create_directory(ROOT_INODE_NO, b"a", 0o755).unwrap();
    let x1 = fs.create_file(ROOT_INODE_NO, b"x", 0o644).unwrap();
    let x2 = fs.create_file(a.inode_no, b"x", 0o644).unwrap();
    assert_ne!(x1.inode_no, x2.inode_no);
}

#[test]
fn read_round_trips_and_never_leaks_past_size() {
    let fs = fresh();
    let f = fs.create_file(ROOT_INODE_NO, b"f", 0o644).unwrap();

    fs.write_file(f.inode_no, 100, b"payload").unwrap();
    assert_eq!(fs.read_file(f.inode_no, 100, 7).unwrap(), b"payload");
    assert_eq!(fs.inode(f.inode_no).unwrap().file_size, 107);

    // the gap before the first write reads as zeros
    assert_eq!(fs.read_file(f.inode_no, 0, 4).unwrap(), vec![0u8; 4]);

    let tail = fs.read_file(f.inode_no, 104, 50).unwrap();
    assert_eq!(tail, b"oad");
}

#[test]
fn write_at_block_end_is_allowed() {
    let fs = fresh();
    let f = fs.create_file(ROOT_INODE_NO, b"f", 0o644).unwrap();
    let off = (BLOCK_SIZE - 3) as u64;

    fs.write_file(f.inode_no, off, b"end").unwrap();
    assert_eq!(fs.read_file(f.inode_no, off, 10).unwrap(), b"end");
    assert!(matches!(
        fs.write_file(f.inode_no, off, b"ends"),
        Err(FsError::CapacityExceeded(Capacity::FileBlock))
    ));
}

#[test]
fn data_blocks_stay_above_reserved_area() {
    let fs = fresh();
    for i in 0..10 {
        let rec = fs
            .create_file(ROOT_INODE_NO, format!("f{}", i).as_bytes(), 0o644)
            .unwrap();
        assert!(rec.data_block_number >= RESERVED_BLOCKS);
        assert!(rec.data_block_number < TOTAL_BLOCKS);
    }
    let blocks: HashSet<_> = fs
        .inodes()
        .unwrap()
        .iter()
        .map(|r| r.data_block_number)
        .collect();
    assert_eq!(blocks.len(), 11);
}
