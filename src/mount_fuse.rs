use std::{
    ffi::OsStr,
    os::unix::ffi::OsStrExt,
    time::{Duration, SystemTime},
};

use fuser::*;
use log::{debug, warn};

use crate::block_store::BlockStore;
use crate::error::FsError;
use crate::fs::Sbfs;
use crate::fs_layout::*;

// Tiempo de vida para atributos en caché del kernel
const TTL: Duration = Duration::from_secs(1);

/// Translates FUSE requests into [`Sbfs`] operations.
///
/// Inode numbers are passed through unchanged: the root is inode 1 on disk,
/// which is also FUSE's root id.
pub struct SbfsFuse<S: BlockStore> {
    fs: Sbfs<S>,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

impl<S: BlockStore> SbfsFuse<S> {
    pub fn new(fs: Sbfs<S>) -> Self {
        // SAFETY: getuid/getgid cannot fail and touch no memory.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            fs,
            uid,
            gid,
            mounted_at: SystemTime::now(),
        }
    }

    pub fn into_inner(self) -> Sbfs<S> {
        self.fs
    }

    /// Converts an inode record into FUSE attributes.
    pub fn attr(&self, rec: &InodeRecord) -> FileAttr {
        let (kind, size, nlink) = if rec.is_dir() {
            (FileType::Directory, BLOCK_SIZE as u64, 2)
        } else {
            (FileType::RegularFile, rec.file_size, 1)
        };

        FileAttr {
            ino: rec.inode_no,
            size,
            blocks: 1,
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind,
            perm: rec.perm() as u16,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE as u32,
        }
    }

    fn create_entry(
        &self,
        parent: u64,
        name: &OsStr,
        kind: InodeKind,
        mode: u32,
        umask: u32,
    ) -> Result<FileAttr, FsError> {
        let rec = self
            .fs
            .create_object(parent, name.as_bytes(), kind, mode & !umask)?;
        Ok(self.attr(&rec))
    }
}

fn reply_err(op: &str, e: FsError) -> i32 {
    match e {
        FsError::NotFound(_) => debug!("{}: {}", op, e),
        _ => warn!("{}: {}", op, e),
    }
    e.errno()
}

impl<S: BlockStore> Filesystem for SbfsFuse<S> {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup(parent = {}, name = {:?})", parent, name);

        match self.fs.lookup_child(parent, name.as_bytes()) {
            Ok(Some(rec)) => reply.entry(&TTL, &self.attr(&rec), 0),
            Ok(None) => reply.error(libc::ENOENT),
            Err(e) => reply.error(reply_err("lookup", e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.fs.inode(ino) {
            Ok(rec) => reply.attr(&TTL, &self.attr(&rec)),
            Err(e) => reply.error(reply_err("getattr", e)),
        }
    }

    // Solo atributos: no hay truncado ni cambio de dueño
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let rec = match self.fs.inode(ino) {
            Ok(rec) => rec,
            Err(e) => return reply.error(reply_err("setattr", e)),
        };
        if let Some(size) = size {
            if size != rec.file_size {
                return reply.error(libc::EPERM);
            }
        }
        reply.attr(&TTL, &self.attr(&rec));
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        if mode & S_IFMT != S_IFREG {
            return reply.error(libc::EPERM);
        }
        match self.create_entry(parent, name, InodeKind::File, mode, umask) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(reply_err("mknod", e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        match self.create_entry(parent, name, InodeKind::Directory, mode, umask) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(reply_err("mkdir", e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.create_entry(parent, name, InodeKind::File, mode, umask) {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(e) => reply.error(reply_err("create", e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.fs.inode(ino) {
            Ok(rec) if rec.is_dir() => reply.error(libc::EISDIR),
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(reply_err("open", e)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.fs.inode(ino) {
            Ok(rec) if rec.is_dir() => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(reply_err("opendir", e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir(ino = {}, offset = {})", ino, offset);

        let entries = match self.fs.list_children(ino) {
            Ok(entries) => entries,
            Err(e) => return reply.error(reply_err("readdir", e)),
        };

        // No parent link is stored, so ".." points back at the directory itself.
        let mut all: Vec<(u64, FileType, Vec<u8>)> = vec![
            (ino, FileType::Directory, b".".to_vec()),
            (ino, FileType::Directory, b"..".to_vec()),
        ];
        for e in entries {
            let kind = match self.fs.inode(e.inode_no) {
                Ok(rec) if rec.is_dir() => FileType::Directory,
                Ok(_) => FileType::RegularFile,
                Err(err) => return reply.error(reply_err("readdir", err)),
            };
            all.push((e.inode_no, kind, e.name_bytes().to_vec()));
        }

        for (i, (child, kind, name)) in all.iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(*child, i as i64 + 1, *kind, OsStr::from_bytes(name)) {
                break;
            }
        }
        reply.ok();
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            return reply.error(libc::EINVAL);
        }
        match self.fs.read_file(ino, offset as u64, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(reply_err("read", e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            return reply.error(libc::EINVAL);
        }
        match self.fs.write_file(ino, offset as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(reply_err("write", e)),
        }
    }

    // Cada escritura ya se sincroniza con el dispositivo
    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok()
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.ok()
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        match self.fs.inode(ino) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_err("access", e)),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match self.fs.stats() {
            Ok(st) => reply.statfs(
                st.data_blocks,
                st.free_blocks,
                st.free_blocks,
                MAX_OBJECTS,
                st.free_inodes,
                st.block_size as u32,
                st.name_max as u32,
                st.block_size as u32,
            ),
            Err(e) => reply.error(reply_err("statfs", e)),
        }
    }
}
