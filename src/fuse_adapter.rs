//! Bridges an [`Engine`] (either mount form) to `fuser`'s `Filesystem` trait.
//!
//! FUSE addresses files by inode number, but the engine beneath is purely path-based (there is
//! only ever one flat directory). This module owns the inode table: the root is always inode 1,
//! and every other path is assigned the next inode number the first time it is looked up. Inode
//! numbers are never reused within a mount's lifetime, so a `forget()` racing a `create()` for
//! the same name can never collide.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr as FuseAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use log::info;

use crate::errno;
use crate::layout::N_DATA;
use crate::volume::{Engine, FileAttr};

const ROOT_INO: u64 = 1;
const TTL: Duration = Duration::from_secs(1);

fn to_system_time(ts: i64) -> SystemTime {
    if ts >= 0 {
        UNIX_EPOCH + Duration::from_secs(ts as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs((-ts) as u64)
    }
}

/// Maps between external paths and the inode numbers FUSE requires.
#[derive(Default)]
struct InodeTable {
    by_path: HashMap<String, u64>,
    by_ino: HashMap<u64, String>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        Self {
            by_path: HashMap::new(),
            by_ino: HashMap::new(),
            next: 2,
        }
    }

    fn ino_for(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_path.insert(path.to_string(), ino);
        self.by_ino.insert(ino, path.to_string());
        ino
    }

    fn path_of(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(|s| s.as_str())
    }

    fn forget(&mut self, path: &str) {
        if let Some(ino) = self.by_path.remove(path) {
            self.by_ino.remove(&ino);
        }
    }

    fn rename(&mut self, old: &str, new: &str) {
        if let Some(ino) = self.by_path.remove(old) {
            self.by_ino.insert(ino, new.to_string());
            self.by_path.insert(new.to_string(), ino);
        }
    }
}

fn to_fuse_attr(ino: u64, attr: &FileAttr) -> FuseAttr {
    FuseAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: to_system_time(attr.atime),
        mtime: to_system_time(attr.mtime),
        ctime: to_system_time(attr.ctime),
        crtime: to_system_time(attr.ctime),
        kind: if attr.is_dir {
            FileType::Directory
        } else {
            FileType::RegularFile
        },
        perm: attr.mode as u16,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// Implements `fuser::Filesystem` for any [`Engine`], translating FUSE's inode-addressed
/// callbacks into the engine's path-addressed operations.
pub struct FuseAdapter<E: Engine> {
    engine: E,
    inodes: InodeTable,
    label: String,
}

impl<E: Engine> FuseAdapter<E> {
    /// Wraps `engine` for mounting, logging `label` (the container path, or "in-memory") at
    /// mount and unmount time.
    pub fn labeled(engine: E, label: impl Into<String>) -> Self {
        Self {
            engine,
            inodes: InodeTable::new(),
            label: label.into(),
        }
    }

    /// Wraps `engine` for mounting without a specific mount-path label.
    pub fn new(engine: E) -> Self {
        Self::labeled(engine, "mount")
    }

    fn path_for(&self, parent: u64, name: &OsStr) -> Option<String> {
        let name = name.to_str()?;
        if parent == ROOT_INO {
            Some(format!("/{name}"))
        } else {
            None
        }
    }

    fn resolve(&self, ino: u64) -> Option<String> {
        if ino == ROOT_INO {
            Some("/".to_string())
        } else {
            self.inodes.path_of(ino).map(|s| s.to_string())
        }
    }
}

impl<E: Engine> Filesystem for FuseAdapter<E> {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        info!("mounting {}", self.label);
        Ok(())
    }

    fn destroy(&mut self) {
        info!("unmounting {}", self.label);
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &std::ffi::OsStr, reply: ReplyEntry) {
        let Some(path) = self.path_for(parent, name) else {
            return reply.error(errno::ENOENT);
        };
        match self.engine.getattr(&path) {
            Ok(attr) => {
                let ino = self.inodes.ino_for(&path);
                reply.entry(&TTL, &to_fuse_attr(ino, &attr), 0);
            }
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.resolve(ino) else {
            return reply.error(errno::ENOENT);
        };
        match self.engine.getattr(&path) {
            Ok(attr) => reply.attr(&TTL, &to_fuse_attr(ino, &attr)),
            Err(e) => reply.error(e),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.resolve(ino) else {
            return reply.error(errno::ENOENT);
        };

        if let Some(mode) = mode {
            if let Err(e) = self.engine.chmod(&path, mode) {
                return reply.error(e);
            }
        }
        if uid.is_some() || gid.is_some() {
            let current = match self.engine.getattr(&path) {
                Ok(attr) => attr,
                Err(e) => return reply.error(e),
            };
            let new_uid = uid.unwrap_or(current.uid);
            let new_gid = gid.unwrap_or(current.gid);
            if let Err(e) = self.engine.chown(&path, new_uid, new_gid) {
                return reply.error(e);
            }
        }
        if let Some(size) = size {
            if let Err(e) = self.engine.truncate(&path, size) {
                return reply.error(e);
            }
        }

        match self.engine.getattr(&path) {
            Ok(attr) => reply.attr(&TTL, &to_fuse_attr(ino, &attr)),
            Err(e) => reply.error(e),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &std::ffi::OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.path_for(parent, name) else {
            return reply.error(errno::ENOENT);
        };
        if let Err(e) = self.engine.create(&path, req.uid(), req.gid(), mode) {
            return reply.error(e);
        }
        if let Err(e) = self.engine.open(&path) {
            return reply.error(e);
        }
        match self.engine.getattr(&path) {
            Ok(attr) => {
                let ino = self.inodes.ino_for(&path);
                reply.created(&TTL, &to_fuse_attr(ino, &attr), 0, 0, 0);
            }
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &std::ffi::OsStr, reply: ReplyEmpty) {
        let Some(path) = self.path_for(parent, name) else {
            return reply.error(errno::ENOENT);
        };
        match self.engine.unlink(&path) {
            Ok(()) => {
                self.inodes.forget(&path);
                reply.ok();
            }
            Err(e) => reply.error(e),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &std::ffi::OsStr,
        newparent: u64,
        newname: &std::ffi::OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(old), Some(new)) = (
            self.path_for(parent, name),
            self.path_for(newparent, newname),
        ) else {
            return reply.error(errno::ENOENT);
        };
        match self.engine.rename(&old, &new) {
            Ok(()) => {
                self.inodes.rename(&old, &new);
                reply.ok();
            }
            Err(e) => reply.error(e),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.resolve(ino) else {
            return reply.error(errno::ENOENT);
        };
        match self.engine.open(&path) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e),
        }
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
        let Some(path) = self.resolve(ino) else {
            return reply.error(errno::ENOENT);
        };
        let mut buf = vec![0u8; size as usize];
        match self.engine.read(&path, offset, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e),
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
        let Some(path) = self.resolve(ino) else {
            return reply.error(errno::ENOENT);
        };
        match self.engine.write(&path, offset, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if let Some(path) = self.resolve(ino) {
            self.engine.release(&path);
        }
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != ROOT_INO {
            return reply.error(errno::ENOENT);
        }
        let names = self.engine.readdir();
        for (i, name) in names.into_iter().enumerate().skip(offset as usize) {
            let (kind, entry_ino, display) = if name == "." || name == ".." {
                (FileType::Directory, ROOT_INO, name.clone())
            } else {
                let path = format!("/{name}");
                (FileType::RegularFile, self.inodes.ino_for(&path), name.clone())
            };
            // A full reply buffer means the kernel will re-request the rest with a later offset.
            if reply.add(entry_ino, (i + 1) as i64, kind, display) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        reply.statfs(
            N_DATA as u64,
            0,
            0,
            self.inodes.by_path.len() as u64,
            0,
            512,
            crate::layout::L_NAME as u32,
            512,
        );
    }
}
