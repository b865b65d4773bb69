//! The `--memory` mount form: a trivial, process-local file store with no on-disk layout at all.
//! Each file is just its bytes plus metadata; there is no block chain, DMAP, or FAT to maintain,
//! and nothing survives past the process lifetime.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errno::{self, Result};
use crate::layout::{L_NAME, N_DIR};
use crate::open_files::OpenFiles;
use crate::types::{Gid, Mode, Timestamp, Uid, ROOT_MODE};
use crate::volume::{Engine, FileAttr};

fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or(0)
}

struct MemoryFile {
    content: Vec<u8>,
    uid: Uid,
    gid: Gid,
    mode: Mode,
    atime: Timestamp,
    mtime: Timestamp,
    ctime: Timestamp,
}

/// In-memory file system: a name-to-bytes map guarded by the same capacity and open-file rules
/// as the on-disk engine, so both mount forms present identical behavior to a client.
#[derive(Default)]
pub struct MemoryFs {
    files: HashMap<String, MemoryFile>,
    open_files: OpenFiles,
    mounted_at: Timestamp,
}

fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(errno::EINVAL);
    }
    if path.len() > L_NAME + 1 {
        return Err(errno::EINVAL);
    }
    Ok(())
}

impl MemoryFs {
    /// Creates an empty file system.
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            open_files: OpenFiles::new(),
            mounted_at: now(),
        }
    }

    /// Creates a new, empty regular file.
    pub fn create(&mut self, path: &str, uid: Uid, gid: Gid, mode: Mode) -> Result<()> {
        validate_path(path)?;
        if self.files.len() >= N_DIR {
            return Err(errno::ENOSPC);
        }
        if self.files.contains_key(path) {
            return Err(errno::EEXIST);
        }
        let ts = now();
        self.files.insert(
            path.to_string(),
            MemoryFile {
                content: Vec::new(),
                uid,
                gid,
                mode,
                atime: ts,
                mtime: ts,
                ctime: ts,
            },
        );
        Ok(())
    }

    /// Registers `path` as open. Fails if the file does not exist, the registry is full, or the
    /// path is already open.
    pub fn open(&mut self, path: &str) -> Result<()> {
        if !self.files.contains_key(path) {
            return Err(errno::ENOENT);
        }
        self.open_files.open(path)
    }

    /// Releases `path` from the open-file registry. A no-op if it was not open.
    pub fn release(&mut self, path: &str) {
        self.open_files.release(path);
    }

    /// Reads up to `buf.len()` bytes at `offset`. An offset at or past the file's size is EOF,
    /// not an error, and returns `0`.
    pub fn read(&mut self, path: &str, offset: i64, buf: &mut [u8]) -> Result<usize> {
        if offset < 0 {
            return Err(errno::EINVAL);
        }
        let file = self.files.get_mut(path).ok_or(errno::ENOENT)?;
        let offset = offset as usize;
        if offset >= file.content.len() {
            return Ok(0);
        }
        let count = buf.len().min(file.content.len() - offset);
        buf[..count].copy_from_slice(&file.content[offset..offset + count]);
        file.atime = now();
        Ok(count)
    }

    /// Writes `data` at `offset`, growing the file if the write extends past its current size.
    pub fn write(&mut self, path: &str, offset: i64, data: &[u8]) -> Result<usize> {
        if offset < 0 {
            return Err(errno::EINVAL);
        }
        let file = self.files.get_mut(path).ok_or(errno::ENOENT)?;
        let offset = offset as usize;
        let end = offset + data.len();
        if end > file.content.len() {
            file.content.resize(end, 0);
        }
        file.content[offset..end].copy_from_slice(data);
        let ts = now();
        file.mtime = ts;
        file.ctime = ts;
        Ok(data.len())
    }

    /// Resizes the file to exactly `new_size` bytes, zero-filling any new tail.
    pub fn truncate(&mut self, path: &str, new_size: u64) -> Result<()> {
        let file = self.files.get_mut(path).ok_or(errno::ENOENT)?;
        file.content.resize(new_size as usize, 0);
        let ts = now();
        file.mtime = ts;
        file.ctime = ts;
        Ok(())
    }

    /// Renames `old` to `new`. Fails `ENOENT` if `old` does not exist, `EEXIST` if `new` already
    /// does.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        validate_path(new)?;
        if self.files.contains_key(new) {
            return Err(errno::EEXIST);
        }
        let mut file = self.files.remove(old).ok_or(errno::ENOENT)?;
        file.ctime = now();
        self.files.insert(new.to_string(), file);
        Ok(())
    }

    /// Removes `path`.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        self.files.remove(path).ok_or(errno::ENOENT)?;
        Ok(())
    }

    /// Changes the mode bits of `path`.
    pub fn chmod(&mut self, path: &str, mode: Mode) -> Result<()> {
        let file = self.files.get_mut(path).ok_or(errno::ENOENT)?;
        file.mode = mode;
        file.ctime = now();
        Ok(())
    }

    /// Changes the owning uid/gid of `path`.
    pub fn chown(&mut self, path: &str, uid: Uid, gid: Gid) -> Result<()> {
        let file = self.files.get_mut(path).ok_or(errno::ENOENT)?;
        file.uid = uid;
        file.gid = gid;
        file.ctime = now();
        Ok(())
    }

    /// Returns the metadata for `path`, or for the root directory when `path` is `/`.
    pub fn getattr(&self, path: &str) -> Result<FileAttr> {
        if path == "/" {
            return Ok(FileAttr {
                size: 0,
                uid: 0,
                gid: 0,
                mode: ROOT_MODE,
                atime: self.mounted_at,
                mtime: self.mounted_at,
                ctime: self.mounted_at,
                nlink: 2,
                is_dir: true,
            });
        }
        let file = self.files.get(path).ok_or(errno::ENOENT)?;
        Ok(FileAttr {
            size: file.content.len() as u64,
            uid: file.uid,
            gid: file.gid,
            mode: file.mode,
            atime: file.atime,
            mtime: file.mtime,
            ctime: file.ctime,
            nlink: 1,
            is_dir: false,
        })
    }

    /// Lists `.`, `..`, and every file's bare name.
    pub fn readdir(&self) -> Vec<String> {
        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(self.files.keys().map(|k| k[1..].to_string()));
        names
    }
}

impl Engine for MemoryFs {
    fn create(&mut self, path: &str, uid: Uid, gid: Gid, mode: Mode) -> Result<()> {
        MemoryFs::create(self, path, uid, gid, mode)
    }
    fn open(&mut self, path: &str) -> Result<()> {
        MemoryFs::open(self, path)
    }
    fn release(&mut self, path: &str) {
        MemoryFs::release(self, path)
    }
    fn read(&mut self, path: &str, offset: i64, buf: &mut [u8]) -> Result<usize> {
        MemoryFs::read(self, path, offset, buf)
    }
    fn write(&mut self, path: &str, offset: i64, data: &[u8]) -> Result<usize> {
        MemoryFs::write(self, path, offset, data)
    }
    fn truncate(&mut self, path: &str, new_size: u64) -> Result<()> {
        MemoryFs::truncate(self, path, new_size)
    }
    fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        MemoryFs::rename(self, old, new)
    }
    fn unlink(&mut self, path: &str) -> Result<()> {
        MemoryFs::unlink(self, path)
    }
    fn chmod(&mut self, path: &str, mode: Mode) -> Result<()> {
        MemoryFs::chmod(self, path, mode)
    }
    fn chown(&mut self, path: &str, uid: Uid, gid: Gid) -> Result<()> {
        MemoryFs::chown(self, path, uid, gid)
    }
    fn getattr(&self, path: &str) -> Result<FileAttr> {
        MemoryFs::getattr(self, path)
    }
    fn readdir(&self) -> Vec<String> {
        MemoryFs::readdir(self)
    }
}
