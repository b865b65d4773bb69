//! The mount: owns the superblock, DMAP, FAT, directory table and open-file registry for one
//! on-disk container, and exposes the user-facing operations (create, open, read, write,
//! truncate, rename, chmod, chown, unlink, getattr, readdir, release).
//!
//! Every mutating operation loads nothing extra at entry (the regions are kept in memory for the
//! lifetime of the mount) and flushes the metadata regions before returning success, matching
//! the flush policy in the container format: after any successful call, a crash observing only
//! the backing store sees the operation's effects. Read-only operations never flush.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::allocator;
use crate::device::{BlockDevice, FileDevice};
use crate::directory::DirectoryTable;
use crate::dmap::Dmap;
use crate::errno::{self, Result};
use crate::fat::Fat;
use crate::file_io;
use crate::open_files::OpenFiles;
use crate::superblock::Superblock;
use crate::types::{Gid, Mode, Timestamp, Uid, ROOT_MODE};

/// Metadata returned by `getattr`, for both the root directory and regular files.
#[derive(Debug, Clone, Copy)]
pub struct FileAttr {
    pub size: u64,
    pub uid: Uid,
    pub gid: Gid,
    pub mode: Mode,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
    pub nlink: u32,
    pub is_dir: bool,
}

fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or(0)
}

/// The operations common to both mount forms (the on-disk engine and the in-memory store), so
/// the FUSE adapter can be written once and driven by either.
pub trait Engine {
    fn create(&mut self, path: &str, uid: Uid, gid: Gid, mode: Mode) -> Result<()>;
    fn open(&mut self, path: &str) -> Result<()>;
    fn release(&mut self, path: &str);
    fn read(&mut self, path: &str, offset: i64, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, path: &str, offset: i64, data: &[u8]) -> Result<usize>;
    fn truncate(&mut self, path: &str, new_size: u64) -> Result<()>;
    fn rename(&mut self, old: &str, new: &str) -> Result<()>;
    fn unlink(&mut self, path: &str) -> Result<()>;
    fn chmod(&mut self, path: &str, mode: Mode) -> Result<()>;
    fn chown(&mut self, path: &str, uid: Uid, gid: Gid) -> Result<()>;
    fn getattr(&self, path: &str) -> Result<FileAttr>;
    fn readdir(&self) -> Vec<String>;
}

/// A mounted volume, generic over its backing block device so the engine can be exercised
/// against an in-memory device in tests without touching the filesystem.
pub struct Volume<D: BlockDevice> {
    device: D,
    superblock: Superblock,
    dmap: Dmap,
    fat: Fat,
    directory: DirectoryTable,
    open_files: OpenFiles,
    mounted_at: Timestamp,
}

impl<D: BlockDevice> Volume<D> {
    /// Formats a fresh, empty volume on `device` and flushes it.
    pub fn format(mut device: D) -> Result<Self> {
        let superblock = Superblock::formatted();
        let dmap = Dmap::formatted();
        let fat = Fat::formatted();
        let directory = DirectoryTable::formatted();

        superblock.flush(&mut device)?;
        dmap.flush(&mut device)?;
        fat.flush(&mut device)?;
        directory.flush(&mut device)?;

        Ok(Self {
            device,
            superblock,
            dmap,
            fat,
            directory,
            open_files: OpenFiles::new(),
            mounted_at: now(),
        })
    }

    /// Loads an existing volume's metadata regions from `device`.
    pub fn load(mut device: D) -> Result<Self> {
        let superblock = Superblock::load(&mut device)?;
        let dmap = Dmap::load(&mut device)?;
        let fat = Fat::load(&mut device)?;
        let directory = DirectoryTable::load(&mut device)?;

        Ok(Self {
            device,
            superblock,
            dmap,
            fat,
            directory,
            open_files: OpenFiles::new(),
            mounted_at: now(),
        })
    }

    fn flush_metadata(&mut self) -> Result<()> {
        self.superblock.flush(&mut self.device)?;
        self.dmap.flush(&mut self.device)?;
        self.fat.flush(&mut self.device)?;
        self.directory.flush(&mut self.device)?;
        Ok(())
    }

    /// Creates a new, empty regular file.
    pub fn create(&mut self, path: &str, uid: Uid, gid: Gid, mode: Mode) -> Result<()> {
        self.directory.insert(path, uid, gid, mode, now())?;
        self.flush_metadata()
    }

    /// Registers `path` as open. Fails if the file does not exist, the registry is full, or the
    /// path is already open.
    pub fn open(&mut self, path: &str) -> Result<()> {
        if self.directory.lookup(path).is_none() {
            return Err(errno::ENOENT);
        }
        self.open_files.open(path)
    }

    /// Releases `path` from the open-file registry. A no-op if it was not open.
    pub fn release(&mut self, path: &str) {
        self.open_files.release(path);
    }

    /// Reads up to `buf.len()` bytes at `offset`. Read-only: never flushes.
    pub fn read(&mut self, path: &str, offset: i64, buf: &mut [u8]) -> Result<usize> {
        let record = self.directory.lookup(path).ok_or(errno::ENOENT)?;
        let first_block = (!record.is_empty_file()).then_some(record.first_block as u32);
        let size = record.size;
        file_io::read(&mut self.device, &self.fat, first_block, size, offset, buf)
    }

    /// Writes `data` at `offset`, growing the file's chain as needed.
    pub fn write(&mut self, path: &str, offset: i64, data: &[u8]) -> Result<usize> {
        let record = self.directory.lookup_mut(path).ok_or(errno::ENOENT)?;
        let written = file_io::write(
            &mut self.device,
            &mut self.dmap,
            &mut self.fat,
            &mut self.superblock,
            record,
            offset,
            data,
        )?;
        if written > 0 {
            if let Some(record) = self.directory.lookup_mut(path) {
                record.mtime = now();
            }
        }
        self.flush_metadata()?;
        Ok(written)
    }

    /// Resizes the file to exactly `new_size` bytes, allocating or freeing blocks as needed.
    pub fn truncate(&mut self, path: &str, new_size: u64) -> Result<()> {
        let record = self.directory.lookup(path).ok_or(errno::ENOENT)?;
        let old_blocks = file_io::blocks_for_size(record.size);
        let new_blocks = file_io::blocks_for_size(new_size);
        let first_block = record.first_block;
        let is_empty = record.is_empty_file();

        let new_first_block = if new_blocks > old_blocks {
            let delta = new_blocks - old_blocks;
            let existing = (!is_empty).then_some(first_block as u32);
            Some(allocator::allocate(
                &mut self.dmap,
                &mut self.fat,
                &mut self.superblock,
                existing,
                delta,
            )?)
        } else if new_blocks < old_blocks {
            allocator::free_tail(
                &mut self.dmap,
                &mut self.fat,
                &mut self.superblock,
                first_block as u32,
                new_blocks,
            )?
        } else {
            Some(first_block as u32)
        };

        let record = self.directory.lookup_mut(path).ok_or(errno::ENOENT)?;
        record.first_block = new_first_block.unwrap_or(0) as u16;
        record.size = new_size;
        let ts = now();
        record.mtime = ts;
        record.ctime = ts;

        self.flush_metadata()
    }

    /// Renames `old` to `new`.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        self.directory.rename(old, new, now())?;
        self.flush_metadata()
    }

    /// Removes `path`, freeing its block chain.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        self.directory
            .erase(path, &mut self.dmap, &mut self.fat, &mut self.superblock)?;
        self.flush_metadata()
    }

    /// Changes the mode bits of `path`.
    pub fn chmod(&mut self, path: &str, mode: Mode) -> Result<()> {
        let record = self.directory.lookup_mut(path).ok_or(errno::ENOENT)?;
        record.mode = mode;
        record.ctime = now();
        self.flush_metadata()
    }

    /// Changes the owning uid/gid of `path`.
    pub fn chown(&mut self, path: &str, uid: Uid, gid: Gid) -> Result<()> {
        let record = self.directory.lookup_mut(path).ok_or(errno::ENOENT)?;
        record.uid = uid;
        record.gid = gid;
        record.ctime = now();
        self.flush_metadata()
    }

    /// Returns the metadata for `path`, or for the root directory when `path` is `/`. Read-only:
    /// never flushes.
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
        let record = self.directory.lookup(path).ok_or(errno::ENOENT)?;
        Ok(FileAttr {
            size: record.size,
            uid: record.uid,
            gid: record.gid,
            mode: record.mode,
            atime: record.atime,
            mtime: record.mtime,
            ctime: record.ctime,
            nlink: 1,
            is_dir: false,
        })
    }

    /// Lists `.`, `..`, and every file's bare name. Read-only: never flushes.
    pub fn readdir(&self) -> Vec<String> {
        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(self.directory.names());
        names
    }

    /// Releases the backing device. No periodic background work exists to stop.
    pub fn destroy(self) {}
}

impl<D: BlockDevice> Engine for Volume<D> {
    fn create(&mut self, path: &str, uid: Uid, gid: Gid, mode: Mode) -> Result<()> {
        Volume::create(self, path, uid, gid, mode)
    }
    fn open(&mut self, path: &str) -> Result<()> {
        Volume::open(self, path)
    }
    fn release(&mut self, path: &str) {
        Volume::release(self, path)
    }
    fn read(&mut self, path: &str, offset: i64, buf: &mut [u8]) -> Result<usize> {
        Volume::read(self, path, offset, buf)
    }
    fn write(&mut self, path: &str, offset: i64, data: &[u8]) -> Result<usize> {
        Volume::write(self, path, offset, data)
    }
    fn truncate(&mut self, path: &str, new_size: u64) -> Result<()> {
        Volume::truncate(self, path, new_size)
    }
    fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        Volume::rename(self, old, new)
    }
    fn unlink(&mut self, path: &str) -> Result<()> {
        Volume::unlink(self, path)
    }
    fn chmod(&mut self, path: &str, mode: Mode) -> Result<()> {
        Volume::chmod(self, path, mode)
    }
    fn chown(&mut self, path: &str, uid: Uid, gid: Gid) -> Result<()> {
        Volume::chown(self, path, uid, gid)
    }
    fn getattr(&self, path: &str) -> Result<FileAttr> {
        Volume::getattr(self, path)
    }
    fn readdir(&self) -> Vec<String> {
        Volume::readdir(self)
    }
}

/// Mounts the on-disk engine against a container file, formatting it if it does not yet exist,
/// matching the mount lifecycle in the container format.
pub fn mount_container(path: &Path) -> Result<Volume<FileDevice>> {
    if FileDevice::exists(path) {
        Volume::load(FileDevice::open(path)?)
    } else {
        Volume::format(FileDevice::create(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;
    use crate::layout::{N_DATA, N_DIR, N_OPEN};

    fn fresh_volume() -> Volume<MemoryDevice> {
        Volume::format(MemoryDevice::formatted()).unwrap()
    }

    #[test]
    fn s1_create_reopen_unlink_then_open_fails() {
        let mut vol = fresh_volume();
        vol.create("/file", 0, 0, 0o644).unwrap();
        vol.open("/file").unwrap();
        vol.release("/file");
        vol.open("/file").unwrap();
        vol.release("/file");
        vol.unlink("/file").unwrap();
        assert!(vol.open("/file").is_err());
    }

    #[test]
    fn s2_overwrite_inside() {
        let mut vol = fresh_volume();
        vol.create("/file", 0, 0, 0o644).unwrap();
        vol.write("/file", 0, b"abcde").unwrap();
        vol.write("/file", 1, b"xyz").unwrap();
        let mut buf = [0u8; 5];
        vol.read("/file", 0, &mut buf).unwrap();
        assert_eq!(&buf, b"axyze");
    }

    #[test]
    fn s3_overwrite_tail() {
        let mut vol = fresh_volume();
        vol.create("/file", 0, 0, 0o644).unwrap();
        vol.write("/file", 0, b"abcde").unwrap();
        vol.write("/file", 3, b"xyz").unwrap();
        let mut buf = [0u8; 6];
        vol.read("/file", 0, &mut buf).unwrap();
        assert_eq!(&buf, b"abcxyz");
    }

    #[test]
    fn s4_extend_past_end() {
        let mut vol = fresh_volume();
        vol.create("/file", 0, 0, 0o644).unwrap();
        vol.write("/file", 0, b"abcde").unwrap();
        vol.write("/file", 7, b"xyz").unwrap();

        let mut head = [0u8; 5];
        vol.read("/file", 0, &mut head).unwrap();
        assert_eq!(&head, b"abcde");

        let mut tail = [0u8; 3];
        vol.read("/file", 7, &mut tail).unwrap();
        assert_eq!(&tail, b"xyz");
    }

    #[test]
    fn s5_truncate_shrinks_size_and_blocks() {
        let mut vol = fresh_volume();
        vol.create("/file", 0, 0, 0o644).unwrap();
        let data = vec![7u8; 1024];
        vol.write("/file", 0, &data).unwrap();

        vol.truncate("/file", 512).unwrap();
        assert_eq!(vol.getattr("/file").unwrap().size, 512);

        vol.truncate("/file", 256).unwrap();
        assert_eq!(vol.getattr("/file").unwrap().size, 256);
    }

    #[test]
    fn s7_open_count_bound() {
        let mut vol = fresh_volume();
        for i in 0..N_OPEN.min(N_DIR) {
            let name = format!("/f{i}");
            vol.create(&name, 0, 0, 0o644).unwrap();
            vol.open(&name).unwrap();
        }
        // Every slot is open; re-opening one of them is rejected as already in use.
        assert_eq!(vol.open("/f0").unwrap_err(), errno::EPERM);
        // A path that was never created is rejected regardless of registry occupancy.
        assert_eq!(vol.open("/nonexistent").unwrap_err(), errno::ENOENT);
    }

    #[test]
    fn directory_count_bound() {
        let mut vol = fresh_volume();
        for i in 0..N_DIR {
            vol.create(&format!("/f{i}"), 0, 0, 0o644).unwrap();
        }
        assert_eq!(
            vol.create("/overflow", 0, 0, 0o644).unwrap_err(),
            errno::ENOSPC
        );
    }

    #[test]
    fn free_block_accounting_matches_usage() {
        let mut vol = fresh_volume();
        vol.create("/a", 0, 0, 0o644).unwrap();
        vol.create("/b", 0, 0, 0o644).unwrap();
        vol.write("/a", 0, &vec![1u8; 1000]).unwrap();
        vol.write("/b", 0, &vec![2u8; 2000]).unwrap();

        let used_a = file_io::blocks_for_size(1000);
        let used_b = file_io::blocks_for_size(2000);
        assert_eq!(vol.superblock.num_free_blocks, N_DATA - used_a - used_b);
        assert_eq!(vol.dmap.count_free(), vol.superblock.num_free_blocks);
    }

    #[test]
    fn persistence_across_remount() {
        let device = MemoryDevice::formatted();
        let mut vol = Volume::format(device).unwrap();
        vol.create("/file", 1, 2, 0o640).unwrap();
        vol.write("/file", 0, b"hello").unwrap();

        // Re-mount using the same serialized bytes by round-tripping through a new container.
        let mut container = MemoryDevice::formatted();
        vol.superblock.flush(&mut container).unwrap();
        vol.dmap.flush(&mut container).unwrap();
        vol.fat.flush(&mut container).unwrap();
        vol.directory.flush(&mut container).unwrap();

        let mut remounted = Volume::load(container).unwrap();
        let mut buf = [0u8; 5];
        remounted.read("/file", 0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        let attr = remounted.getattr("/file").unwrap();
        assert_eq!(attr.uid, 1);
        assert_eq!(attr.gid, 2);
        assert_eq!(attr.mode, 0o640);
    }

    #[test]
    fn getattr_root() {
        let vol = fresh_volume();
        let attr = vol.getattr("/").unwrap();
        assert!(attr.is_dir);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.mode, ROOT_MODE);
    }

    #[test]
    fn readdir_lists_dot_entries_and_files() {
        let mut vol = fresh_volume();
        vol.create("/a", 0, 0, 0o644).unwrap();
        let names = vol.readdir();
        assert!(names.contains(&".".to_string()));
        assert!(names.contains(&"..".to_string()));
        assert!(names.contains(&"a".to_string()));
    }
}
