//! The directory table (ROOT): a flat table of fixed-size directory entries. There is exactly
//! one directory, so the in-memory representation is simply a map from canonical path (`/name`)
//! to directory record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::allocator;
use crate::device::BlockDevice;
use crate::dmap::Dmap;
use crate::errno::{self, Result};
use crate::fat::Fat;
use crate::layout::{BLOCK_SIZE, L_NAME, N_DIR, ROOT_OFFSET};
use crate::superblock::Superblock;
use crate::types::{Gid, Mode, Timestamp, Uid};

fn bincode_options() -> impl bincode::config::Options {
    use bincode::config::Options;
    bincode::options()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

/// On-disk directory record: a NUL-terminated 255-byte name (empty first byte marks an unused
/// slot) plus the file's metadata and the head of its block chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DirRecord {
    name: [u8; L_NAME],
    pub size: u64,
    pub first_block: u16,
    pub uid: Uid,
    pub gid: Gid,
    pub mode: Mode,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

impl DirRecord {
    fn empty() -> Self {
        Self {
            name: [0u8; L_NAME],
            size: 0,
            first_block: 0,
            uid: 0,
            gid: 0,
            mode: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
        }
    }

    fn new(name: &str, uid: Uid, gid: Gid, mode: Mode, now: Timestamp) -> Self {
        let mut record = Self::empty();
        record.set_name(name);
        record.uid = uid;
        record.gid = gid;
        record.mode = mode;
        record.atime = now;
        record.mtime = now;
        record.ctime = now;
        record
    }

    fn is_used(&self) -> bool {
        self.name[0] != 0
    }

    fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    fn set_name(&mut self, name: &str) {
        self.name = [0u8; L_NAME];
        let bytes = name.as_bytes();
        self.name[..bytes.len()].copy_from_slice(bytes);
    }

    /// Tells whether the file has no block chain (an empty file, per spec: `size == 0` is the
    /// sole empty-file indicator; `first_block` is undefined otherwise).
    pub fn is_empty_file(&self) -> bool {
        self.size == 0
    }
}

/// Strips the leading `/` from an external path and validates its length. Returns the bare name
/// (without the slash) on success.
fn validate_path(path: &str) -> Result<&str> {
    if !path.starts_with('/') {
        return Err(errno::EINVAL);
    }
    if path.len() > L_NAME + 1 {
        return Err(errno::EINVAL);
    }
    Ok(&path[1..])
}

/// In-memory mirror of the on-disk directory table.
pub struct DirectoryTable {
    entries: HashMap<String, DirRecord>,
}

impl DirectoryTable {
    /// Builds an empty table, as produced by formatting a new volume.
    pub fn formatted() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Reads the `N_DIR` directory blocks, replacing the in-memory map.
    pub fn load(device: &mut dyn BlockDevice) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut buf = vec![0u8; BLOCK_SIZE];
        for i in 0..N_DIR as u32 {
            device.read_block(ROOT_OFFSET + i, &mut buf)?;
            let record: DirRecord = bincode_options()
                .deserialize(&buf)
                .map_err(|_| errno::EIO)?;
            if record.is_used() {
                entries.insert(format!("/{}", record.name()), record);
            }
        }
        Ok(Self { entries })
    }

    /// Clears the region by writing zeroed blocks, then writes back the current entries in
    /// iteration order into the first `min(len, N_DIR)` slots.
    pub fn flush(&self, device: &mut dyn BlockDevice) -> Result<()> {
        let zero = vec![0u8; BLOCK_SIZE];
        for i in 0..N_DIR as u32 {
            device.write_block(ROOT_OFFSET + i, &zero)?;
        }
        let mut buf = vec![0u8; BLOCK_SIZE];
        for (i, record) in self.entries.values().enumerate().take(N_DIR) {
            buf.fill(0);
            let encoded = bincode_options().serialize(record).map_err(|_| errno::EIO)?;
            buf[..encoded.len()].copy_from_slice(&encoded);
            device.write_block(ROOT_OFFSET + i as u32, &buf)?;
        }
        Ok(())
    }

    /// Returns the number of files currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Looks up a file by its external path (`/name`).
    pub fn lookup(&self, path: &str) -> Option<&DirRecord> {
        self.entries.get(path)
    }

    /// Returns a mutable reference to a file's record.
    pub fn lookup_mut(&mut self, path: &str) -> Option<&mut DirRecord> {
        self.entries.get_mut(path)
    }

    /// Lists the bare names (without leading `/`) of every file, for `readdir`.
    pub fn names(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.values().map(|r| r.name())
    }

    /// Creates a new, empty file at `path`, owned by `uid`/`gid` with mode `mode`.
    pub fn insert(&mut self, path: &str, uid: Uid, gid: Gid, mode: Mode, now: Timestamp) -> Result<()> {
        let name = validate_path(path)?;
        if self.entries.len() >= N_DIR {
            return Err(errno::ENOSPC);
        }
        if self.entries.contains_key(path) {
            return Err(errno::EEXIST);
        }
        self.entries.insert(path.to_string(), DirRecord::new(name, uid, gid, mode, now));
        Ok(())
    }

    /// Removes `path`, freeing its block chain through the allocator if it owns any blocks.
    pub fn erase(
        &mut self,
        path: &str,
        dmap: &mut Dmap,
        fat: &mut Fat,
        sb: &mut Superblock,
    ) -> Result<()> {
        let record = self.entries.remove(path).ok_or(errno::ENOENT)?;
        if !record.is_empty_file() {
            allocator::free_tail(dmap, fat, sb, record.first_block as u32, 0)?;
        }
        Ok(())
    }

    /// Moves the record at `old` to `new`, updating its `ctime`.
    pub fn rename(&mut self, old: &str, new: &str, now: Timestamp) -> Result<()> {
        validate_path(new)?;
        if self.entries.contains_key(new) {
            return Err(errno::EEXIST);
        }
        let mut record = self.entries.remove(old).ok_or(errno::ENOENT)?;
        let new_name = &new[1..];
        record.set_name(new_name);
        record.ctime = now;
        self.entries.insert(new.to_string(), record);
        Ok(())
    }
}
