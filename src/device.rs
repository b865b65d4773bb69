//! Block device abstraction.
//!
//! A storage block is the atomic unit of I/O for the volume above it. This module provides two
//! implementations: an in-memory byte array, and a fixed-length host file treated as an array of
//! `BLOCK_SIZE`-byte blocks. Everything above this module only ever reads and writes whole
//! blocks by index.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errno::{self, Result};
use crate::layout::{BLOCK_SIZE, TOTAL_BLOCKS};

/// Trait representing a block storage device addressed by fixed-size block indices.
pub trait BlockDevice {
    /// Returns the size of a block in bytes.
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// Returns the total number of blocks available on the device.
    fn num_blocks(&self) -> u32;

    /// Reads the block at `idx` into `buf`. `buf` must be exactly `block_size()` bytes.
    fn read_block(&mut self, idx: u32, buf: &mut [u8]) -> Result<()>;

    /// Writes `buf` to the block at `idx`. `buf` must be exactly `block_size()` bytes.
    fn write_block(&mut self, idx: u32, buf: &[u8]) -> Result<()>;
}

/// A process-local, memory-backed block device. Used by the `--memory` mount form; it also
/// backs the on-disk engine's unit tests, since it needs no filesystem access.
pub struct MemoryDevice {
    blocks: Vec<u8>,
    num_blocks: u32,
}

impl MemoryDevice {
    /// Creates a new zero-initialized device of `num_blocks` blocks.
    pub fn new(num_blocks: u32) -> Self {
        Self {
            blocks: vec![0u8; num_blocks as usize * BLOCK_SIZE],
            num_blocks,
        }
    }

    /// Creates a device sized for the canonical container layout.
    pub fn formatted() -> Self {
        Self::new(TOTAL_BLOCKS)
    }

    fn offset(&self, idx: u32) -> usize {
        idx as usize * BLOCK_SIZE
    }
}

impl BlockDevice for MemoryDevice {
    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read_block(&mut self, idx: u32, buf: &mut [u8]) -> Result<()> {
        if idx >= self.num_blocks {
            return Err(errno::EIO);
        }
        let off = self.offset(idx);
        buf.copy_from_slice(&self.blocks[off..off + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&mut self, idx: u32, buf: &[u8]) -> Result<()> {
        if idx >= self.num_blocks {
            return Err(errno::EIO);
        }
        let off = self.offset(idx);
        self.blocks[off..off + BLOCK_SIZE].copy_from_slice(buf);
        Ok(())
    }
}

/// A host file treated as an array of fixed-size blocks. Used by the `--container` mount form.
pub struct FileDevice {
    file: File,
    num_blocks: u32,
}

impl FileDevice {
    /// Opens an existing container file. The file must already be exactly
    /// `TOTAL_BLOCKS * BLOCK_SIZE` bytes long.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| errno::from_io_error(&e))?;
        Ok(Self {
            file,
            num_blocks: TOTAL_BLOCKS,
        })
    }

    /// Creates a new container file at `path`, sized for the canonical layout and zeroed by
    /// writing a zero block at the last data-area index (forcing the host file to the required
    /// length without materializing every intermediate block on disk).
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| errno::from_io_error(&e))?;
        let mut device = Self {
            file,
            num_blocks: TOTAL_BLOCKS,
        };
        let zero = vec![0u8; BLOCK_SIZE];
        device.write_block(TOTAL_BLOCKS - 1, &zero)?;
        Ok(device)
    }

    /// Returns whether a container already exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }
}

impl BlockDevice for FileDevice {
    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read_block(&mut self, idx: u32, buf: &mut [u8]) -> Result<()> {
        if idx >= self.num_blocks {
            return Err(errno::EIO);
        }
        self.file
            .seek(SeekFrom::Start(idx as u64 * BLOCK_SIZE as u64))
            .map_err(|e| errno::from_io_error(&e))?;
        self.file
            .read_exact(buf)
            .map_err(|e| errno::from_io_error(&e))?;
        Ok(())
    }

    fn write_block(&mut self, idx: u32, buf: &[u8]) -> Result<()> {
        if idx >= self.num_blocks {
            return Err(errno::EIO);
        }
        self.file
            .seek(SeekFrom::Start(idx as u64 * BLOCK_SIZE as u64))
            .map_err(|e| errno::from_io_error(&e))?;
        self.file
            .write_all(buf)
            .map_err(|e| errno::from_io_error(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_device_roundtrip() {
        let mut dev = MemoryDevice::new(4);
        let mut buf = vec![0xAAu8; BLOCK_SIZE];
        dev.write_block(2, &buf).unwrap();
        buf.fill(0);
        dev.read_block(2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn memory_device_rejects_out_of_range() {
        let mut dev = MemoryDevice::new(2);
        let buf = vec![0u8; BLOCK_SIZE];
        assert!(dev.write_block(5, &buf).is_err());
    }

    #[test]
    fn file_device_create_sizes_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.img");
        let _dev = FileDevice::create(&path).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.len(), TOTAL_BLOCKS as u64 * BLOCK_SIZE as u64);
    }
}
