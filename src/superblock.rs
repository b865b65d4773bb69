//! The superblock holds the volume's global layout constants and the free-block counter. It
//! lives in block 0 and is the first thing read on mount and the last thing flushed after every
//! mutation that changes `num_free_blocks`.

use serde::{Deserialize, Serialize};

use crate::device::BlockDevice;
use crate::errno::Result;
use crate::layout::{self, BLOCK_SIZE};

/// On-disk superblock record. Little-endian, fixed-width fields, normative per the container
/// format: `block_size`, `num_blocks`, `num_free_blocks`, and the four region offsets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Superblock {
    pub block_size: u32,
    pub num_blocks: u32,
    pub num_free_blocks: u32,
    pub dmap_offset: u32,
    pub fat_offset: u32,
    pub root_offset: u32,
    pub file_offset: u32,
}

fn bincode_options() -> impl bincode::config::Options {
    use bincode::config::Options;
    bincode::options()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

impl Superblock {
    /// Builds the superblock for a freshly formatted volume: all data blocks free, canonical
    /// region offsets.
    pub fn formatted() -> Self {
        Self {
            block_size: BLOCK_SIZE as u32,
            num_blocks: layout::TOTAL_BLOCKS,
            num_free_blocks: layout::N_DATA,
            dmap_offset: layout::DMAP_OFFSET,
            fat_offset: layout::FAT_OFFSET,
            root_offset: layout::ROOT_OFFSET,
            file_offset: layout::DATA_OFFSET,
        }
    }

    /// Reads the superblock from block 0 of `device`.
    pub fn load(device: &mut dyn BlockDevice) -> Result<Self> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        device.read_block(layout::SUPERBLOCK_BLOCK, &mut buf)?;
        let sb = bincode_options()
            .deserialize(&buf)
            .map_err(|_| crate::errno::EIO)?;
        Ok(sb)
    }

    /// Writes the superblock to block 0 of `device`, zeroing the remainder of the block.
    pub fn flush(&self, device: &mut dyn BlockDevice) -> Result<()> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        let encoded = bincode_options()
            .serialize(self)
            .map_err(|_| crate::errno::EIO)?;
        buf[..encoded.len()].copy_from_slice(&encoded);
        device.write_block(layout::SUPERBLOCK_BLOCK, &buf)
    }
}
