//! Translates `(offset, length)` on a file's block chain into a walk of the FAT chain and a
//! sequence of full-block reads/writes, handling head/tail partial blocks via a scratch buffer.

use crate::allocator;
use crate::device::BlockDevice;
use crate::dmap::Dmap;
use crate::directory::DirRecord;
use crate::errno::{self, Result};
use crate::fat::Fat;
use crate::layout::{BLOCK_SIZE, N_DATA};
use crate::superblock::Superblock;
use crate::types::BlockIdx;

/// Splits a byte range into the starting block, the byte offset within that block, and the
/// number of blocks the range spans.
fn span(offset: u64, size: usize) -> (u32, usize, u32) {
    let block_offset = (offset / BLOCK_SIZE as u64) as u32;
    let byte_offset = (offset % BLOCK_SIZE as u64) as usize;
    let span_blocks = ((byte_offset + size + BLOCK_SIZE - 1) / BLOCK_SIZE) as u32;
    (block_offset, byte_offset, span_blocks)
}

/// Walks `block_offset` hops from `first`, then collects `count` blocks total starting at the
/// block reached (inclusive), in chain order.
fn chain_blocks(fat: &Fat, first: BlockIdx, block_offset: u32, count: u32) -> Result<Vec<BlockIdx>> {
    let mut cur = first;
    for _ in 0..block_offset {
        if fat.is_last(cur) {
            return Err(errno::ENFILE);
        }
        cur = fat.next(cur);
    }

    let mut blocks = Vec::with_capacity(count as usize);
    blocks.push(cur);
    for _ in 1..count {
        if fat.is_last(cur) {
            return Err(errno::EIO);
        }
        cur = fat.next(cur);
        blocks.push(cur);
    }
    Ok(blocks)
}

/// Reads `buf.len()` bytes (clamped to the file's size) starting at `offset` from the chain
/// rooted at `first_block`. A negative offset is a bad argument; an offset at or past the file's
/// size is EOF, not an error, and returns `0`.
pub fn read(
    device: &mut dyn BlockDevice,
    fat: &Fat,
    first_block: Option<BlockIdx>,
    file_size: u64,
    offset: i64,
    buf: &mut [u8],
) -> Result<usize> {
    if offset < 0 {
        return Err(errno::EINVAL);
    }
    let offset = offset as u64;
    if offset >= file_size {
        return Ok(0);
    }

    let size = (buf.len() as u64).min(file_size - offset) as usize;
    if size == 0 {
        return Ok(0);
    }
    let first_block = first_block.ok_or(errno::EIO)?;

    let (block_offset, byte_offset, span_blocks) = span(offset, size);
    let blocks = chain_blocks(fat, first_block, block_offset, span_blocks)?;

    let mut scratch = vec![0u8; span_blocks as usize * BLOCK_SIZE];
    for (i, &block) in blocks.iter().enumerate() {
        let dst = &mut scratch[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE];
        device.read_block(block, dst)?;
    }

    buf[..size].copy_from_slice(&scratch[byte_offset..byte_offset + size]);
    Ok(size)
}

/// Writes `data` at `offset` into the file described by `record`, growing its chain through the
/// allocator when the current allocation is smaller than the write requires. Updates
/// `record.first_block` and `record.size` in place. Returns the number of bytes actually
/// written, which is clamped to the volume's total capacity rather than failing outright.
pub fn write(
    device: &mut dyn BlockDevice,
    dmap: &mut Dmap,
    fat: &mut Fat,
    sb: &mut Superblock,
    record: &mut DirRecord,
    offset: i64,
    data: &[u8],
) -> Result<usize> {
    if offset < 0 {
        return Err(errno::EINVAL);
    }
    let offset = offset as u64;

    let capacity = N_DATA as u64 * BLOCK_SIZE as u64;
    if offset >= capacity {
        return Ok(0);
    }
    let size = (data.len() as u64).min(capacity - offset) as usize;
    if size == 0 {
        return Ok(0);
    }
    let data = &data[..size];

    let (block_offset, byte_offset, span_blocks) = span(offset, size);
    let needed_blocks = block_offset + span_blocks;
    let current_blocks = blocks_for_size(record.size);

    if current_blocks < needed_blocks {
        let delta = needed_blocks - current_blocks;
        let existing = if record.is_empty_file() {
            None
        } else {
            Some(record.first_block as BlockIdx)
        };
        let head = allocator::allocate(dmap, fat, sb, existing, delta)?;
        record.first_block = head as u16;
    }

    let blocks = chain_blocks(fat, record.first_block as BlockIdx, block_offset, span_blocks)?;

    let mut scratch = vec![0u8; span_blocks as usize * BLOCK_SIZE];
    for (i, &block) in blocks.iter().enumerate() {
        let dst = &mut scratch[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE];
        device.read_block(block, dst)?;
    }

    scratch[byte_offset..byte_offset + size].copy_from_slice(data);

    for (i, &block) in blocks.iter().enumerate() {
        let src = &scratch[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE];
        device.write_block(block, src)?;
    }

    record.size = record.size.max(offset + size as u64);
    Ok(size)
}

/// Returns `ceil(size / BLOCK_SIZE)`, the number of blocks a file of `size` bytes occupies.
pub fn blocks_for_size(size: u64) -> u32 {
    ((size + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64) as u32
}
