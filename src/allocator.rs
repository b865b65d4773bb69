//! Converts "grow chain by N blocks" and "shrink chain to N blocks" requests into DMAP/FAT
//! edits. This is the only part of the engine that touches both tables at once.

use crate::dmap::Dmap;
use crate::errno::{self, Result};
use crate::fat::Fat;
use crate::layout::N_DATA;
use crate::superblock::Superblock;
use crate::types::BlockIdx;

/// Walks the chain rooted at `head`, following `next` pointers until an entry with `is_last`.
/// Returns the full, ordered list of block indices in the chain.
///
/// A chain that loops or runs longer than `N_DATA` hops is corrupted; this is treated as
/// unrecoverable and surfaces as an I/O error rather than looping forever.
pub(crate) fn walk_chain(fat: &Fat, head: BlockIdx) -> Result<Vec<BlockIdx>> {
    let mut blocks = Vec::new();
    let mut cur = head;
    loop {
        blocks.push(cur);
        if blocks.len() as u32 > N_DATA {
            return Err(errno::EIO);
        }
        if fat.is_last(cur) {
            break;
        }
        cur = fat.next(cur);
    }
    Ok(blocks)
}

/// Creates a new chain of `want_blocks` blocks (when `existing_head` is `None`), or extends the
/// chain rooted at `existing_head` by `want_blocks` additional blocks. Returns the chain's head:
/// the newly allocated first block, or the unchanged existing head.
///
/// The lowest-index free data block is always chosen, making allocation deterministic.
pub fn allocate(
    dmap: &mut Dmap,
    fat: &mut Fat,
    sb: &mut Superblock,
    existing_head: Option<BlockIdx>,
    want_blocks: u32,
) -> Result<BlockIdx> {
    if sb.num_free_blocks < want_blocks {
        return Err(errno::ENOSPC);
    }

    let mut remaining = want_blocks;
    let (head, mut tail) = match existing_head {
        None => {
            let first = dmap.find_free().ok_or(errno::ENOSPC)?;
            dmap.mark_used(first)?;
            fat.set_last(first, true);
            remaining -= 1;
            (first, first)
        }
        Some(head) => {
            let chain = walk_chain(fat, head)?;
            (head, *chain.last().ok_or(errno::EIO)?)
        }
    };

    for _ in 0..remaining {
        let new_block = dmap.find_free().ok_or(errno::ENOSPC)?;
        dmap.mark_used(new_block)?;
        fat.set_last(tail, false);
        fat.set_next(tail, new_block);
        fat.set_last(new_block, true);
        tail = new_block;
    }

    sb.num_free_blocks = dmap.count_free();
    Ok(head)
}

/// Keeps the first `keep_blocks` blocks of the chain rooted at `head`; returns the rest to the
/// DMAP. Returns `None` when `keep_blocks` is `0`, meaning the whole chain was freed and the
/// caller must clear the file's `first_block`; otherwise returns `Some(head)`.
pub fn free_tail(
    dmap: &mut Dmap,
    fat: &mut Fat,
    sb: &mut Superblock,
    head: BlockIdx,
    keep_blocks: u32,
) -> Result<Option<BlockIdx>> {
    let chain = walk_chain(fat, head)?;
    let len = chain.len() as u32;

    for (i, &block) in chain.iter().enumerate() {
        let i = i as u32;
        if i >= keep_blocks {
            dmap.mark_free(block)?;
        }
        if i + 1 == keep_blocks {
            fat.set_last(block, true);
        }
    }

    sb.num_free_blocks = dmap.count_free();

    if keep_blocks == 0 {
        Ok(None)
    } else {
        debug_assert!(keep_blocks <= len || len == 0);
        Ok(Some(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (Dmap, Fat, Superblock) {
        (Dmap::formatted(), Fat::formatted(), Superblock::formatted())
    }

    #[test]
    fn allocate_new_chain_picks_lowest_indices() {
        let (mut dmap, mut fat, mut sb) = fresh();
        let head = allocate(&mut dmap, &mut fat, &mut sb, None, 3).unwrap();
        assert_eq!(head, 0);
        assert_eq!(fat.next(0), 1);
        assert_eq!(fat.next(1), 2);
        assert!(fat.is_last(2));
        assert!(!dmap.is_free(0));
        assert!(!dmap.is_free(1));
        assert!(!dmap.is_free(2));
        assert_eq!(sb.num_free_blocks, N_DATA - 3);
    }

    #[test]
    fn extend_existing_chain_appends_blocks() {
        let (mut dmap, mut fat, mut sb) = fresh();
        let head = allocate(&mut dmap, &mut fat, &mut sb, None, 2).unwrap();
        let same_head = allocate(&mut dmap, &mut fat, &mut sb, Some(head), 2).unwrap();
        assert_eq!(same_head, head);
        assert_eq!(fat.next(0), 1);
        assert_eq!(fat.next(1), 2);
        assert_eq!(fat.next(2), 3);
        assert!(fat.is_last(3));
        assert_eq!(sb.num_free_blocks, N_DATA - 4);
    }

    #[test]
    fn allocate_fails_with_enospc_when_insufficient() {
        let (mut dmap, mut fat, mut sb) = fresh();
        sb.num_free_blocks = 1;
        let err = allocate(&mut dmap, &mut fat, &mut sb, None, 2).unwrap_err();
        assert_eq!(err, errno::ENOSPC);
    }

    #[test]
    fn free_tail_keeps_prefix_and_frees_rest() {
        let (mut dmap, mut fat, mut sb) = fresh();
        let head = allocate(&mut dmap, &mut fat, &mut sb, None, 4).unwrap();
        let new_head = free_tail(&mut dmap, &mut fat, &mut sb, head, 2).unwrap();
        assert_eq!(new_head, Some(0));
        assert!(fat.is_last(1));
        assert!(dmap.is_free(2));
        assert!(dmap.is_free(3));
        assert_eq!(sb.num_free_blocks, N_DATA - 2);
    }

    #[test]
    fn free_tail_to_zero_frees_everything() {
        let (mut dmap, mut fat, mut sb) = fresh();
        let head = allocate(&mut dmap, &mut fat, &mut sb, None, 3).unwrap();
        let new_head = free_tail(&mut dmap, &mut fat, &mut sb, head, 0).unwrap();
        assert_eq!(new_head, None);
        assert_eq!(sb.num_free_blocks, N_DATA);
    }
}
