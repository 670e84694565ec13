//! Lay out and initialize an empty volume.
//!
//!   blocks = 1 (super) + bitmap_blocks + inode_blocks + data_blocks
//!   bitmap_blocks = ceil(data_blocks / (block_size * 8))
//!   inode_blocks  = ceil(data_blocks / (block_size / INODE_SIZE))
//!
//! i.e. in the worst case every data block is an empty file or directory and
//! needs an inode of its own.

use super::*;
use bitmap::BitBlockMut;
use common::*;
use dirent::DirEntry;
use disk::SuperBlock;
use inode::Inode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: u16,
    pub blocks: u32,
    pub bitmap_blocks: u32,
    pub inode_blocks: u32,
    pub data_blocks: u32,
}

impl Geometry {
    fn total(block_size: u64, data_blocks: u64) -> u64 {
        1 + data_blocks.div_ceil(block_size * 8)
            + data_blocks.div_ceil(block_size / INODE_SIZE as u64)
            + data_blocks
    }

    /// Give as many blocks as possible to data, the rest to the free map and inodes.
    pub fn compute(block_size: u16, blocks: u32) -> Result<Self> {
        let bs = block_size as u64;
        if bs == 0 || bs % INODE_SIZE as u64 != 0 {
            return Err(Errno::InvalidArgument.into());
        }
        let target = blocks as u64;

        // largest data block count whose layout still fits
        let (mut lo, mut hi) = (0u64, target);
        let mut data_blocks = 0u64;
        while lo <= hi {
            let mid = (lo + hi + 1) / 2;
            if Self::total(bs, mid) <= target {
                data_blocks = mid;
                lo = mid + 1;
            } else if mid == 0 {
                break;
            } else {
                hi = mid - 1;
            }
        }
        // rounding can leave the free map or inodes one block short
        while data_blocks > 0 && Self::total(bs, data_blocks) > target {
            data_blocks -= 1;
        }
        if data_blocks == 0 {
            log::warn!("mkfs: {blocks} blocks of {block_size} bytes leave no data blocks");
            return Err(Errno::InvalidArgument.into());
        }
        // block addresses are 24 bits wide and all ones means a hole
        let data_blocks = data_blocks.min(NOT_A_BLOCK as u64);

        let bitmap_blocks = data_blocks.div_ceil(bs * 8);
        // slack goes to the inode region
        let inode_blocks = target - 1 - bitmap_blocks - data_blocks;
        Ok(Self {
            block_size,
            blocks,
            bitmap_blocks: bitmap_blocks as u32,
            inode_blocks: inode_blocks as u32,
            data_blocks: data_blocks as u32,
        })
    }

    pub fn super_block(&self) -> SuperBlock {
        let bitmap_start = 1;
        let inode_start = bitmap_start + self.bitmap_blocks;
        SuperBlock {
            block_size: self.block_size,
            blocks: self.blocks,
            bitmap_start,
            inode_start,
            data_start: inode_start + self.inode_blocks,
        }
    }
}

/// Write an empty file system holding only the root directory.
pub fn format(blk_dev: &dyn BlockDevice, block_size: u16, blocks: u32) -> Result<SuperBlock> {
    let geo = Geometry::compute(block_size, blocks)?;
    let sb = geo.super_block();
    let bs = block_size as usize;
    log::info!(
        "mkfs: {} blocks of {} bytes: 1 super, {} bitmap, {} inode, {} data",
        blocks,
        block_size,
        geo.bitmap_blocks,
        geo.inode_blocks,
        geo.data_blocks
    );

    sb.write(blk_dev)?;

    // all blocks are free except data block 0, the root directory
    let zero = vec![0u8; bs];
    let mut block = vec![0u8; bs];
    BitBlockMut(&mut block).set(0);
    blk_dev.write_block(sb.bitmap_start as usize, &block)?;
    for b in sb.bitmap_start + 1..sb.inode_start {
        blk_dev.write_block(b as usize, &zero)?;
    }

    // root inode in slot 0: itself, "." and ".." make three links
    let mut root = Inode::new(S_IFDIR | 0o755, 3);
    root.direct[0] = Some(0);
    root.size = (2 * DIRENT_SIZE) as u32;
    let mut block = vec![0u8; bs];
    root.encode(&mut block[ROOTINO as usize * INODE_SIZE..])?;
    blk_dev.write_block(sb.iblock(ROOTINO) as usize, &block)?;
    for b in sb.inode_start + 1..sb.data_start {
        blk_dev.write_block(b as usize, &zero)?;
    }

    let mut block = vec![0u8; bs];
    DirEntry::new(ROOTINO, ".").encode(&mut block)?;
    DirEntry::new(ROOTINO, "..").encode(&mut block[DIRENT_SIZE..])?;
    blk_dev.write_block(sb.dblock(0) as usize, &block)?;

    // make sure the volume reaches its full length
    if sb.blocks - 1 > sb.data_start {
        blk_dev.write_block(sb.blocks as usize - 1, &zero)?;
    }
    blk_dev.flush()?;
    Ok(sb)
}
