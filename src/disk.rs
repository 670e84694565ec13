//! Disk layout:
//! [ super block | free bit map | inode blocks | data blocks ]
//!
//! e.g. block size 512, 64 blocks in total:
//! [ super block(1) | free bit map(1) | inode blocks(7) | data blocks(55) ]

use super::*;
use common::*;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuperBlock {
    /// Size of a block in bytes
    pub block_size: u16,
    /// Size of file system image (blocks)
    pub blocks: u32,
    /// Block number of first free map block
    pub bitmap_start: u32,
    /// Block number of first inode block
    pub inode_start: u32,
    /// Block number of first data block
    pub data_start: u32,
}

impl SuperBlock {
    /// block 0 -> superblock. The whole block is not needed to find out how big
    /// a block is, so only the leading bytes are read.
    pub fn read(blk_dev: &dyn BlockDevice) -> Result<Self> {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        blk_dev.read_block(0, &mut buf)?;
        Self::decode(&buf)
    }

    /// superblock -> block 0, zero padded to the block size
    pub fn write(&self, blk_dev: &dyn BlockDevice) -> Result<()> {
        let mut block = vec![0u8; self.block_size as usize];
        self.encode(&mut block)?;
        blk_dev.write_block(0, &block)?;
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        use bincode::Options;
        Ok(codec().deserialize(&buf[..SUPERBLOCK_SIZE])?)
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        use bincode::Options;
        codec().serialize_into(&mut buf[..SUPERBLOCK_SIZE], self)?;
        Ok(())
    }

    /// reject anything a formatter could not have produced
    pub fn validate(&self) -> Result<()> {
        let bs = self.block_size as usize;
        if bs == 0 || bs % INODE_SIZE != 0 {
            return Err(Error::Corrupt("block size is not a multiple of the inode size"));
        }
        if !(self.bitmap_start < self.inode_start
            && self.inode_start < self.data_start
            && self.data_start < self.blocks)
        {
            return Err(Error::Corrupt("volume regions are out of order"));
        }
        if self.nbitmap() as usize * bpb(bs) < self.ndata() as usize {
            return Err(Error::Corrupt("bitmap region too small for the data region"));
        }
        Ok(())
    }

    /// Number of bitmap blocks
    pub fn nbitmap(&self) -> u32 {
        self.inode_start - self.bitmap_start
    }

    /// Number of inode blocks
    pub fn ninode_blocks(&self) -> u32 {
        self.data_start - self.inode_start
    }

    /// Number of data blocks
    pub fn ndata(&self) -> u32 {
        self.blocks - self.data_start
    }

    /// Number of inode slots, capped by what a u16 dirent can name
    pub fn ninodes(&self) -> u32 {
        let slots = self.ninode_blocks() as usize * ipb(self.block_size as usize);
        slots.min(u16::MAX as usize + 1) as u32
    }

    /// block of free map containing bit for data block `bno`
    pub fn bblock(&self, bno: u32) -> u32 {
        self.bitmap_start + bno / (bpb(self.block_size as usize) as u32)
    }

    /// block containing inode `ino`
    pub fn iblock(&self, ino: u16) -> u32 {
        self.inode_start + ino as u32 / (ipb(self.block_size as usize) as u32)
    }

    /// absolute block number of data block `bno`
    pub fn dblock(&self, bno: u32) -> u32 {
        self.data_start + bno
    }
}
