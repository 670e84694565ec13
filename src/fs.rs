use super::*;
use bitmap::BitMap;
use block_cache::BlockCache;
use block_device::BlockDevice;
use common::*;
use disk::SuperBlock;
use inode::{BlockId, Inode};

use std::sync::Arc;

/// One mounted volume.
///
/// Every metadata change is written through before the call returns, so there
/// is nothing to flush on close.
pub struct FileSystem {
    blk_dev: Arc<dyn BlockDevice>,
    sb: SuperBlock,
    bitmap: BitMap,
    /// one-block cache over the inode region
    icache: BlockCache,
    /// next inode slot `ialloc` looks at
    next_ino: u16,
    root: Inode,
}

impl FileSystem {
    /// Read the superblock, set up empty caches and load the root inode.
    pub fn open(blk_dev: Arc<dyn BlockDevice>) -> Result<Self> {
        let sb = SuperBlock::read(blk_dev.as_ref())?;
        sb.validate()?;
        log::info!(
            "mount: block size {}, {} blocks, bitmap@{} inodes@{} data@{}{}",
            sb.block_size,
            sb.blocks,
            sb.bitmap_start,
            sb.inode_start,
            sb.data_start,
            if blk_dev.is_read_only() { " (read-only)" } else { "" }
        );
        let mut fs = Self {
            bitmap: BitMap::new(&sb),
            icache: BlockCache::new(sb.block_size as usize),
            next_ino: 0,
            root: Inode::default(),
            blk_dev,
            sb,
        };
        fs.root = fs.read_inode(ROOTINO)?;
        if !fs.root.is_dir() {
            return Err(Error::Corrupt("root inode is not a directory"));
        }
        Ok(fs)
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    pub fn block_size(&self) -> usize {
        self.sb.block_size as usize
    }

    pub fn is_read_only(&self) -> bool {
        self.blk_dev.is_read_only()
    }

    /// the cached root inode
    pub fn root_inode(&self) -> &Inode {
        &self.root
    }

    /// read absolute block `blockno`
    pub fn read_block(&self, blockno: u32, buf: &mut [u8]) -> Result<()> {
        log::trace!("bread: {blockno}");
        self.blk_dev.read_block(blockno as usize, buf)?;
        Ok(())
    }

    /// write absolute block `blockno`
    pub fn write_block(&self, blockno: u32, buf: &[u8]) -> Result<()> {
        if self.is_read_only() {
            return Err(Errno::ReadOnlyFs.into());
        }
        log::trace!("bwrite: {blockno}");
        self.blk_dev.write_block(blockno as usize, buf)?;
        Ok(())
    }

    pub fn read_data_block(&self, bno: BlockId, buf: &mut [u8]) -> Result<()> {
        self.read_block(self.sb.dblock(bno), buf)
    }

    pub fn write_data_block(&self, bno: BlockId, buf: &[u8]) -> Result<()> {
        self.write_block(self.sb.dblock(bno), buf)
    }

    pub fn balloc(&mut self) -> Result<BlockId> {
        if self.is_read_only() {
            return Err(Errno::ReadOnlyFs.into());
        }
        self.bitmap.alloc(self.blk_dev.as_ref())
    }

    pub fn bfree(&mut self, bno: BlockId) -> Result<()> {
        if self.is_read_only() {
            return Err(Errno::ReadOnlyFs.into());
        }
        self.bitmap.dealloc(self.blk_dev.as_ref(), bno)
    }

    /// Find an inode slot with no links, scanning on from the previous find.
    ///
    /// The slot is not claimed here: it is taken once the caller writes an
    /// inode with a link count into it.
    pub fn ialloc(&mut self) -> Result<u16> {
        let ninodes = self.sb.ninodes();
        let save = self.next_ino;
        loop {
            let ino = self.next_ino;
            let inode = self.read_inode(ino)?;
            self.next_ino = if ino as u32 + 1 >= ninodes { 0 } else { ino + 1 };
            if inode.is_free() {
                log::debug!("ialloc: inode {ino}");
                return Ok(ino);
            }
            if self.next_ino == save {
                log::warn!("ialloc: no inodes");
                return Err(Errno::NoInodes.into());
            }
        }
    }

    fn load_inode_block(&mut self, ino: u16) -> Result<usize> {
        if ino as u32 >= self.sb.ninodes() {
            return Err(Error::Corrupt("inode number outside the inode region"));
        }
        self.icache
            .load(self.blk_dev.as_ref(), self.sb.iblock(ino) as usize)?;
        Ok(ino as usize * INODE_SIZE % self.block_size())
    }

    pub fn read_inode(&mut self, ino: u16) -> Result<Inode> {
        let offset = self.load_inode_block(ino)?;
        Inode::decode(&self.icache.cache()[offset..])
    }

    /// iupdate: the inode block goes back to disk before this returns.
    pub fn write_inode(&mut self, ino: u16, inode: &Inode) -> Result<()> {
        if self.is_read_only() {
            return Err(Errno::ReadOnlyFs.into());
        }
        let offset = self.load_inode_block(ino)?;
        inode.encode(&mut self.icache.cache_mut()[offset..])?;
        self.icache.write_back(self.blk_dev.as_ref())?;
        if ino == ROOTINO {
            self.root = inode.clone();
        }
        Ok(())
    }

    pub fn free_blocks(&mut self) -> Result<u32> {
        self.bitmap.count_free(self.blk_dev.as_ref())
    }

    pub fn free_inodes(&mut self) -> Result<u32> {
        let mut free = 0;
        for ino in 0..self.sb.ninodes() {
            if self.read_inode(ino as u16)?.is_free() {
                free += 1;
            }
        }
        Ok(free)
    }

    pub fn is_block_allocated(&mut self, bno: BlockId) -> Result<bool> {
        self.bitmap.is_allocated(self.blk_dev.as_ref(), bno)
    }

    pub fn sync(&self) -> Result<()> {
        self.blk_dev.flush()?;
        Ok(())
    }
}
