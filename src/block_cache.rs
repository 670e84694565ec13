use super::*;
use block_device::BlockDevice;

/// One resident block of a metadata region.
///
/// The engine keeps one of these for the bitmap region and one for the inode
/// region. A dirty block is always written back before another block takes its
/// place.
pub struct BlockCache {
    cache: Vec<u8>,
    /// absolute block number of what is in `cache`, `None` until first load
    blockno: Option<usize>,
    dirty: bool,
}

impl BlockCache {
    pub fn new(block_size: usize) -> Self {
        Self {
            cache: vec![0u8; block_size],
            blockno: None,
            dirty: false,
        }
    }

    /// block(disk) -> block(mem), unless it is already resident.
    pub fn load(&mut self, blk_dev: &dyn BlockDevice, blockno: usize) -> Result<()> {
        if self.blockno == Some(blockno) {
            return Ok(());
        }
        self.write_back(blk_dev)?;
        blk_dev.read_block(blockno, &mut self.cache)?;
        log::trace!("block cache: {:?} -> {}", self.blockno, blockno);
        self.blockno = Some(blockno);
        Ok(())
    }

    /// block(mem) -> block(disk), if it changed since it was loaded.
    pub fn write_back(&mut self, blk_dev: &dyn BlockDevice) -> Result<()> {
        if let (true, Some(blockno)) = (self.dirty, self.blockno) {
            blk_dev.write_block(blockno, &self.cache)?;
            self.dirty = false;
        }
        Ok(())
    }

    pub fn cache(&self) -> &[u8] {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_device::MemDisk;

    #[test]
    fn dirty_block_is_flushed_before_swap() {
        let disk = MemDisk::new();
        disk.write_block(0, &[0u8; 64]).unwrap();
        disk.write_block(1, &[9u8; 64]).unwrap();

        let mut cache = BlockCache::new(64);
        cache.load(&disk, 0).unwrap();
        cache.cache_mut()[5] = 42;
        cache.load(&disk, 1).unwrap();
        assert_eq!(cache.cache()[5], 9);

        let mut raw = [0u8; 64];
        disk.read_block(0, &mut raw).unwrap();
        assert_eq!(raw[5], 42);
    }

    #[test]
    fn clean_block_is_not_written() {
        let disk = MemDisk::new();
        disk.write_block(0, &[1u8; 64]).unwrap();
        let mut cache = BlockCache::new(64);
        cache.load(&disk, 0).unwrap();
        // change the disk underneath: a clean cache must not overwrite it
        disk.write_block(0, &[2u8; 64]).unwrap();
        cache.write_back(&disk).unwrap();

        let mut raw = [0u8; 64];
        disk.read_block(0, &mut raw).unwrap();
        assert_eq!(raw, [2u8; 64]);
    }
}
