use super::*;
use block_cache::BlockCache;
use block_device::BlockDevice;
use common::*;
use disk::SuperBlock;

/// A block read as a packed bit vector, bit `i` in byte `i / 8` under mask `1 << (i % 8)`.
pub struct BitBlock<'a>(pub &'a [u8]);

/// Mutable counterpart of [`BitBlock`].
pub struct BitBlockMut<'a>(pub &'a mut [u8]);

fn locate(bit: usize) -> (usize, u8) {
    (bit / 8, 1 << (bit % 8))
}

impl BitBlock<'_> {
    pub fn is_set(&self, bit: usize) -> bool {
        let (byte, mask) = locate(bit);
        self.0[byte] & mask != 0
    }

    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }
}

impl BitBlockMut<'_> {
    pub fn is_set(&self, bit: usize) -> bool {
        BitBlock(self.0).is_set(bit)
    }

    pub fn set(&mut self, bit: usize) {
        let (byte, mask) = locate(bit);
        self.0[byte] |= mask;
    }

    pub fn reset(&mut self, bit: usize) {
        let (byte, mask) = locate(bit);
        self.0[byte] &= !mask;
    }
}

/// Free map of the data region.
///
/// Allocation resumes from where the previous one stopped instead of starting
/// over at data block 0 every time.
pub struct BitMap {
    sb: SuperBlock,
    /// # of data blocks, i.e. # of meaningful bits
    blocks: u32,
    /// bits per bitmap block
    bpb: u32,
    /// next bit to look at
    cursor: u32,
    cache: BlockCache,
}

impl BitMap {
    pub fn new(sb: &SuperBlock) -> Self {
        Self {
            sb: *sb,
            blocks: sb.ndata(),
            bpb: bpb(sb.block_size as usize) as u32,
            cursor: 0,
            cache: BlockCache::new(sb.block_size as usize),
        }
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// make the bitmap block holding bit `bno` resident
    fn load(&mut self, blk_dev: &dyn BlockDevice, bno: u32) -> Result<()> {
        self.cache.load(blk_dev, self.sb.bblock(bno) as usize)
    }

    pub fn is_allocated(&mut self, blk_dev: &dyn BlockDevice, bno: u32) -> Result<bool> {
        self.load(blk_dev, bno)?;
        let bj = (bno % self.bpb) as usize; // offset
        Ok(BitBlock(self.cache.cache()).is_set(bj))
    }

    /// Find a clear bit at or after the cursor, set it and write the bitmap
    /// block back. `Errno::NoSpace` once the scan comes back to where it began.
    pub fn alloc(&mut self, blk_dev: &dyn BlockDevice) -> Result<u32> {
        let save = self.cursor;
        loop {
            let bno = self.cursor;
            self.load(blk_dev, bno)?;
            self.cursor += 1;
            if self.cursor >= self.blocks {
                self.cursor = 0;
            }
            let bj = (bno % self.bpb) as usize;
            if !BitBlock(self.cache.cache()).is_set(bj) {
                BitBlockMut(self.cache.cache_mut()).set(bj);
                self.cache.write_back(blk_dev)?;
                log::debug!("balloc: data block {bno}");
                return Ok(bno);
            }
            if self.cursor == save {
                log::warn!("balloc: out of blocks");
                return Err(Errno::NoSpace.into());
            }
        }
    }

    pub fn dealloc(&mut self, blk_dev: &dyn BlockDevice, bno: u32) -> Result<()> {
        if bno >= self.blocks {
            return Err(Error::Corrupt("freeing a block outside the data region"));
        }
        self.load(blk_dev, bno)?;
        let bj = (bno % self.bpb) as usize;
        let mut bits = BitBlockMut(self.cache.cache_mut());
        if !bits.is_set(bj) {
            log::warn!("bfree: data block {bno} was already free");
        }
        bits.reset(bj);
        self.cache.write_back(blk_dev)?;
        log::debug!("bfree: data block {bno}");
        Ok(())
    }

    /// # of clear bits in the data region
    pub fn count_free(&mut self, blk_dev: &dyn BlockDevice) -> Result<u32> {
        let mut used = 0;
        let mut bno = 0;
        while bno < self.blocks {
            self.load(blk_dev, bno)?;
            let in_block = (self.blocks - bno).min(self.bpb);
            let bits = BitBlock(self.cache.cache());
            used += if in_block == self.bpb {
                bits.count_ones() as u32
            } else {
                // bits past the last data block are not ours
                (0..in_block as usize).filter(|&b| bits.is_set(b)).count() as u32
            };
            bno += in_block;
        }
        Ok(self.blocks - used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_device::MemDisk;

    fn tiny() -> (MemDisk, SuperBlock) {
        // 64-byte blocks: 512 bits per bitmap block, only 20 data blocks
        let sb = SuperBlock {
            block_size: 64,
            blocks: 24,
            bitmap_start: 1,
            inode_start: 2,
            data_start: 4,
        };
        let disk = MemDisk::new();
        for b in 0..sb.blocks as usize {
            disk.write_block(b, &[0u8; 64]).unwrap();
        }
        (disk, sb)
    }

    #[test]
    fn bit_ops() {
        let mut raw = [0u8; 4];
        let mut bits = BitBlockMut(&mut raw);
        bits.set(0);
        bits.set(9);
        bits.set(31);
        assert!(bits.is_set(9));
        bits.reset(9);
        assert!(!bits.is_set(9));
        assert_eq!(raw, [0x01, 0x00, 0x00, 0x80]);
        assert_eq!(BitBlock(&raw).count_ones(), 2);
    }

    #[test]
    fn alloc_resumes_from_cursor() {
        let (disk, sb) = tiny();
        let mut bitmap = BitMap::new(&sb);
        assert_eq!(bitmap.alloc(&disk).unwrap(), 0);
        assert_eq!(bitmap.alloc(&disk).unwrap(), 1);
        bitmap.dealloc(&disk, 0).unwrap();
        // block 0 is free again but the scan continues forward
        assert_eq!(bitmap.alloc(&disk).unwrap(), 2);
        assert_eq!(bitmap.count_free(&disk).unwrap(), 18);
    }

    #[test]
    fn exhaustion_wraps_and_leaves_bitmap_alone() {
        let (disk, sb) = tiny();
        let mut bitmap = BitMap::new(&sb);
        let mut got: Vec<u32> = (0..20).map(|_| bitmap.alloc(&disk).unwrap()).collect();
        got.sort();
        assert_eq!(got, (0..20).collect::<Vec<_>>());

        let before = disk.snapshot();
        let cursor = bitmap.cursor();
        assert!(matches!(
            bitmap.alloc(&disk),
            Err(Error::Errno(Errno::NoSpace))
        ));
        assert_eq!(bitmap.cursor(), cursor);
        assert_eq!(disk.snapshot(), before);

        bitmap.dealloc(&disk, 7).unwrap();
        assert_eq!(bitmap.alloc(&disk).unwrap(), 7);
    }
}
