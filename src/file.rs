use super::*;
use common::*;
use dirent::DirEntry;
use fs::FileSystem;
use inode::Inode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenFlags {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenFlags {
    pub fn readable(self) -> bool {
        matches!(self, OpenFlags::ReadOnly | OpenFlags::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, OpenFlags::WriteOnly | OpenFlags::ReadWrite)
    }
}

impl TryFrom<i32> for OpenFlags {
    type Error = Errno;

    fn try_from(flags: i32) -> core::result::Result<Self, Errno> {
        match flags {
            O_RDONLY => Ok(OpenFlags::ReadOnly),
            O_WRONLY => Ok(OpenFlags::WriteOnly),
            O_RDWR => Ok(OpenFlags::ReadWrite),
            _ => Err(Errno::InvalidArgument),
        }
    }
}

/// An open inode: private copy of the inode, a byte cursor and a one-block
/// buffer. Every operation takes the file system it was opened on.
pub struct FileDescriptor {
    dev: u16,
    ino: u16,
    inode: Inode,
    flags: OpenFlags,
    offset: usize,
    bytes: Vec<u8>,
}

impl FileDescriptor {
    pub fn new(fs: &FileSystem, dev: u16, ino: u16, inode: Inode, flags: OpenFlags) -> Self {
        Self {
            dev,
            ino,
            inode,
            flags,
            offset: 0,
            bytes: vec![0u8; fs.block_size()],
        }
    }

    pub fn dev(&self) -> u16 {
        self.dev
    }

    pub fn ino(&self) -> u16 {
        self.ino
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn size(&self) -> usize {
        self.inode.size as usize
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    fn block_size(&self) -> usize {
        self.bytes.len()
    }

    /// Logical block `lbn` -> buffer. A block that was never written reads as
    /// zeros and stays unallocated.
    pub fn read_block(&mut self, fs: &mut FileSystem, lbn: usize) -> Result<()> {
        match self.inode.block_address(lbn)? {
            None => self.bytes.fill(0),
            Some(bno) => fs.read_data_block(bno, &mut self.bytes)?,
        }
        Ok(())
    }

    /// Buffer -> logical block `lbn`, allocating it first if needed. The inode
    /// is written as soon as it points at the new block.
    pub fn write_block(&mut self, fs: &mut FileSystem, lbn: usize) -> Result<()> {
        let bno = match self.inode.block_address(lbn)? {
            Some(bno) => bno,
            None => {
                let bno = fs.balloc()?;
                self.inode.set_block_address(lbn, Some(bno))?;
                fs.write_inode(self.ino, &self.inode)?;
                bno
            }
        };
        fs.write_data_block(bno, &self.bytes)
    }

    pub fn set_size(&mut self, fs: &mut FileSystem, size: usize) -> Result<()> {
        self.inode.size = size as u32;
        fs.write_inode(self.ino, &self.inode)
    }

    /// Copy out up to `buf.len()` bytes from the cursor, never past the end of file.
    pub fn read(&mut self, fs: &mut FileSystem, buf: &mut [u8]) -> Result<usize> {
        let bs = self.block_size();
        let end = self.size().min(self.offset.saturating_add(buf.len()));
        let mut count = 0;
        while self.offset < end {
            let (lbn, at) = (self.offset / bs, self.offset % bs);
            let n = (bs - at).min(end - self.offset);
            self.read_block(fs, lbn)?;
            buf[count..count + n].copy_from_slice(&self.bytes[at..at + n]);
            self.offset += n;
            count += n;
        }
        Ok(count)
    }

    /// Copy `buf` in at the cursor, growing the file as needed.
    ///
    /// Each touched block is flushed as soon as it is complete or the data runs
    /// out. If the file hits the direct block cap or the volume fills up after
    /// some bytes went in, those bytes are reported and the error is left for
    /// the next call.
    pub fn write(&mut self, fs: &mut FileSystem, buf: &[u8]) -> Result<usize> {
        let bs = self.block_size();
        let mut count = 0;
        while count < buf.len() {
            let (lbn, at) = (self.offset / bs, self.offset % bs);
            let n = (bs - at).min(buf.len() - count);
            let step = self
                .read_block(fs, lbn)
                .and_then(|()| {
                    self.bytes[at..at + n].copy_from_slice(&buf[count..count + n]);
                    self.write_block(fs, lbn)
                });
            if let Err(err) = step {
                if count > 0 && !err.is_fatal() {
                    break;
                }
                return Err(err);
            }
            self.offset += n;
            count += n;
            if self.offset > self.size() {
                self.set_size(fs, self.offset)?;
            }
        }
        Ok(count)
    }

    /// Next directory record, `None` at the end of the directory.
    pub fn read_dirent(&mut self, fs: &mut FileSystem) -> Result<Option<DirEntry>> {
        if !self.inode.is_dir() {
            return Err(Errno::NotADirectory.into());
        }
        if self.offset % DIRENT_SIZE != 0 {
            return Err(Errno::InvalidArgument.into());
        }
        if self.offset >= self.size() {
            return Ok(None);
        }
        let bs = self.block_size();
        self.read_block(fs, self.offset / bs)?;
        let entry = DirEntry::decode(&self.bytes[self.offset % bs..])?;
        self.offset += DIRENT_SIZE;
        Ok(Some(entry))
    }

    /// Store `entry` at the cursor, extending the directory if the cursor is at its end.
    pub fn write_dirent(&mut self, fs: &mut FileSystem, entry: &DirEntry) -> Result<()> {
        if !self.inode.is_dir() {
            return Err(Errno::NotADirectory.into());
        }
        // records never straddle a block
        if self.offset % DIRENT_SIZE != 0 {
            return Err(Errno::InvalidArgument.into());
        }
        let bs = self.block_size();
        let lbn = self.offset / bs;
        self.read_block(fs, lbn)?;
        entry.encode(&mut self.bytes[self.offset % bs..])?;
        self.write_block(fs, lbn)?;
        self.offset += DIRENT_SIZE;
        if self.offset > self.size() {
            self.set_size(fs, self.offset)?;
        }
        Ok(())
    }

    /// Cut or extend the file to `len` bytes. Blocks wholly past the new end
    /// are freed and the tail of a partial last block is zeroed, so growing
    /// the file again exposes a hole and never stale bytes.
    pub fn truncate(&mut self, fs: &mut FileSystem, len: usize) -> Result<()> {
        let bs = self.block_size();
        if len > MAXFILE * bs {
            return Err(Errno::FileTooLarge.into());
        }
        let keep = len.div_ceil(bs);
        for lbn in keep..NDIRECT {
            if let Some(bno) = self.inode.block_address(lbn)? {
                fs.bfree(bno)?;
                self.inode.set_block_address(lbn, None)?;
            }
        }
        if len % bs != 0 && self.inode.block_address(len / bs)?.is_some() {
            self.read_block(fs, len / bs)?;
            self.bytes[len % bs..].fill(0);
            self.write_block(fs, len / bs)?;
        }
        self.offset = self.offset.min(len);
        self.set_size(fs, len)
    }

    /// take over a newer copy of the inode written through another handle
    pub fn reload(&mut self, inode: Inode) {
        self.inode = inode;
    }
}
