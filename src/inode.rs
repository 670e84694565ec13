use super::*;
use common::*;

use serde::{Deserialize, Serialize};

/// data block number, relative to the start of the data region
pub type BlockId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    CharDevice,
    BlockDevice,
    /// any type bits we do not know about
    Other,
}

impl FileKind {
    pub fn from_mode(mode: u16) -> Self {
        match mode & S_IFMT {
            S_IFREG => FileKind::File,
            S_IFDIR => FileKind::Directory,
            S_IFCHR => FileKind::CharDevice,
            S_IFBLK => FileKind::BlockDevice,
            _ => FileKind::Other,
        }
    }
}

/// inode on disk, exactly `INODE_SIZE` bytes once encoded
#[derive(Serialize, Deserialize, Default)]
struct DiskInode {
    mode: u16,
    nlink: u16,
    uid: u16,
    gid: u16,
    size: u32,
    /// 3-byte big-endian data block addresses
    addrs: [[u8; 3]; NDIRECT],
    /// room for indirect blocks and timestamps
    reserved: [u8; 22],
}

/// inode in memory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inode {
    /// File type and permission bits
    pub mode: u16,
    /// Number of links to inode in file system, 0 means the slot is free
    pub nlink: u16,
    pub uid: u16,
    pub gid: u16,
    /// Size of file (bytes)
    pub size: u32,
    /// Data block addresses
    pub direct: [Option<BlockId>; NDIRECT],
}

impl Default for Inode {
    fn default() -> Self {
        Self {
            mode: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            size: 0,
            direct: [None; NDIRECT],
        }
    }
}

impl Inode {
    pub fn new(mode: u16, nlink: u16) -> Self {
        Self {
            mode,
            nlink,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    pub fn is_free(&self) -> bool {
        self.nlink == 0
    }

    /// physical address of logical block `lbn`; `Errno::FileTooLarge` past the direct blocks
    pub fn block_address(&self, lbn: usize) -> Result<Option<BlockId>> {
        self.direct
            .get(lbn)
            .copied()
            .ok_or(Error::Errno(Errno::FileTooLarge))
    }

    pub fn set_block_address(&mut self, lbn: usize, addr: Option<BlockId>) -> Result<()> {
        let slot = self
            .direct
            .get_mut(lbn)
            .ok_or(Error::Errno(Errno::FileTooLarge))?;
        *slot = addr;
        Ok(())
    }

    /// # of direct blocks that point somewhere
    pub fn allocated_blocks(&self) -> u32 {
        self.direct.iter().filter(|b| b.is_some()).count() as u32
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        use bincode::Options;
        let d: DiskInode = codec().deserialize(&buf[..INODE_SIZE])?;
        let mut direct = [None; NDIRECT];
        for (slot, addr) in direct.iter_mut().zip(d.addrs.iter()) {
            let bno = u32::from_be_bytes([0, addr[0], addr[1], addr[2]]);
            *slot = (bno != NOT_A_BLOCK).then_some(bno);
        }
        Ok(Self {
            mode: d.mode,
            nlink: d.nlink,
            uid: d.uid,
            gid: d.gid,
            size: d.size,
            direct,
        })
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        use bincode::Options;
        let mut d = DiskInode {
            mode: self.mode,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            size: self.size,
            ..Default::default()
        };
        for (addr, slot) in d.addrs.iter_mut().zip(self.direct.iter()) {
            let bno = slot.unwrap_or(NOT_A_BLOCK);
            if bno > NOT_A_BLOCK {
                return Err(Error::Corrupt("block address does not fit in 24 bits"));
            }
            let [_, a, b, c] = bno.to_be_bytes();
            *addr = [a, b, c];
        }
        codec().serialize_into(&mut buf[..INODE_SIZE], &d)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_disk_format() {
        let mut inode = Inode::new(S_IFDIR | 0o755, 3);
        inode.uid = 0x0102;
        inode.gid = 0x0304;
        inode.size = 32;
        inode.direct[0] = Some(0);
        inode.direct[1] = Some(0x0A0B0C);

        let mut buf = [0xAAu8; INODE_SIZE];
        inode.encode(&mut buf).unwrap();
        assert_eq!(&buf[0..12], &[0x41, 0xED, 0, 3, 1, 2, 3, 4, 0, 0, 0, 32]);
        assert_eq!(&buf[12..15], &[0, 0, 0]);
        assert_eq!(&buf[15..18], &[0x0A, 0x0B, 0x0C]);
        assert_eq!(&buf[18..21], &[0xFF, 0xFF, 0xFF]);
        assert!(buf[42..].iter().all(|&b| b == 0));
    }

    #[test]
    fn round_trip_keeps_every_field() {
        let mut inode = Inode::new(u16::MAX, u16::MAX);
        inode.uid = 7;
        inode.gid = u16::MAX;
        inode.size = u32::MAX;
        inode.direct = [
            Some(0),
            None,
            Some(NOT_A_BLOCK - 1),
            Some(1),
            None,
            Some(0x00AB_CDEF),
            None,
            None,
            Some(42),
            None,
        ];
        let mut buf = [0u8; INODE_SIZE];
        inode.encode(&mut buf).unwrap();
        assert_eq!(Inode::decode(&buf).unwrap(), inode);
    }

    #[test]
    fn zeroed_slot_is_free() {
        let inode = Inode::decode(&[0u8; INODE_SIZE]).unwrap();
        assert!(inode.is_free());
        // all-zero addresses are data block 0, not holes
        assert_eq!(inode.direct[0], Some(0));
    }

    #[test]
    fn direct_block_cap() {
        let mut inode = Inode::default();
        assert_eq!(inode.block_address(NDIRECT - 1).unwrap(), None);
        assert!(matches!(
            inode.block_address(NDIRECT),
            Err(Error::Errno(Errno::FileTooLarge))
        ));
        assert!(inode.set_block_address(NDIRECT, Some(1)).is_err());
    }

    #[test]
    fn oversized_address_is_rejected() {
        let mut inode = Inode::default();
        inode.direct[0] = Some(0x0100_0000);
        let mut buf = [0u8; INODE_SIZE];
        assert!(matches!(inode.encode(&mut buf), Err(Error::Corrupt(_))));
    }

    #[test]
    fn kinds() {
        assert_eq!(FileKind::from_mode(S_IFREG | 0o644), FileKind::File);
        assert_eq!(FileKind::from_mode(S_IFDIR), FileKind::Directory);
        assert_eq!(FileKind::from_mode(0o644), FileKind::Other);
    }
}
