use super::*;
use file::FileDescriptor;
use inode::{FileKind, Inode};

/// What `stat` and `fstat` report about an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub dev: u16,
    pub ino: u16,
    pub mode: u16,
    pub nlink: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u32,
    /// direct blocks actually allocated; holes do not count
    pub blocks: u32,
}

impl Stat {
    pub fn new(dev: u16, ino: u16, inode: &Inode) -> Self {
        Self {
            dev,
            ino,
            mode: inode.mode,
            nlink: inode.nlink,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            blocks: inode.allocated_blocks(),
        }
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }
}

impl From<&FileDescriptor> for Stat {
    fn from(file: &FileDescriptor) -> Self {
        Stat::new(file.dev(), file.ino(), file.inode())
    }
}
