/// root i-number
pub const ROOTINO: u16 = 0;

/// device number of the root volume
pub const ROOTDEV: u16 = 0;

/// on-disk "no block here yet" address, 24 bits wide
pub const NOT_A_BLOCK: u32 = 0x00FF_FFFF;

/// size of an inode record on disk
pub const INODE_SIZE: usize = 64;

/// direct blocks in inode
pub const NDIRECT: usize = 10;

/// max # of blocks a file can have
pub const MAXFILE: usize = NDIRECT;

/// Directory is a file containing a sequence of dirent structures.
pub const DIRSIZ: usize = 14;

/// size of a dirent record on disk
pub const DIRENT_SIZE: usize = DIRSIZ + 2;

/// bytes of the superblock actually used, the rest of block 0 is zero
pub const SUPERBLOCK_SIZE: usize = 18;

/// inodes per block
pub const fn ipb(block_size: usize) -> usize {
    block_size / INODE_SIZE
}

/// bitmap bits per block
pub const fn bpb(block_size: usize) -> usize {
    block_size * 8
}

/* open flags */
pub const O_RDONLY: i32 = 0;
pub const O_WRONLY: i32 = 1;
pub const O_RDWR: i32 = 2;

/* lseek whence */
pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/* modes */
pub const S_IFMT: u16 = 0o170000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFBLK: u16 = 0o060000;
pub const S_IFDIR: u16 = 0o040000;
pub const S_IFCHR: u16 = 0o020000;
pub const S_ISUID: u16 = 0o4000;
pub const S_ISGID: u16 = 0o2000;
pub const S_ISVTX: u16 = 0o1000;
pub const S_IRWXU: u16 = 0o700;
pub const S_IRUSR: u16 = 0o400;
pub const S_IWUSR: u16 = 0o200;
pub const S_IXUSR: u16 = 0o100;
pub const S_IRWXG: u16 = 0o070;
pub const S_IRGRP: u16 = 0o040;
pub const S_IWGRP: u16 = 0o020;
pub const S_IXGRP: u16 = 0o010;
pub const S_IRWXO: u16 = 0o007;
pub const S_IROTH: u16 = 0o004;
pub const S_IWOTH: u16 = 0o002;
pub const S_IXOTH: u16 = 0o001;

/// everything in a mode that is not the file type
pub const S_IPERM: u16 = !S_IFMT;

/// big-endian, fixed-width encoding shared by every on-disk record
pub(crate) fn codec() -> impl bincode::Options {
    use bincode::Options;
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}
