//! Host mount of the root volume. Every request goes through the
//! [`Kernel`] calls of one process; FUSE file handles are its descriptors.

use super::*;
use common::*;
use dirent::DirEntry;
use file::OpenFlags;
use inode::FileKind;
use kernel::{Fd, Kernel};
use stat::Stat;

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TTL: Duration = Duration::from_secs(1);

impl From<FileKind> for FileType {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Directory => FileType::Directory,
            FileKind::CharDevice => FileType::CharDevice,
            FileKind::BlockDevice => FileType::BlockDevice,
            FileKind::File | FileKind::Other => FileType::RegularFile,
        }
    }
}

/// FUSE numbers the root 1, we number it 0
fn to_fuse(ino: u16) -> u64 {
    ino as u64 + 1
}

fn from_fuse(ino: u64) -> Option<u16> {
    ino.checked_sub(1).and_then(|ino| u16::try_from(ino).ok())
}

fn attr(st: &Stat, blksize: u32) -> FileAttr {
    FileAttr {
        ino: to_fuse(st.ino),
        size: st.size as u64,
        blocks: st.blocks as u64 * (blksize as u64 / 512).max(1),
        atime: UNIX_EPOCH, // no timestamps on disk
        mtime: UNIX_EPOCH,
        ctime: UNIX_EPOCH,
        crtime: UNIX_EPOCH,
        kind: st.kind().into(),
        perm: st.mode & !S_IFMT,
        nlink: st.nlink as u32,
        uid: st.uid as u32,
        gid: st.gid as u32,
        rdev: 0,
        blksize,
        flags: 0,
    }
}

fn code(err: &Error) -> c_int {
    err.errno().map(Errno::code).unwrap_or(libc::EIO)
}

fn access_mode(flags: i32) -> OpenFlags {
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => OpenFlags::WriteOnly,
        libc::O_RDWR => OpenFlags::ReadWrite,
        _ => OpenFlags::ReadOnly,
    }
}

pub struct SimFs {
    kernel: Kernel,
    blksize: u32,
}

impl SimFs {
    pub fn new(kernel: Kernel) -> Self {
        let blksize = kernel.fs().block_size() as u32;
        Self { kernel, blksize }
    }

    fn ino(ino: u64) -> Result<u16> {
        from_fuse(ino).ok_or(Error::Errno(Errno::NoEntry))
    }

    fn name(name: &OsStr) -> Result<&str> {
        name.to_str().ok_or(Error::Errno(Errno::InvalidArgument))
    }

    fn fd(fh: u64) -> Result<Fd> {
        usize::try_from(fh).map_err(|_| Error::Errno(Errno::BadDescriptor))
    }

    fn seek(&mut self, fh: u64, offset: i64) -> Result<Fd> {
        let fd = Self::fd(fh)?;
        self.kernel.lseek(fd, offset, SEEK_SET)?;
        Ok(fd)
    }

    fn do_lookup(&mut self, parent: u64, name: &OsStr) -> Result<FileAttr> {
        let st = self.kernel.lookup_in(Self::ino(parent)?, Self::name(name)?)?;
        Ok(attr(&st, self.blksize))
    }

    fn do_create(&mut self, parent: u64, name: &OsStr, mode: u16, flags: i32) -> Result<(FileAttr, Fd)> {
        let fd = self.kernel.creat_in(Self::ino(parent)?, Self::name(name)?, mode)?;
        let st = self.kernel.fstat(fd)?;
        // creat always opens write-only
        let fd = match access_mode(flags) {
            OpenFlags::WriteOnly => fd,
            flags => {
                self.kernel.close(fd)?;
                self.kernel.open_inode(st.ino, flags)?
            }
        };
        Ok((attr(&st, self.blksize), fd))
    }

    fn do_readdir(&mut self, fh: u64, offset: i64, reply: &mut ReplyDirectory) -> Result<()> {
        let fd = self.seek(fh, offset * DIRENT_SIZE as i64)?;
        let mut entry = DirEntry::default();
        let mut next = offset;
        while self.kernel.readdir(fd, &mut entry)? > 0 {
            next += 1;
            let kind = self.kernel.stat_inode(entry.ino)?.kind();
            if reply.add(to_fuse(entry.ino), next, kind.into(), entry.name()) {
                break;
            }
        }
        Ok(())
    }
}

impl Filesystem for SimFs {
    fn destroy(&mut self) {
        if let Err(err) = self.kernel.sync() {
            log::error!("unmount: {err}");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match Self::ino(ino).and_then(|ino| self.kernel.stat_inode(ino)) {
            Ok(st) => reply.attr(&TTL, &attr(&st, self.blksize)),
            Err(err) => reply.error(code(&err)),
        }
    }

    /// Only the size can change: there are no timestamps, and ownership and
    /// modes are fixed at creation.
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let result = Self::ino(ino).and_then(|ino| match size {
            Some(size) => self.kernel.truncate_inode(ino, size as usize),
            None => self.kernel.stat_inode(ino),
        });
        match result {
            Ok(st) => reply.attr(&TTL, &attr(&st, self.blksize)),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let mode = (mode & !umask) as u16;
        let result = Self::ino(parent)
            .and_then(|parent| Ok((parent, Self::name(name)?)))
            .and_then(|(parent, name)| self.kernel.mkdir_in(parent, name, mode));
        match result {
            Ok(st) => reply.entry(&TTL, &attr(&st, self.blksize), 0),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match Self::ino(ino).and_then(|ino| self.kernel.open_inode(ino, access_mode(flags))) {
            Ok(fd) => reply.opened(fd as u64, 0),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut buf = vec![0u8; size as usize];
        let result = self
            .seek(fh, offset)
            .and_then(|fd| self.kernel.read(fd, &mut buf));
        match result {
            Ok(n) => reply.data(&buf[..n]),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = self
            .seek(fh, offset)
            .and_then(|fd| self.kernel.write(fd, data));
        match result {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match Self::fd(fh).and_then(|fd| self.kernel.close(fd)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match Self::ino(ino).and_then(|ino| self.kernel.open_inode(ino, OpenFlags::ReadOnly)) {
            Ok(fd) => reply.opened(fd as u64, 0),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        match self.do_readdir(fh, offset, &mut reply) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        match Self::fd(fh).and_then(|fd| self.kernel.close(fd)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let mode = (mode & !umask) as u16;
        match self.do_create(parent, name, mode, flags) {
            Ok((attr, fd)) => reply.created(&TTL, &attr, 0, fd as u64, 0),
            Err(err) => reply.error(code(&err)),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.kernel.sync() {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(code(&err)),
        }
    }
}

/// Serve the volume at `mountpoint` until it is unmounted.
pub fn mount(kernel: Kernel, mountpoint: &Path, read_only: bool) -> io::Result<()> {
    let options = [
        MountOption::FSName("simfs".to_string()),
        if read_only {
            MountOption::RO
        } else {
            MountOption::RW
        },
    ];
    log::info!("mount: {}", mountpoint.display());
    fuser::mount2(SimFs::new(kernel), mountpoint, &options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_numbers_shift_by_one() {
        assert_eq!(to_fuse(ROOTINO), fuser::FUSE_ROOT_ID);
        assert_eq!(from_fuse(fuser::FUSE_ROOT_ID), Some(ROOTINO));
        assert_eq!(from_fuse(0), None);
        assert_eq!(from_fuse(u16::MAX as u64 + 2), None);
    }

    #[test]
    fn attributes_from_stat() {
        let st = Stat {
            ino: 4,
            mode: S_IFDIR | 0o750,
            nlink: 2,
            uid: 1000,
            gid: 100,
            size: 48,
            blocks: 1,
            ..Default::default()
        };
        let a = attr(&st, 1024);
        assert_eq!(a.ino, 5);
        assert_eq!(a.kind, FileType::Directory);
        assert_eq!(a.perm, 0o750);
        assert_eq!((a.uid, a.gid, a.nlink), (1000, 100, 2));
        assert_eq!(a.blocks, 2);
    }

    #[test]
    fn access_modes() {
        assert_eq!(access_mode(libc::O_RDONLY), OpenFlags::ReadOnly);
        assert_eq!(access_mode(libc::O_WRONLY | libc::O_TRUNC), OpenFlags::WriteOnly);
        assert_eq!(access_mode(libc::O_RDWR), OpenFlags::ReadWrite);
    }

    #[test]
    fn only_errno_maps_through() {
        assert_eq!(code(&Errno::FileTooLarge.into()), libc::EFBIG);
        assert_eq!(code(&Error::Corrupt("x")), libc::EIO);
    }
}
