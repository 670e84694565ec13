//! The system call layer.
//!
//! A [`Kernel`] owns the one mounted volume, the system-wide open file table
//! and an arena of processes. Calls run on behalf of the current process; a
//! recoverable failure is returned and also stored as that process's errno.

use super::*;
use block_device::BlockDevice;
use common::*;
use config::KernelConfig;
use dirent::DirEntry;
use file::{FileDescriptor, OpenFlags};
use fs::FileSystem;
use inode::Inode;
use process::{Pid, ProcessContext};
use stat::Stat;

use std::sync::Arc;

/// per-process file descriptor
pub type Fd = usize;

pub struct Kernel {
    fs: FileSystem,
    /// system-wide open file table
    open_files: Vec<Option<FileDescriptor>>,
    processes: Vec<Option<ProcessContext>>,
    current: Option<Pid>,
    process_max_open_files: usize,
}

impl Kernel {
    /// Mount `blk_dev` and start the first process from `config`.
    pub fn new(blk_dev: Arc<dyn BlockDevice>, config: &KernelConfig) -> Result<Self> {
        let fs = FileSystem::open(blk_dev)?;
        let mut kernel = Self {
            fs,
            open_files: (0..config.max_open_files).map(|_| None).collect(),
            processes: Vec::new(),
            current: None,
            process_max_open_files: config.process_max_open_files,
        };
        let pid = kernel.spawn(config.uid, config.gid, &config.dir, config.umask);
        kernel.switch_to(pid)?;
        Ok(kernel)
    }

    /// Open the volume file named by `config` and mount it.
    pub fn boot(config: &KernelConfig) -> Result<Self> {
        log::info!("boot: volume {} ({})", config.volume.display(), config.mode);
        Self::new(config.open_volume()?, config)
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut FileSystem {
        &mut self.fs
    }

    /* processes */

    pub fn spawn(&mut self, uid: u16, gid: u16, dir: &str, umask: u16) -> Pid {
        let process = ProcessContext::new(uid, gid, dir, umask, self.process_max_open_files);
        let pid = match self.processes.iter().position(Option::is_none) {
            Some(i) => {
                self.processes[i] = Some(process);
                Pid(i)
            }
            None => {
                self.processes.push(Some(process));
                Pid(self.processes.len() - 1)
            }
        };
        log::debug!("spawn: pid {} uid {uid} gid {gid}", pid.0);
        pid
    }

    pub fn switch_to(&mut self, pid: Pid) -> Result<()> {
        match self.processes.get(pid.0) {
            Some(Some(_)) => {
                self.current = Some(pid);
                Ok(())
            }
            _ => Err(Error::NoProcess),
        }
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.current
    }

    pub fn process(&self) -> Result<&ProcessContext> {
        self.current
            .and_then(|pid| self.processes.get(pid.0))
            .and_then(Option::as_ref)
            .ok_or(Error::NoProcess)
    }

    pub fn process_mut(&mut self) -> Result<&mut ProcessContext> {
        self.current
            .and_then(|pid| self.processes.get_mut(pid.0))
            .and_then(Option::as_mut)
            .ok_or(Error::NoProcess)
    }

    /// last recoverable error of the current process
    pub fn errno(&self) -> Option<Errno> {
        self.process().ok().and_then(|p| p.errno)
    }

    /// Print `prefix: message` for the current errno to stderr.
    pub fn perror(&self, prefix: &str) {
        match self.errno() {
            Some(errno) => eprintln!("{prefix}: {errno}"),
            None => eprintln!("{prefix}: Success"),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            match err.errno() {
                Some(errno) => {
                    if let Ok(process) = self.process_mut() {
                        process.errno = Some(errno);
                    }
                }
                None => log::error!("kernel: {err}"),
            }
        }
        result
    }

    /* path resolution */

    fn full_path(&self, path: &str) -> Result<String> {
        Ok(path::full_path(&self.process()?.dir, path))
    }

    /// Scan directory `dir_ino` for `name` through a private handle.
    fn find_entry(&mut self, dir_ino: u16, dir: &Inode, name: &str) -> Result<Option<u16>> {
        let mut h = FileDescriptor::new(&self.fs, ROOTDEV, dir_ino, dir.clone(), OpenFlags::ReadOnly);
        while let Some(entry) = h.read_dirent(&mut self.fs)? {
            if entry.is_named(name) {
                return Ok(Some(entry.ino));
            }
        }
        Ok(None)
    }

    /// Follow `names` down from the root.
    fn walk(&mut self, names: &[&str]) -> Result<(u16, Inode)> {
        let mut ino = ROOTINO;
        let mut inode = self.fs.root_inode().clone();
        for name in names {
            if !inode.is_dir() {
                return Err(Errno::NotADirectory.into());
            }
            ino = self
                .find_entry(ino, &inode, name)?
                .ok_or(Errno::NoEntry)?;
            inode = self.fs.read_inode(ino)?;
        }
        Ok((ino, inode))
    }

    fn resolve(&mut self, path: &str) -> Result<(u16, Inode)> {
        let full = self.full_path(path)?;
        self.walk(&path::components(&full))
    }

    /// Resolve everything but the last component; `None` names the root.
    fn resolve_parent(&mut self, path: &str) -> Result<Option<(u16, String)>> {
        let full = self.full_path(path)?;
        match path::split_parent(&full) {
            None => Ok(None),
            Some((dirs, name)) => {
                let name = name.to_string();
                let (ino, _) = self.walk(&dirs)?;
                Ok(Some((ino, name)))
            }
        }
    }

    fn parent_dir(&mut self, ino: u16) -> Result<Inode> {
        let dir = self.fs.read_inode(ino)?;
        if !dir.is_dir() {
            return Err(Errno::NotADirectory.into());
        }
        Ok(dir)
    }

    /// Fail before any change if one more entry (plus `extra` blocks
    /// elsewhere) cannot fit.
    fn ensure_room(&mut self, dir: &Inode, extra: u32) -> Result<()> {
        let bs = self.fs.block_size();
        let size = dir.size as usize;
        if size + DIRENT_SIZE > MAXFILE * bs {
            return Err(Errno::FileTooLarge.into());
        }
        let grows = size % bs == 0 && dir.block_address(size / bs)?.is_none();
        let needed = extra + grows as u32;
        if needed > 0 && self.fs.free_blocks()? < needed {
            return Err(Errno::NoSpace.into());
        }
        Ok(())
    }

    /// Insert `(ino, name)` into directory `dir_ino`, keeping names sorted.
    ///
    /// Entries sorting after `name` move one record later: each is read
    /// ahead before its slot is overwritten by the one before it.
    fn insert_entry(&mut self, dir_ino: u16, name: &str, ino: u16) -> Result<()> {
        let dir = self.fs.read_inode(dir_ino)?;
        let mut h = FileDescriptor::new(&self.fs, ROOTDEV, dir_ino, dir, OpenFlags::ReadWrite);
        let entry = DirEntry::new(ino, name);
        let mut pending = None;
        while let Some(next) = h.read_dirent(&mut self.fs)? {
            if next.sorts_after(name) {
                h.set_offset(h.offset() - DIRENT_SIZE);
                h.write_dirent(&mut self.fs, &entry)?;
                pending = Some(next);
                break;
            }
        }
        let Some(mut pending) = pending else {
            h.write_dirent(&mut self.fs, &entry)?;
            return self.refresh(dir_ino);
        };
        while let Some(next) = h.read_dirent(&mut self.fs)? {
            h.set_offset(h.offset() - DIRENT_SIZE);
            h.write_dirent(&mut self.fs, &pending)?;
            pending = next;
        }
        h.write_dirent(&mut self.fs, &pending)?;
        self.refresh(dir_ino)
    }

    /// Hand the on-disk inode to every open handle of `ino`.
    fn refresh(&mut self, ino: u16) -> Result<()> {
        let inode = self.fs.read_inode(ino)?;
        for file in self.open_files.iter_mut().flatten() {
            if file.ino() == ino {
                file.reload(inode.clone());
            }
        }
        Ok(())
    }

    /* descriptor tables */

    /// (descriptor, system slot) a new open would take
    fn reserve(&self) -> Result<(Fd, usize)> {
        let slot = self
            .open_files
            .iter()
            .position(Option::is_none)
            .ok_or(Errno::FileTableOverflow)?;
        let fd = self.process()?.free_fd().ok_or(Errno::TooManyOpenFiles)?;
        Ok((fd, slot))
    }

    fn install(&mut self, (fd, slot): (Fd, usize), file: FileDescriptor) -> Result<Fd> {
        self.process_mut()?.bind(fd, slot);
        self.open_files[slot] = Some(file);
        Ok(fd)
    }

    fn slot(&self, fd: Fd) -> Result<usize> {
        self.process()?
            .slot(fd)
            .filter(|&slot| self.open_files.get(slot).is_some_and(Option::is_some))
            .ok_or_else(|| Errno::BadDescriptor.into())
    }

    fn with_file<T>(
        &mut self,
        fd: Fd,
        f: impl FnOnce(&mut FileDescriptor, &mut FileSystem) -> Result<T>,
    ) -> Result<T> {
        let slot = self.slot(fd)?;
        let file = self.open_files[slot]
            .as_mut()
            .ok_or(Errno::BadDescriptor)?;
        f(file, &mut self.fs)
    }

    fn open_handle(&self, ino: u16, inode: Inode, flags: OpenFlags) -> FileDescriptor {
        FileDescriptor::new(&self.fs, ROOTDEV, ino, inode, flags)
    }

    /* system calls */

    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<Fd> {
        let result = self.do_open(path, flags);
        self.record(result)
    }

    fn do_open(&mut self, path: &str, flags: OpenFlags) -> Result<Fd> {
        let (ino, inode) = self.resolve(path)?;
        self.open_ino(ino, inode, flags)
    }

    fn open_ino(&mut self, ino: u16, inode: Inode, flags: OpenFlags) -> Result<Fd> {
        if flags.writable() && self.fs.is_read_only() {
            return Err(Errno::ReadOnlyFs.into());
        }
        let reserved = self.reserve()?;
        log::debug!("open: inode {ino} {flags:?}");
        let file = self.open_handle(ino, inode, flags);
        self.install(reserved, file)
    }

    /// Create `path`, or empty it if it is an existing file, and open it
    /// write-only. Permission bits are masked by the process umask; a mode
    /// without a type makes a regular file.
    pub fn creat(&mut self, path: &str, mode: u16) -> Result<Fd> {
        let result = self.do_creat(path, mode);
        self.record(result)
    }

    fn do_creat(&mut self, path: &str, mode: u16) -> Result<Fd> {
        match self.resolve_parent(path)? {
            None => Err(Errno::IsADirectory.into()),
            Some((parent, name)) => self.do_creat_in(parent, &name, mode),
        }
    }

    fn new_inode(&self, mode: u16, nlink: u16) -> Result<Inode> {
        let process = self.process()?;
        let kind = match mode & S_IFMT {
            0 => S_IFREG,
            kind => kind,
        };
        let mut inode = Inode::new(kind | (mode & S_IPERM & !process.umask), nlink);
        inode.uid = process.uid;
        inode.gid = process.gid;
        Ok(inode)
    }

    fn do_creat_in(&mut self, parent: u16, name: &str, mode: u16) -> Result<Fd> {
        let dir = self.parent_dir(parent)?;
        let reserved = self.reserve()?;
        let file = match self.find_entry(parent, &dir, name)? {
            Some(ino) => {
                let inode = self.fs.read_inode(ino)?;
                if inode.is_dir() {
                    return Err(Errno::IsADirectory.into());
                }
                let mut file = self.open_handle(ino, inode, OpenFlags::WriteOnly);
                file.truncate(&mut self.fs, 0)?;
                self.refresh(ino)?;
                file
            }
            None => {
                self.ensure_room(&dir, 0)?;
                let inode = self.new_inode(mode, 1)?;
                let ino = self.fs.ialloc()?;
                self.fs.write_inode(ino, &inode)?;
                self.insert_entry(parent, name, ino)?;
                log::debug!("creat: {name} -> inode {ino} mode {:o}", inode.mode);
                self.open_handle(ino, inode, OpenFlags::WriteOnly)
            }
        };
        self.install(reserved, file)
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let result = self.do_close(fd);
        self.record(result)
    }

    fn do_close(&mut self, fd: Fd) -> Result<()> {
        let slot = self.slot(fd)?;
        self.process_mut()?.unbind(fd);
        self.open_files[slot] = None;
        Ok(())
    }

    /// Read up to `buf.len()` bytes; 0 at end of file.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let result = self.with_file(fd, |file, fs| {
            if !file.flags().readable() {
                return Err(Errno::BadDescriptor.into());
            }
            file.read(fs, buf)
        });
        self.record(result)
    }

    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let result = self
            .with_file(fd, |file, fs| {
                if !file.flags().writable() {
                    return Err(Errno::BadDescriptor.into());
                }
                Ok((file.ino(), file.write(fs, buf)?))
            })
            .and_then(|(ino, n)| {
                self.refresh(ino)?;
                Ok(n)
            });
        self.record(result)
    }

    /// Copy the next entry into `dirp`: `DIRENT_SIZE` on success, 0 at the end.
    pub fn readdir(&mut self, fd: Fd, dirp: &mut DirEntry) -> Result<usize> {
        let result = self.with_file(fd, |file, fs| {
            if !file.flags().readable() {
                return Err(Errno::BadDescriptor.into());
            }
            Ok(match file.read_dirent(fs)? {
                Some(entry) => {
                    *dirp = entry;
                    DIRENT_SIZE
                }
                None => 0,
            })
        });
        self.record(result)
    }

    /// Store `dirp` at the cursor of a directory open for writing.
    pub fn writedir(&mut self, fd: Fd, dirp: &DirEntry) -> Result<usize> {
        let result = self
            .with_file(fd, |file, fs| {
                if !file.flags().writable() {
                    return Err(Errno::BadDescriptor.into());
                }
                file.write_dirent(fs, dirp)?;
                Ok(file.ino())
            })
            .and_then(|ino| {
                self.refresh(ino)?;
                Ok(DIRENT_SIZE)
            });
        self.record(result)
    }

    pub fn lseek(&mut self, fd: Fd, offset: i64, whence: i32) -> Result<usize> {
        let result = self.with_file(fd, |file, _| {
            let base = match whence {
                SEEK_SET => 0,
                SEEK_CUR => file.offset() as i64,
                SEEK_END => file.size() as i64,
                _ => return Err(Errno::InvalidArgument.into()),
            };
            let to = base
                .checked_add(offset)
                .filter(|&to| to >= 0)
                .ok_or(Errno::InvalidArgument)?;
            file.set_offset(to as usize);
            Ok(to as usize)
        });
        self.record(result)
    }

    pub fn stat(&mut self, path: &str) -> Result<Stat> {
        let result = self
            .resolve(path)
            .map(|(ino, inode)| Stat::new(ROOTDEV, ino, &inode));
        self.record(result)
    }

    pub fn fstat(&mut self, fd: Fd) -> Result<Stat> {
        let result = self.with_file(fd, |file, _| Ok(Stat::from(&*file)));
        self.record(result)
    }

    /// Metadata is written through already; this only flushes the host file.
    pub fn sync(&mut self) -> Result<()> {
        let result = self.fs.sync();
        self.record(result)
    }

    /// Close every descriptor of the current process and end it.
    pub fn exit(&mut self, status: i32) -> Result<i32> {
        let pid = self.current.ok_or(Error::NoProcess)?;
        for fd in self.process()?.open_fds() {
            self.do_close(fd)?;
        }
        self.processes[pid.0] = None;
        self.current = None;
        log::debug!("exit: pid {} status {status}", pid.0);
        Ok(status)
    }

    /// Make a directory holding "." and "..", linked into its parent.
    pub fn mkdir(&mut self, path: &str, mode: u16) -> Result<()> {
        let result = self.resolve_parent(path).and_then(|parent| match parent {
            None => Err(Errno::Exists.into()),
            Some((parent, name)) => self.do_mkdir_in(parent, &name, mode).map(|_| ()),
        });
        self.record(result)
    }

    fn do_mkdir_in(&mut self, parent: u16, name: &str, mode: u16) -> Result<u16> {
        let dir = self.parent_dir(parent)?;
        if self.find_entry(parent, &dir, name)?.is_some() {
            return Err(Errno::Exists.into());
        }
        self.ensure_room(&dir, 1)?;
        let inode = self.new_inode(S_IFDIR | (mode & S_IPERM), 2)?;
        let ino = self.fs.ialloc()?;
        self.fs.write_inode(ino, &inode)?;

        let mut h = self.open_handle(ino, inode, OpenFlags::WriteOnly);
        h.write_dirent(&mut self.fs, &DirEntry::new(ino, "."))?;
        h.write_dirent(&mut self.fs, &DirEntry::new(parent, ".."))?;
        self.insert_entry(parent, name, ino)?;

        let mut dir = self.fs.read_inode(parent)?;
        dir.nlink += 1;
        self.fs.write_inode(parent, &dir)?;
        self.refresh(parent)?;
        log::debug!("mkdir: {name} -> inode {ino} in {parent}");
        Ok(ino)
    }

    pub fn chdir(&mut self, path: &str) -> Result<()> {
        let result = self.do_chdir(path);
        self.record(result)
    }

    fn do_chdir(&mut self, path: &str) -> Result<()> {
        let full = self.full_path(path)?;
        let (_, inode) = self.walk(&path::components(&full))?;
        if !inode.is_dir() {
            return Err(Errno::NotADirectory.into());
        }
        self.process_mut()?.dir = path::normalize(&full);
        Ok(())
    }

    pub fn getcwd(&self) -> Result<String> {
        Ok(self.process()?.dir.clone())
    }

    /// Set the file creation mask, returning the previous one.
    pub fn umask(&mut self, mask: u16) -> Result<u16> {
        let process = self.process_mut()?;
        let old = process.umask;
        process.umask = mask & 0o777;
        Ok(old)
    }

    /* inode-level entry points, for callers that already hold inode numbers */

    pub fn lookup_in(&mut self, parent: u16, name: &str) -> Result<Stat> {
        let result = self.parent_dir(parent).and_then(|dir| {
            let ino = self
                .find_entry(parent, &dir, name)?
                .ok_or(Errno::NoEntry)?;
            Ok(Stat::new(ROOTDEV, ino, &self.fs.read_inode(ino)?))
        });
        self.record(result)
    }

    pub fn stat_inode(&mut self, ino: u16) -> Result<Stat> {
        let result = self.live_inode(ino).map(|inode| Stat::new(ROOTDEV, ino, &inode));
        self.record(result)
    }

    fn live_inode(&mut self, ino: u16) -> Result<Inode> {
        if ino as u32 >= self.fs.super_block().ninodes() {
            return Err(Errno::NoEntry.into());
        }
        let inode = self.fs.read_inode(ino)?;
        if inode.is_free() {
            return Err(Errno::NoEntry.into());
        }
        Ok(inode)
    }

    pub fn open_inode(&mut self, ino: u16, flags: OpenFlags) -> Result<Fd> {
        let result = self
            .live_inode(ino)
            .and_then(|inode| self.open_ino(ino, inode, flags));
        self.record(result)
    }

    pub fn creat_in(&mut self, parent: u16, name: &str, mode: u16) -> Result<Fd> {
        let result = self.do_creat_in(parent, name, mode);
        self.record(result)
    }

    pub fn mkdir_in(&mut self, parent: u16, name: &str, mode: u16) -> Result<Stat> {
        let result = self.do_mkdir_in(parent, name, mode).and_then(|ino| {
            Ok(Stat::new(ROOTDEV, ino, &self.fs.read_inode(ino)?))
        });
        self.record(result)
    }

    /// Set the length of a regular file.
    pub fn truncate_inode(&mut self, ino: u16, len: usize) -> Result<Stat> {
        let result = self.live_inode(ino).and_then(|inode| {
            if inode.is_dir() {
                return Err(Errno::IsADirectory.into());
            }
            let mut h = self.open_handle(ino, inode, OpenFlags::WriteOnly);
            h.truncate(&mut self.fs, len)?;
            self.refresh(ino)?;
            Ok(Stat::from(&h))
        });
        self.record(result)
    }
}
