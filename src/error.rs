//! Errors of the simulated kernel.
//!
//! [`Errno`] is the fixed set of conditions a process can recover from; it is
//! what ends up in the per-process last-error field. Everything else in
//! [`Error`] means the volume or the host let us down.

use std::fmt;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Errno {
    NotOwner,
    NoEntry,
    BadDescriptor,
    PermissionDenied,
    Exists,
    NotADirectory,
    IsADirectory,
    InvalidArgument,
    /// system-wide open file table is full
    FileTableOverflow,
    /// per-process descriptor table is full
    TooManyOpenFiles,
    FileTooLarge,
    /// no free data block
    NoSpace,
    /// no free inode
    NoInodes,
    ReadOnlyFs,
}

impl Errno {
    /// the host errno value this condition corresponds to
    pub fn code(self) -> i32 {
        match self {
            Errno::NotOwner => libc::EPERM,
            Errno::NoEntry => libc::ENOENT,
            Errno::BadDescriptor => libc::EBADF,
            Errno::PermissionDenied => libc::EACCES,
            Errno::Exists => libc::EEXIST,
            Errno::NotADirectory => libc::ENOTDIR,
            Errno::IsADirectory => libc::EISDIR,
            Errno::InvalidArgument => libc::EINVAL,
            Errno::FileTableOverflow => libc::ENFILE,
            Errno::TooManyOpenFiles => libc::EMFILE,
            Errno::FileTooLarge => libc::EFBIG,
            Errno::NoSpace | Errno::NoInodes => libc::ENOSPC,
            Errno::ReadOnlyFs => libc::EROFS,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Errno::NotOwner => "Not owner",
            Errno::NoEntry => "No such file or directory",
            Errno::BadDescriptor => "Bad file number",
            Errno::PermissionDenied => "Permission denied",
            Errno::Exists => "File exists",
            Errno::NotADirectory => "Not a directory",
            Errno::IsADirectory => "Is a directory",
            Errno::InvalidArgument => "Invalid argument",
            Errno::FileTableOverflow => "File table overflow",
            Errno::TooManyOpenFiles => "Too many open files",
            Errno::FileTooLarge => "File too large",
            Errno::NoSpace => "No space left on device",
            Errno::NoInodes => "No free inodes left on device",
            Errno::ReadOnlyFs => "Read-only file system",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug)]
pub enum Error {
    /// recoverable, recorded as the process errno
    Errno(Errno),
    /// the backing store failed
    Io(io::Error),
    /// a record could not be encoded or decoded
    Codec(bincode::Error),
    /// the volume violates its own layout
    Corrupt(&'static str),
    /// a call that needs a current process was made without one
    NoProcess,
}

impl Error {
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Errno(errno) => Some(*errno),
            _ => None,
        }
    }

    /// true for everything a process cannot be expected to recover from
    pub fn is_fatal(&self) -> bool {
        self.errno().is_none()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Errno(errno) => write!(f, "{errno}"),
            Error::Io(err) => write!(f, "volume i/o error: {err}"),
            Error::Codec(err) => write!(f, "bad on-disk record: {err}"),
            Error::Corrupt(what) => write!(f, "corrupt volume: {what}"),
            Error::NoProcess => f.write_str("no current process"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Codec(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::Errno(errno)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Codec(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_and_inode_exhaustion_are_distinct() {
        assert_ne!(Errno::NoSpace, Errno::NoInodes);
        assert_eq!(Errno::NoSpace.code(), Errno::NoInodes.code());
        assert_ne!(Errno::NoSpace.message(), Errno::NoInodes.message());
    }

    #[test]
    fn process_and_system_table_overflow_are_distinct() {
        assert_eq!(Errno::TooManyOpenFiles.code(), libc::EMFILE);
        assert_eq!(Errno::FileTableOverflow.code(), libc::ENFILE);
    }

    #[test]
    fn only_errno_is_recoverable() {
        assert!(!Error::from(Errno::NoEntry).is_fatal());
        assert!(Error::Corrupt("bad superblock").is_fatal());
        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        assert!(Error::from(io).is_fatal());
    }
}
