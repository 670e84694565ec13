//! A small Unix file system simulated on one volume: a host file or an
//! in-memory disk cut into fixed-size blocks.
//!
//! Layers, bottom up: [`BlockDevice`] moves whole blocks; [`FileSystem`]
//! allocates blocks and inodes; [`FileDescriptor`] maps byte offsets of one
//! file onto its blocks; [`Kernel`] is the system call interface with path
//! names, descriptors and processes. [`format`] writes an empty volume.

mod bitmap; // free data block map
mod block_cache; // one resident block
mod block_device; // whole-block I/O
mod common;
mod config;
mod dirent; // directory records
mod disk; // superblock and layout
mod error;
mod file; // open file handles
mod fs; // file system
mod inode;
mod kernel; // system calls
mod mkfs;
mod process;
mod stat;

pub mod fuse;
pub mod logger;
pub mod path;

pub use block_device::{BlockDevice, BlockFile, MemDisk};
pub use common::*;
pub use config::{KernelConfig, VolumeMode};
pub use dirent::DirEntry;
pub use disk::SuperBlock;
pub use error::{Errno, Error, Result};
pub use file::{FileDescriptor, OpenFlags};
pub use fs::FileSystem;
pub use inode::{BlockId, FileKind, Inode};
pub use kernel::{Fd, Kernel};
pub use mkfs::{format, Geometry};
pub use process::{Pid, ProcessContext};
pub use stat::Stat;
