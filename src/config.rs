use super::*;
use block_device::{BlockDevice, BlockFile};

use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl FromStr for VolumeMode {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, String> {
        match s {
            "rw" => Ok(VolumeMode::ReadWrite),
            "r" | "ro" => Ok(VolumeMode::ReadOnly),
            _ => Err(format!("volume mode must be `r` or `rw`, not `{s}`")),
        }
    }
}

impl fmt::Display for VolumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VolumeMode::ReadWrite => "rw",
            VolumeMode::ReadOnly => "r",
        })
    }
}

/// Everything needed to boot a kernel on a host volume file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// host file holding the volume
    pub volume: PathBuf,
    pub mode: VolumeMode,
    /// credentials of the first process
    pub uid: u16,
    pub gid: u16,
    pub umask: u16,
    /// starting working directory of the first process
    pub dir: String,
    /// size of the system-wide open file table
    pub max_open_files: usize,
    /// size of each process's descriptor table
    pub process_max_open_files: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            volume: PathBuf::from("filesys.dat"),
            mode: VolumeMode::ReadWrite,
            uid: 1,
            gid: 1,
            umask: 0o002,
            dir: "/".to_string(),
            max_open_files: 20,
            process_max_open_files: 10,
        }
    }
}

impl KernelConfig {
    /// Open the host file for `mode`. A missing file is an error: volumes are
    /// only created by the formatter.
    pub fn open_volume(&self) -> Result<Arc<dyn BlockDevice>> {
        let read_only = self.mode == VolumeMode::ReadOnly;
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&self.volume)?;
        Ok(Arc::new(BlockFile::new(file, read_only)))
    }
}
