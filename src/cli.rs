use clap::{Parser, Subcommand};
use simfs::{KernelConfig, VolumeMode};
use std::path::PathBuf;

fn octal(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0o"), 8).map_err(|err| err.to_string())
}

#[derive(Parser)]
#[command(name = "simfs", version, about = "Utilities for a simulated Unix volume")]
pub struct Cli {
    /// Host file holding the volume
    #[arg(long, short = 'f', global = true, env = "SIMFS_VOLUME", default_value = "filesys.dat")]
    pub volume: PathBuf,

    /// `r` or `rw`
    #[arg(long, global = true, env = "SIMFS_MODE", default_value = "rw")]
    pub mode: VolumeMode,

    #[arg(long, global = true, env = "SIMFS_UID", default_value_t = 1)]
    pub uid: u16,

    #[arg(long, global = true, env = "SIMFS_GID", default_value_t = 1)]
    pub gid: u16,

    /// File creation mask, octal
    #[arg(long, global = true, env = "SIMFS_UMASK", default_value = "002", value_parser = octal)]
    pub umask: u16,

    /// Working directory on the volume
    #[arg(long, global = true, env = "SIMFS_DIR", default_value = "/")]
    pub dir: String,

    /// System-wide open file table size
    #[arg(long, global = true, env = "SIMFS_MAX_OPEN_FILES", default_value_t = 20)]
    pub max_open_files: usize,

    /// Per-process descriptor table size
    #[arg(long, global = true, env = "SIMFS_PROCESS_MAX_OPEN_FILES", default_value_t = 10)]
    pub process_max_open_files: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create and format the volume file
    Mkfs {
        /// Bytes per block, a multiple of 64
        block_size: u16,
        /// Total blocks
        blocks: u32,
    },
    /// Make directories
    Mkdir {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// List files and directories
    Ls {
        #[arg(default_value = ".")]
        paths: Vec<String>,
    },
    /// Print files to stdout
    Cat {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Copy one file on the volume to another
    Cp { from: String, to: String },
    /// Copy stdin to a file on the volume and to stdout
    Tee { path: String },
    /// Print every file below a directory
    Find {
        #[arg(default_value = ".")]
        path: String,
    },
    /// Print every non-zero byte of host files, the volume by default
    Dump { files: Vec<PathBuf> },
    /// Serve the volume through FUSE until unmounted
    Mount { mountpoint: PathBuf },
}

impl Cli {
    pub fn config(&self) -> KernelConfig {
        KernelConfig {
            volume: self.volume.clone(),
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            umask: self.umask,
            dir: self.dir.clone(),
            max_open_files: self.max_open_files,
            process_max_open_files: self.process_max_open_files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_fill_the_config() {
        let cli = Cli::parse_from([
            "simfs", "ls", "--umask", "022", "--mode", "r", "-f", "v.dat", "/a",
        ]);
        let config = cli.config();
        assert_eq!(config.umask, 0o022);
        assert_eq!(config.mode, VolumeMode::ReadOnly);
        assert_eq!(config.volume, PathBuf::from("v.dat"));
        assert!(matches!(cli.command, Command::Ls { ref paths } if paths == &["/a"]));
    }

    #[test]
    fn octal_masks() {
        assert_eq!(octal("0o777"), Ok(0o777));
        assert_eq!(octal("002"), Ok(2));
        assert!(octal("9").is_err());
    }
}
