mod cli;

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use simfs::{
    fuse, logger, BlockDevice, BlockFile, DirEntry, Fd, Kernel, KernelConfig, OpenFlags, Result,
    Stat, VolumeMode, S_IFDIR, S_IFMT, S_IFREG,
};

const BUF_SIZE: usize = 4096;
const OUTPUT_MODE: u16 = 0o700;
const DIR_MODE: u16 = 0o755;

fn main() -> ExitCode {
    logger::init();
    let cli = Cli::parse();
    let config = cli.config();
    let status = match &cli.command {
        Command::Mkfs { block_size, blocks } => mkfs(&config, *block_size, *blocks),
        Command::Dump { files } => {
            let files = if files.is_empty() {
                vec![config.volume.clone()]
            } else {
                files.clone()
            };
            dump(&files)
        }
        Command::Mount { mountpoint } => Kernel::boot(&mount_config(&config))
            .and_then(|kernel| {
                fuse::mount(kernel, mountpoint, config.mode == VolumeMode::ReadOnly)?;
                Ok(0)
            }),
        command => Kernel::boot(&config).and_then(|mut k| {
            let status = run(&mut k, command)?;
            k.exit(status)
        }),
    };
    match status {
        Ok(status) => ExitCode::from(status as u8),
        Err(err) => {
            log::error!("{err}");
            eprintln!("simfs: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Files made through the mount belong to whoever mounted it.
fn mount_config(config: &KernelConfig) -> KernelConfig {
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    KernelConfig {
        uid: host_id(uid, config.uid),
        gid: host_id(gid, config.gid),
        ..config.clone()
    }
}

/// Host ids that do not fit the on-disk 16 bits fall back to `configured`.
fn host_id(id: u32, configured: u16) -> u16 {
    u16::try_from(id).unwrap_or_else(|_| {
        log::warn!("mount: host id {id} does not fit 16 bits, using {configured}");
        configured
    })
}

fn run(k: &mut Kernel, command: &Command) -> Result<i32> {
    match command {
        Command::Mkdir { paths } => mkdir(k, paths),
        Command::Ls { paths } => ls(k, paths),
        Command::Cat { paths } => cat(k, paths),
        Command::Cp { from, to } => cp(k, from, to),
        Command::Tee { path } => tee(k, path),
        Command::Find { path } => {
            let mut out = io::stdout().lock();
            find(k, path, &mut out)
        }
        Command::Mkfs { .. } | Command::Dump { .. } | Command::Mount { .. } => Ok(0),
    }
}

fn mkfs(config: &KernelConfig, block_size: u16, blocks: u32) -> Result<i32> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&config.volume)?;
    let blk_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(file, false));
    let sb = simfs::format(blk_dev.as_ref(), block_size, blocks)?;
    println!("block_size: {}", sb.block_size);
    println!("blocks: {}", sb.blocks);
    println!("super_blocks: 1");
    println!("free_list_blocks: {}", sb.nbitmap());
    println!("inode_blocks: {}", sb.ninode_blocks());
    println!("data_blocks: {}", sb.ndata());
    println!("free list block offset: {}", sb.bitmap_start);
    println!("inode block offset: {}", sb.inode_start);
    println!("data block offset: {}", sb.data_start);
    Ok(0)
}

fn mkdir(k: &mut Kernel, paths: &[String]) -> Result<i32> {
    for path in paths {
        if k.mkdir(path, DIR_MODE).is_err() {
            k.perror("mkdir");
            eprintln!("mkdir: \"{path}\"");
            return Ok(2);
        }
    }
    Ok(0)
}

fn print_entry(name: &str, st: &Stat) {
    println!(
        " {}{}{}  {}  {} {:>5} {:>10} {}",
        (st.mode >> 6) & 0o7,
        (st.mode >> 3) & 0o7,
        st.mode & 0o7,
        st.uid,
        st.gid,
        st.ino,
        st.size,
        name
    );
}

fn ls(k: &mut Kernel, paths: &[String]) -> Result<i32> {
    for path in paths {
        let Ok(st) = k.stat(path) else {
            k.perror("ls");
            return Ok(1);
        };
        if st.mode & S_IFMT != S_IFDIR {
            print_entry(path, &st);
            continue;
        }
        let Ok(fd) = k.open(path, OpenFlags::ReadOnly) else {
            k.perror("ls");
            eprintln!("ls: unable to open \"{path}\" for reading");
            return Ok(1);
        };
        println!();
        println!("{path}:");
        let mut entry = DirEntry::default();
        let mut count = 0;
        while k.readdir(fd, &mut entry)? > 0 {
            let name = entry.name();
            let Ok(st) = k.stat(&simfs::path::join(path, &name)) else {
                k.perror("ls");
                return Ok(1);
            };
            print_entry(&name, &st);
            count += 1;
        }
        k.close(fd)?;
        println!("total files: {count}");
    }
    Ok(0)
}

fn cat(k: &mut Kernel, paths: &[String]) -> Result<i32> {
    let mut out = io::stdout().lock();
    let mut buf = [0u8; BUF_SIZE];
    for path in paths {
        let Ok(fd) = k.open(path, OpenFlags::ReadOnly) else {
            k.perror("cat");
            eprintln!("cat: unable to open input file \"{path}\"");
            return Ok(2);
        };
        loop {
            match k.read(fd, &mut buf) {
                Ok(0) => break,
                Ok(n) => out.write_all(&buf[..n])?,
                Err(_) => {
                    k.perror("cat");
                    eprintln!("cat: error during read from input file \"{path}\"");
                    return Ok(3);
                }
            }
        }
        k.close(fd)?;
    }
    out.flush()?;
    Ok(0)
}

/// `write` until all of `buf` is in or a call fails
fn write_all(k: &mut Kernel, fd: Fd, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = k.write(fd, buf)?;
        buf = &buf[n..];
    }
    Ok(())
}

fn cp(k: &mut Kernel, from: &str, to: &str) -> Result<i32> {
    let Ok(in_fd) = k.open(from, OpenFlags::ReadOnly) else {
        k.perror("cp");
        eprintln!("cp: unable to open input file \"{from}\"");
        return Ok(2);
    };
    let Ok(out_fd) = k.creat(to, OUTPUT_MODE) else {
        k.perror("cp");
        eprintln!("cp: unable to open output file \"{to}\"");
        return Ok(3);
    };
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = match k.read(in_fd, &mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => {
                k.perror("cp");
                eprintln!("cp: error during read from input file");
                return Ok(5);
            }
        };
        if write_all(k, out_fd, &buf[..n]).is_err() {
            k.perror("cp");
            eprintln!("cp: error during write to output file");
            return Ok(4);
        }
    }
    k.close(in_fd)?;
    k.close(out_fd)?;
    Ok(0)
}

fn tee(k: &mut Kernel, path: &str) -> Result<i32> {
    let Ok(fd) = k.creat(path, OUTPUT_MODE) else {
        k.perror("tee");
        eprintln!("tee: unable to open output file \"{path}\"");
        return Ok(2);
    };
    let mut stdin = io::stdin().lock();
    let mut out = io::stdout().lock();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = stdin.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if write_all(k, fd, &buf[..n]).is_err() {
            k.perror("tee");
            eprintln!("tee: error during write to output file");
            return Ok(3);
        }
        out.write_all(&buf[..n])?;
    }
    k.close(fd)?;
    out.flush()?;
    Ok(0)
}

fn find(k: &mut Kernel, path: &str, out: &mut impl Write) -> Result<i32> {
    let Ok(st) = k.stat(path) else {
        k.perror("find");
        return Ok(1);
    };
    match st.mode & S_IFMT {
        S_IFREG => writeln!(out, "{path}")?,
        S_IFDIR => {
            let Ok(fd) = k.open(path, OpenFlags::ReadOnly) else {
                k.perror("find");
                eprintln!("find: unable to open \"{path}\" for reading");
                return Ok(1);
            };
            // read the whole directory first: recursion opens more descriptors
            let mut names = Vec::new();
            let mut entry = DirEntry::default();
            while k.readdir(fd, &mut entry)? > 0 {
                names.push(entry.name());
            }
            k.close(fd)?;
            writeln!(out)?;
            writeln!(out, "{path}:")?;
            for name in names.iter().filter(|n| *n != "." && *n != "..") {
                let status = find(k, &simfs::path::join(path, name), out)?;
                if status != 0 {
                    return Ok(status);
                }
            }
        }
        _ => {}
    }
    Ok(0)
}

fn dump(files: &[std::path::PathBuf]) -> Result<i32> {
    let mut out = io::stdout().lock();
    for name in files {
        let file = match File::open(name) {
            Ok(file) => file,
            Err(_) => {
                writeln!(out, "error: unable to open input file {}", name.display())?;
                continue;
            }
        };
        for (i, byte) in BufReader::new(file).bytes().enumerate() {
            let Ok(c) = byte else {
                writeln!(out, "error: unable to read from file {}", name.display())?;
                break;
            };
            if c == 0 {
                continue;
            }
            write!(out, "{i} {c:x} {c}")?;
            if c.is_ascii_graphic() || c == b' ' {
                write!(out, " {}", c as char)?;
            }
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_ids_that_do_not_fit_fall_back() {
        assert_eq!(host_id(1000, 1), 1000);
        assert_eq!(host_id(65_535, 1), 65_535);
        assert_eq!(host_id(65_536, 7), 7);
        assert_eq!(host_id(u32::MAX, 7), 7);
    }
}
