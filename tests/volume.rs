mod common;

use std::fs::{self, OpenOptions};
use std::sync::Arc;

use common::{list, read_file, temp_volume, write_file};
use simfs::{
    format, BlockDevice, BlockFile, Errno, Error, FileSystem, Kernel, KernelConfig, MemDisk,
    OpenFlags, VolumeMode,
};

fn make_volume(name: &str, block_size: u16, blocks: u32) -> KernelConfig {
    simfs::logger::init_for_tests();
    let path = temp_volume(name);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    format(&BlockFile::new(file, false), block_size, blocks).unwrap();
    KernelConfig {
        volume: path,
        ..Default::default()
    }
}

#[test]
fn host_file_survives_a_reboot() {
    let config = make_volume("reboot", 256, 100);
    assert_eq!(fs::metadata(&config.volume).unwrap().len(), 256 * 100);
    {
        let mut k = Kernel::boot(&config).unwrap();
        k.mkdir("/etc", 0o755).unwrap();
        write_file(&mut k, "/etc/motd", b"hello from the volume");
        k.sync().unwrap();
        k.exit(0).unwrap();
    }
    let mut k = Kernel::boot(&config).unwrap();
    assert_eq!(list(&mut k, "/etc"), vec![".", "..", "motd"]);
    assert_eq!(read_file(&mut k, "/etc/motd"), b"hello from the volume");
    let st = k.stat("/etc/motd").unwrap();
    assert_eq!(st.mode & simfs::S_IFMT, simfs::S_IFREG);
    assert_eq!(st.mode & 0o777, 0o644 & !0o002);
    fs::remove_file(&config.volume).unwrap();
}

#[test]
fn read_only_volume_refuses_changes() {
    let mut config = make_volume("read-only", 512, 64);
    {
        let mut k = Kernel::boot(&config).unwrap();
        write_file(&mut k, "/keep", b"kept");
    }
    let before = fs::read(&config.volume).unwrap();

    config.mode = VolumeMode::ReadOnly;
    let mut k = Kernel::boot(&config).unwrap();
    assert!(k.fs().is_read_only());
    assert_eq!(read_file(&mut k, "/keep"), b"kept");
    assert!(matches!(
        k.creat("/new", 0o644),
        Err(Error::Errno(Errno::ReadOnlyFs))
    ));
    assert_eq!(k.errno(), Some(Errno::ReadOnlyFs));
    assert!(matches!(
        k.creat("/keep", 0o644),
        Err(Error::Errno(Errno::ReadOnlyFs))
    ));
    assert!(matches!(
        k.open("/keep", OpenFlags::ReadWrite),
        Err(Error::Errno(Errno::ReadOnlyFs))
    ));
    assert!(k.mkdir("/d", 0o755).is_err());
    drop(k);

    assert_eq!(fs::read(&config.volume).unwrap(), before);
    fs::remove_file(&config.volume).unwrap();
}

#[test]
fn unformatted_volume_does_not_mount() {
    let disk = Arc::new(MemDisk::new());
    disk.write_block(0, &[0u8; 512]).unwrap();
    assert!(matches!(
        Kernel::new(disk, &KernelConfig::default()),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn truncated_host_file_is_an_io_error() {
    let config = make_volume("short", 512, 64);
    // keep the superblock, the bitmap and the first inode block only
    let file = OpenOptions::new().write(true).open(&config.volume).unwrap();
    file.set_len(512 * 3).unwrap();
    drop(file);

    let mut k = Kernel::boot(&config).unwrap();
    let err = k.mkdir("/d", 0o755).unwrap_err();
    assert!(err.is_fatal(), "{err}");
    assert!(matches!(err, Error::Io(_)));
    // only recoverable failures become the process errno
    assert_eq!(k.errno(), None);
    fs::remove_file(&config.volume).unwrap();
}

#[test]
fn mount_from_a_shared_device() {
    let disk: Arc<dyn BlockDevice> = Arc::new(MemDisk::new());
    format(disk.as_ref(), 1024, 128).unwrap();
    let fs = FileSystem::open(disk.clone()).unwrap();
    assert_eq!(fs.block_size(), 1024);
    assert_eq!(fs.super_block().blocks, 128);
    let k = Kernel::new(disk, &KernelConfig::default()).unwrap();
    assert_eq!(k.getcwd().unwrap(), "/");
}
