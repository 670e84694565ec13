//! Common utilities for tests

#![allow(unused)]

use std::path::PathBuf;
use std::sync::Arc;

use simfs::{format, DirEntry, Kernel, KernelConfig, MemDisk, OpenFlags};

/// A freshly formatted in-memory volume with a kernel booted on it.
pub fn kernel(block_size: u16, blocks: u32) -> (Arc<MemDisk>, Kernel) {
    kernel_with(block_size, blocks, &KernelConfig::default())
}

pub fn kernel_with(block_size: u16, blocks: u32, config: &KernelConfig) -> (Arc<MemDisk>, Kernel) {
    simfs::logger::init_for_tests();
    let disk = Arc::new(MemDisk::new());
    format(disk.as_ref(), block_size, blocks).unwrap();
    let kernel = Kernel::new(disk.clone(), config).unwrap();
    (disk, kernel)
}

/// names in directory order
pub fn list(k: &mut Kernel, path: &str) -> Vec<String> {
    let fd = k.open(path, OpenFlags::ReadOnly).unwrap();
    let mut entry = DirEntry::default();
    let mut names = Vec::new();
    while k.readdir(fd, &mut entry).unwrap() > 0 {
        names.push(entry.name());
    }
    k.close(fd).unwrap();
    names
}

pub fn write_file(k: &mut Kernel, path: &str, data: &[u8]) {
    let fd = k.creat(path, 0o644).unwrap();
    assert_eq!(k.write(fd, data).unwrap(), data.len());
    k.close(fd).unwrap();
}

pub fn read_file(k: &mut Kernel, path: &str) -> Vec<u8> {
    let fd = k.open(path, OpenFlags::ReadOnly).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 100];
    loop {
        let n = k.read(fd, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    k.close(fd).unwrap();
    out
}

/// a host path no other test uses
pub fn temp_volume(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("simfs-{}-{name}.dat", std::process::id()))
}
