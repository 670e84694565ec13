mod common;

use common::{kernel, kernel_with, read_file, write_file};
use simfs::{Errno, Error, KernelConfig, OpenFlags, NDIRECT, SEEK_SET};

#[test]
fn file_stops_at_ten_blocks() {
    let (_, mut k) = kernel(512, 64);
    let max = NDIRECT * 512;
    let fd = k.creat("/big", 0o644).unwrap();
    assert_eq!(k.write(fd, &vec![1u8; max + 100]).unwrap(), max);
    assert!(matches!(
        k.write(fd, b"more"),
        Err(Error::Errno(Errno::FileTooLarge))
    ));
    assert_eq!(k.errno(), Some(Errno::FileTooLarge));
    let st = k.fstat(fd).unwrap();
    assert_eq!((st.size as usize, st.blocks as usize), (max, NDIRECT));
}

#[test]
fn holes_read_as_zeros_and_take_no_blocks() {
    let (_, mut k) = kernel(512, 64);
    let free = k.fs_mut().free_blocks().unwrap();
    let fd = k.creat("/sparse", 0o644).unwrap();
    k.lseek(fd, 3 * 512 + 5, SEEK_SET).unwrap();
    k.write(fd, b"!").unwrap();
    k.close(fd).unwrap();

    let st = k.stat("/sparse").unwrap();
    assert_eq!((st.size, st.blocks), (3 * 512 + 6, 1));
    assert_eq!(k.fs_mut().free_blocks().unwrap(), free - 1);

    let data = read_file(&mut k, "/sparse");
    assert!(data[..3 * 512 + 5].iter().all(|&b| b == 0));
    assert_eq!(data[3 * 512 + 5], b'!');
}

#[test]
fn running_out_of_blocks() {
    // 55 data blocks, one taken by the root directory
    let (_, mut k) = kernel(512, 64);
    let full = vec![7u8; NDIRECT * 512];
    for i in 0..5 {
        write_file(&mut k, &format!("/f{i}"), &full);
    }
    let fd = k.creat("/last", 0o644).unwrap();
    assert_eq!(k.write(fd, &full).unwrap(), 4 * 512);
    assert!(matches!(k.write(fd, b"x"), Err(Error::Errno(Errno::NoSpace))));
    assert_eq!(k.errno(), Some(Errno::NoSpace));
    assert_eq!(k.fs_mut().free_blocks().unwrap(), 0);
    k.close(fd).unwrap();

    // emptying a file gives its blocks back
    let fd = k.creat("/f0", 0o644).unwrap();
    k.close(fd).unwrap();
    assert_eq!(k.fs_mut().free_blocks().unwrap(), NDIRECT as u32);
    write_file(&mut k, "/f0", b"again");
    assert_eq!(read_file(&mut k, "/f0"), b"again");
}

#[test]
fn running_out_of_inodes() {
    let (_, mut k) = kernel(512, 64);
    let ninodes = k.fs().super_block().ninodes();
    for i in 1..ninodes {
        let fd = k.creat(&format!("/i{i}"), 0o644).unwrap();
        k.close(fd).unwrap();
    }
    let blocks = k.fs_mut().free_blocks().unwrap();
    assert!(matches!(
        k.creat("/one_more", 0o644),
        Err(Error::Errno(Errno::NoInodes))
    ));
    assert_eq!(k.errno(), Some(Errno::NoInodes));
    assert_ne!(Errno::NoInodes, Errno::NoSpace);
    assert_eq!(k.fs_mut().free_blocks().unwrap(), blocks);
    assert!(k.stat("/one_more").is_err());
}

#[test]
fn block_allocator_wraps_around() {
    let (_, mut k) = kernel(512, 64);
    let fs = k.fs_mut();
    let mut got = Vec::new();
    while let Ok(bno) = fs.balloc() {
        got.push(bno);
    }
    // the root directory owns data block 0
    assert_eq!(got, (1..55).collect::<Vec<_>>());
    for bno in 0..55 {
        assert!(fs.is_block_allocated(bno).unwrap(), "block {bno}");
    }
    fs.bfree(3).unwrap();
    fs.bfree(40).unwrap();
    assert!(!fs.is_block_allocated(3).unwrap());
    assert!(!fs.is_block_allocated(40).unwrap());
    assert!(fs.is_block_allocated(4).unwrap());
    assert_eq!(fs.balloc().unwrap(), 3);
    assert_eq!(fs.balloc().unwrap(), 40);
    assert!(matches!(fs.balloc(), Err(Error::Errno(Errno::NoSpace))));
}

#[test]
fn process_table_fills_before_system_table() {
    let config = KernelConfig {
        max_open_files: 5,
        process_max_open_files: 3,
        ..Default::default()
    };
    let (_, mut k) = kernel_with(512, 64, &config);
    write_file(&mut k, "/f", b"x");
    let first = k.current_pid().unwrap();
    for _ in 0..3 {
        k.open("/f", OpenFlags::ReadOnly).unwrap();
    }
    assert!(matches!(
        k.open("/f", OpenFlags::ReadOnly),
        Err(Error::Errno(Errno::TooManyOpenFiles))
    ));
    assert_eq!(k.errno(), Some(Errno::TooManyOpenFiles));

    let second = k.spawn(2, 2, "/", 0o022);
    k.switch_to(second).unwrap();
    k.open("/f", OpenFlags::ReadOnly).unwrap();
    k.open("/f", OpenFlags::ReadOnly).unwrap();
    assert!(matches!(
        k.open("/f", OpenFlags::ReadOnly),
        Err(Error::Errno(Errno::FileTableOverflow))
    ));
    assert_eq!(k.errno(), Some(Errno::FileTableOverflow));

    // a full table must not leave a half-made file behind
    assert!(k.creat("/g", 0o644).is_err());
    assert!(matches!(k.stat("/g"), Err(Error::Errno(Errno::NoEntry))));

    // ending a process frees its system slots
    k.switch_to(first).unwrap();
    k.exit(0).unwrap();
    k.switch_to(second).unwrap();
    let fd = k.creat("/g", 0o644).unwrap();
    assert_eq!(k.fstat(fd).unwrap().uid, 2);
}

#[test]
fn closed_descriptor_is_bad() {
    let (_, mut k) = kernel(512, 64);
    let fd = k.creat("/f", 0o644).unwrap();
    k.close(fd).unwrap();
    assert!(matches!(k.close(fd), Err(Error::Errno(Errno::BadDescriptor))));
    assert!(matches!(k.fstat(fd), Err(Error::Errno(Errno::BadDescriptor))));
    assert!(matches!(
        k.lseek(99, 0, SEEK_SET),
        Err(Error::Errno(Errno::BadDescriptor))
    ));
}
