use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

/// A flat store addressed in blocks.
///
/// The block size is not known to the device: it is `buf.len()`, so block
/// `n` lives at byte `n * buf.len()`. Block 0 can therefore be read with a
/// short buffer before the real block size is known.
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()>;
    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()>;

    /// push anything buffered on the host side down to the store
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        false
    }
}

/// A volume kept in a host file.
pub struct BlockFile {
    file: Mutex<File>,
    read_only: bool,
}

impl BlockFile {
    pub fn new(file: File, read_only: bool) -> Self {
        Self {
            file: Mutex::new(file),
            read_only,
        }
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "volume lock poisoned"))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()> {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start((blockno * buf.len()) as u64))?;
        file.read_exact(buf)
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "volume opened read-only",
            ));
        }
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start((blockno * buf.len()) as u64))?;
        file.write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
        let mut file = self.lock()?;
        file.flush()?;
        if !self.read_only {
            file.sync_data()?;
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// A volume in memory, grown on demand like a sparse host file.
#[derive(Default)]
pub struct MemDisk {
    bytes: Mutex<Vec<u8>>,
}

impl MemDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// a copy of everything written so far
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().map(|b| b.clone()).unwrap_or_default()
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Vec<u8>>> {
        self.bytes
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "volume lock poisoned"))
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()> {
        let bytes = self.lock()?;
        let start = blockno * buf.len();
        match bytes.get(start..start + buf.len()) {
            Some(src) => {
                buf.copy_from_slice(src);
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("block {blockno} is past the end of the volume"),
            )),
        }
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()> {
        let mut bytes = self.lock()?;
        let start = blockno * buf.len();
        if bytes.len() < start + buf.len() {
            bytes.resize(start + buf.len(), 0);
        }
        bytes[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_disk_grows_and_reads_back() {
        let disk = MemDisk::new();
        disk.write_block(3, &[7u8; 64]).unwrap();
        assert_eq!(disk.snapshot().len(), 256);

        let mut buf = [1u8; 64];
        disk.read_block(1, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 64]);
        disk.read_block(3, &mut buf).unwrap();
        assert_eq!(buf, [7u8; 64]);
    }

    #[test]
    fn mem_disk_read_past_end_fails() {
        let disk = MemDisk::new();
        let mut buf = [0u8; 64];
        let err = disk.read_block(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
