use super::*;
use common::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One record of a directory file. The name is null padded and is not
/// terminated when it uses all `DIRSIZ` bytes.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirEntry {
    /// inode num
    pub ino: u16,
    name: [u8; DIRSIZ],
}

impl DirEntry {
    /// Names longer than `DIRSIZ` bytes are cut, the same way they are when looked up.
    pub fn new(ino: u16, name: &str) -> Self {
        Self {
            ino,
            name: Self::pack(name),
        }
    }

    fn pack(name: &str) -> [u8; DIRSIZ] {
        let mut packed = [0u8; DIRSIZ];
        let bytes = name.as_bytes();
        let n = bytes.len().min(DIRSIZ);
        packed[..n].copy_from_slice(&bytes[..n]);
        packed
    }

    pub fn name(&self) -> String {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(DIRSIZ);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name == Self::pack(name)
    }

    /// true if this entry must come after one called `name`
    pub fn sorts_after(&self, name: &str) -> bool {
        self.name > Self::pack(name)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        use bincode::Options;
        let rec = buf
            .get(..DIRENT_SIZE)
            .ok_or(Error::Errno(Errno::InvalidArgument))?;
        Ok(codec().deserialize(rec)?)
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        use bincode::Options;
        let rec = buf
            .get_mut(..DIRENT_SIZE)
            .ok_or(Error::Errno(Errno::InvalidArgument))?;
        codec().serialize_into(rec, self)?;
        Ok(())
    }
}

impl fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirEntry[{},{}]", self.ino, self.name())
    }
}
