use super::*;

/// index of a process in the kernel's process arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub usize);

/// The per-process half of the kernel state.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub uid: u16,
    pub gid: u16,
    /// absolute, always starts with '/'
    pub dir: String,
    pub umask: u16,
    /// last failure of a kernel call, cleared by nothing
    pub errno: Option<Errno>,
    /// descriptor -> slot of the system-wide open file table
    fds: Vec<Option<usize>>,
}

impl ProcessContext {
    pub fn new(uid: u16, gid: u16, dir: &str, umask: u16, max_open_files: usize) -> Self {
        Self {
            uid,
            gid,
            dir: dir.to_string(),
            umask,
            errno: None,
            fds: vec![None; max_open_files],
        }
    }

    /// lowest free descriptor
    pub fn free_fd(&self) -> Option<usize> {
        self.fds.iter().position(Option::is_none)
    }

    /// system table slot behind `fd`
    pub fn slot(&self, fd: usize) -> Option<usize> {
        self.fds.get(fd).copied().flatten()
    }

    pub fn bind(&mut self, fd: usize, slot: usize) {
        self.fds[fd] = Some(slot);
    }

    pub fn unbind(&mut self, fd: usize) -> Option<usize> {
        self.fds.get_mut(fd).and_then(Option::take)
    }

    /// every descriptor in use, lowest first
    pub fn open_fds(&self) -> Vec<usize> {
        self.fds
            .iter()
            .enumerate()
            .filter_map(|(fd, slot)| slot.map(|_| fd))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_are_reused_lowest_first() {
        let mut p = ProcessContext::new(1, 1, "/", 0o002, 3);
        assert_eq!(p.free_fd(), Some(0));
        p.bind(0, 7);
        p.bind(1, 2);
        assert_eq!(p.free_fd(), Some(2));
        assert_eq!(p.unbind(0), Some(7));
        assert_eq!(p.free_fd(), Some(0));
        assert_eq!(p.slot(1), Some(2));
        assert_eq!(p.slot(9), None);
        assert_eq!(p.open_fds(), vec![1]);
    }

    #[test]
    fn full_table_has_no_free_descriptor() {
        let mut p = ProcessContext::new(1, 1, "/", 0, 2);
        p.bind(0, 0);
        p.bind(1, 1);
        assert_eq!(p.free_fd(), None);
    }
}
