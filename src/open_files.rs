//! The open-file registry: a set of currently-open path strings bounded by `N_OPEN`, enforcing
//! the open-count cap and "one open instance per path".

use std::collections::HashSet;

use crate::errno::{self, Result};
use crate::layout::N_OPEN;

/// In-memory-only registry of currently-open paths.
#[derive(Default)]
pub struct OpenFiles {
    paths: HashSet<String>,
}

impl OpenFiles {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `path`. Fails with `EMFILE` when the registry is at capacity, and `EPERM` when the
    /// path is already open (this spec treats per-process open state as global, since there is
    /// only ever one mount).
    pub fn open(&mut self, path: &str) -> Result<()> {
        if self.paths.contains(path) {
            return Err(errno::EPERM);
        }
        if self.paths.len() >= N_OPEN {
            return Err(errno::EMFILE);
        }
        self.paths.insert(path.to_string());
        Ok(())
    }

    /// Closes `path`. A no-op if it was not open.
    pub fn release(&mut self, path: &str) {
        self.paths.remove(path);
    }

    /// Returns the number of currently open paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_release_roundtrip() {
        let mut reg = OpenFiles::new();
        reg.open("/a").unwrap();
        assert_eq!(reg.len(), 1);
        reg.release("/a");
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn double_open_is_in_use() {
        let mut reg = OpenFiles::new();
        reg.open("/a").unwrap();
        assert_eq!(reg.open("/a").unwrap_err(), errno::EPERM);
    }

    #[test]
    fn exceeding_capacity_is_emfile() {
        let mut reg = OpenFiles::new();
        for i in 0..N_OPEN {
            reg.open(&format!("/f{i}")).unwrap();
        }
        assert_eq!(reg.open("/overflow").unwrap_err(), errno::EMFILE);
    }

    #[test]
    fn release_then_reopen_is_not_in_use() {
        let mut reg = OpenFiles::new();
        reg.open("/a").unwrap();
        reg.release("/a");
        assert!(reg.open("/a").is_ok());
    }
}
