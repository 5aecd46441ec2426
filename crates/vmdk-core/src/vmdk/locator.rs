//! Resolves extent filenames relative to a directory.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Whether a file should be opened for shared or exclusive access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Share {
    /// Other readers may open the file concurrently.
    Read,
    /// No other handle may hold the file open.
    Exclusive,
}

/// Resolves extent filenames against a root directory.
///
/// `Share` is advisory on platforms without mandatory locking; this crate
/// does not itself take out an OS-level lock, matching the teacher's
/// straightforward `File::open`/`OpenOptions` usage elsewhere.
#[derive(Debug, Clone)]
pub struct FileLocator {
    root: PathBuf,
}

impl FileLocator {
    /// Creates a locator rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory this locator resolves names against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative_name` to an absolute path under the root.
    pub fn path_for(&self, relative_name: &str) -> PathBuf {
        self.root.join(relative_name)
    }

    /// Opens `relative_name`, creating it if `write` is true and it does not exist.
    pub fn open(&self, relative_name: &str, write: bool, _share: Share) -> Result<File> {
        let path = self.path_for(relative_name);
        let file = if write {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .map_err(|e| crate::error::Error::io(e, path))?
        } else {
            File::open(&path).map_err(|e| crate::error::Error::io(e, path))?
        };
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_joins_root() {
        let locator = FileLocator::new("/tmp/disks");
        assert_eq!(
            locator.path_for("foo-flat.vmdk"),
            PathBuf::from("/tmp/disks/foo-flat.vmdk")
        );
    }

    #[test]
    fn test_open_creates_when_write() {
        let dir = tempfile::tempdir().unwrap();
        let locator = FileLocator::new(dir.path());
        let file = locator.open("new.vmdk", true, Share::Exclusive).unwrap();
        assert!(file.metadata().unwrap().is_file());
    }

    #[test]
    fn test_open_read_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let locator = FileLocator::new(dir.path());
        assert!(locator.open("missing.vmdk", false, Share::Read).is_err());
    }

    #[test]
    fn test_root_accessor() {
        let locator = FileLocator::new("/tmp/disks");
        assert_eq!(locator.root(), Path::new("/tmp/disks"));
    }
}
