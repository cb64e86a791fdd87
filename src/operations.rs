//! Filesystem operation abstractions for dependency injection.
//!
//! Provides the [`FileSystemOps`] trait so that transfer and hardening logic
//! can be exercised against injected failures.  Production code uses
//! [`SystemFileSystemOps`]; tests wrap it with `FailingModeOps`.

use std::io;
use std::path::{Path, PathBuf};

/// Kind of a filesystem entry, determined without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (possibly dangling).
    Symlink,
}

/// Abstraction over the filesystem calls used by transfer and hardening.
///
/// Every query that inspects an entry's kind or mode works on the entry
/// itself; symlinks are never followed.
pub trait FileSystemOps: Send + Sync + std::fmt::Debug {
    /// Returns the kind of the entry at `path`, or `None` if nothing is there.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata query fails for a reason other than
    /// the path not existing.
    fn kind(&self, path: &Path) -> io::Result<Option<EntryKind>>;

    /// Read the whole file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate `path` and write `contents`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Copy a regular file, carrying its permission bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Create `path` and all missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Return the immediate children of `path`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be read as a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Read the target of the symbolic link at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a symlink or cannot be read.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Create a symbolic link at `link` pointing to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be created or symlinks are not
    /// supported on this platform.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Remove `path` recursively. Symlinks are removed, not followed.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Return the permission bits of the entry at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    fn mode(&self, path: &Path) -> io::Result<u32>;

    /// Set the permission bits of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses the change or the platform has no
    /// Unix permission model.
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// Production [`FileSystemOps`] implementation that delegates to [`std::fs`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFileSystemOps;

impl FileSystemOps for SystemFileSystemOps {
    fn kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) => {
                let file_type = meta.file_type();
                Ok(Some(if file_type.is_symlink() {
                    EntryKind::Symlink
                } else if file_type.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        std::fs::copy(src, dst).map(|_| ())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut children = std::fs::read_dir(path)?
            .map(|e| e.map(|entry| entry.path()))
            .collect::<io::Result<Vec<_>>>()?;
        children.sort();
        Ok(children)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(not(unix))]
    fn symlink(&self, _target: &Path, link: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot recreate symlink {}", link.display()),
        ))
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        match self.kind(path)? {
            Some(EntryKind::Directory) => std::fs::remove_dir_all(path),
            Some(_) => std::fs::remove_file(path),
            None => Ok(()),
        }
    }

    #[cfg(unix)]
    fn mode(&self, path: &Path) -> io::Result<u32> {
        use std::os::unix::fs::PermissionsExt as _;
        Ok(std::fs::symlink_metadata(path)?.permissions().mode() & 0o7777)
    }

    #[cfg(not(unix))]
    fn mode(&self, path: &Path) -> io::Result<u32> {
        let meta = std::fs::symlink_metadata(path)?;
        Ok(if meta.is_dir() { 0o755 } else { 0o644 })
    }

    #[cfg(unix)]
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    fn set_mode(&self, path: &Path, _mode: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("permission bits are not supported for {}", path.display()),
        ))
    }
}

/// [`FileSystemOps`] that behaves like the real filesystem except that every
/// [`set_mode`](FileSystemOps::set_mode) call fails with a fixed error kind.
#[cfg(test)]
#[derive(Debug)]
pub struct FailingModeOps {
    /// Error kind returned from `set_mode`.
    pub kind: io::ErrorKind,
}

#[cfg(test)]
impl FileSystemOps for FailingModeOps {
    fn kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        SystemFileSystemOps.kind(path)
    }
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        SystemFileSystemOps.read(path)
    }
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        SystemFileSystemOps.write(path, contents)
    }
    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        SystemFileSystemOps.copy_file(src, dst)
    }
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        SystemFileSystemOps.create_dir_all(path)
    }
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        SystemFileSystemOps.read_dir(path)
    }
    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        SystemFileSystemOps.read_link(path)
    }
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        SystemFileSystemOps.symlink(target, link)
    }
    fn remove_all(&self, path: &Path) -> io::Result<()> {
        SystemFileSystemOps.remove_all(path)
    }
    fn mode(&self, path: &Path) -> io::Result<u32> {
        SystemFileSystemOps.mode(path)
    }
    fn set_mode(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Err(io::Error::from(self.kind))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn kind_reports_none_for_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(SystemFileSystemOps.kind(&dir.path().join("nope")).unwrap(), None);
    }

    #[test]
    fn kind_distinguishes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(SystemFileSystemOps.kind(&file).unwrap(), Some(EntryKind::File));
        assert_eq!(
            SystemFileSystemOps.kind(dir.path()).unwrap(),
            Some(EntryKind::Directory)
        );
    }

    #[cfg(unix)]
    #[test]
    fn kind_does_not_follow_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path(), &link).unwrap();
        assert_eq!(SystemFileSystemOps.kind(&link).unwrap(), Some(EntryKind::Symlink));
    }

    #[test]
    fn read_dir_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b", "c", "a"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let names: Vec<_> = SystemFileSystemOps
            .read_dir(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_all_handles_trees_and_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("nested")).unwrap();
        std::fs::write(tree.join("nested/file"), "x").unwrap();
        SystemFileSystemOps.remove_all(&tree).unwrap();
        assert!(!tree.exists());
        SystemFileSystemOps.remove_all(&tree).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn set_mode_round_trips_through_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, "x").unwrap();
        SystemFileSystemOps.set_mode(&file, 0o640).unwrap();
        assert_eq!(SystemFileSystemOps.mode(&file).unwrap(), 0o640);
    }

    #[test]
    fn failing_mode_ops_rejects_set_mode() {
        let dir = tempfile::tempdir().unwrap();
        let ops = FailingModeOps {
            kind: io::ErrorKind::PermissionDenied,
        };
        let err = ops.set_mode(dir.path(), 0o700).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
