//! Owner-only permission hardening for copied secret paths.
use anyhow::Result;
use std::path::{Path, PathBuf};

use super::error::ResourceError;
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::operations::{EntryKind, FileSystemOps};

/// Mode applied to secret directories.
pub const SECRET_DIR_MODE: u32 = 0o700;
/// Mode applied to secret files.
pub const SECRET_FILE_MODE: u32 = 0o600;

/// A secret path inside the volume that must be owner-only.
///
/// Symlinks are never followed and never chmod-ed, whether they are the
/// path itself or a descendant found while recursing.
#[derive(Debug)]
pub struct SecretResource<'a> {
    /// Absolute path of the secret inside the volume.
    pub path: PathBuf,
    /// Harden every descendant of a directory as well (`d` flag).
    pub recursive: bool,
    fs: &'a dyn FileSystemOps,
}

impl<'a> SecretResource<'a> {
    /// Create a new secret resource.
    #[must_use]
    pub const fn new(path: PathBuf, recursive: bool, fs: &'a dyn FileSystemOps) -> Self {
        Self {
            path,
            recursive,
            fs,
        }
    }

    fn kind_of(&self, path: &Path) -> Result<Option<EntryKind>, ResourceError> {
        self.fs.kind(path).map_err(|e| ResourceError::from_io(path, e))
    }

    /// First path (in walk order) whose mode is not the hardened mode.
    fn first_mismatch(&self, path: &Path, kind: EntryKind, walk: bool) -> Result<Option<(PathBuf, u32)>, ResourceError> {
        let want = match kind {
            EntryKind::Directory => SECRET_DIR_MODE,
            EntryKind::File => SECRET_FILE_MODE,
            EntryKind::Symlink => return Ok(None),
        };
        let mode = self.fs.mode(path).map_err(|e| ResourceError::from_io(path, e))?;
        if mode != want {
            return Ok(Some((path.to_path_buf(), mode)));
        }
        if walk && kind == EntryKind::Directory {
            for child in self.fs.read_dir(path).map_err(|e| ResourceError::from_io(path, e))? {
                if let Some(child_kind) = self.kind_of(&child)?
                    && let Some(found) = self.first_mismatch(&child, child_kind, true)?
                {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    fn harden(&self, path: &Path, kind: EntryKind, walk: bool) -> Result<(), ResourceError> {
        let mode = match kind {
            EntryKind::Directory => SECRET_DIR_MODE,
            EntryKind::File => SECRET_FILE_MODE,
            EntryKind::Symlink => return Ok(()),
        };
        self.fs
            .set_mode(path, mode)
            .map_err(|e| ResourceError::from_io(path, e))?;
        if walk && kind == EntryKind::Directory {
            for child in self.fs.read_dir(path).map_err(|e| ResourceError::from_io(path, e))? {
                if let Some(child_kind) = self.kind_of(&child)? {
                    self.harden(&child, child_kind, true)?;
                }
            }
        }
        Ok(())
    }
}

impl Applicable for SecretResource<'_> {
    fn description(&self) -> String {
        let scope = if self.recursive { " (recursive)" } else { "" };
        format!("harden {}{scope}", self.path.display())
    }

    fn apply(&self) -> Result<ResourceChange> {
        match self.kind_of(&self.path)? {
            None => Err(ResourceError::SecretMissing {
                path: self.path.display().to_string(),
            }
            .into()),
            Some(EntryKind::Symlink) => Ok(ResourceChange::Skipped {
                reason: "secret path is a symlink".to_string(),
            }),
            Some(kind) => {
                self.harden(&self.path, kind, self.recursive)?;
                Ok(ResourceChange::Applied)
            }
        }
    }
}

impl Resource for SecretResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        match self.kind_of(&self.path)? {
            None => Ok(ResourceState::Missing),
            Some(EntryKind::Symlink) => Ok(ResourceState::Invalid {
                reason: "secret path is a symlink".to_string(),
            }),
            Some(kind) => Ok(self
                .first_mismatch(&self.path, kind, self.recursive)?
                .map_or(ResourceState::Correct, |(path, mode)| {
                    ResourceState::Incorrect {
                        current: format!("{} is {mode:o}", path.display()),
                    }
                })),
        }
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::operations::{FailingModeOps, SystemFileSystemOps};
    use std::os::unix::fs::PermissionsExt as _;

    const FS: SystemFileSystemOps = SystemFileSystemOps;

    fn chmod(path: &Path, mode: u32) {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    fn mode(path: &Path) -> u32 {
        FS.mode(path).unwrap()
    }

    #[test]
    fn hardens_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("token");
        std::fs::write(&file, "t").unwrap();
        chmod(&file, 0o644);

        let secret = SecretResource::new(file.clone(), false, &FS);
        assert!(matches!(secret.current_state().unwrap(), ResourceState::Incorrect { .. }));
        assert_eq!(secret.apply().unwrap(), ResourceChange::Applied);
        assert_eq!(mode(&file), 0o600);
        assert_eq!(secret.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn directory_without_recursion_leaves_children() {
        let dir = tempfile::tempdir().unwrap();
        let ssh = dir.path().join(".ssh");
        std::fs::create_dir(&ssh).unwrap();
        std::fs::write(ssh.join("id_ed25519"), "k").unwrap();
        chmod(&ssh.join("id_ed25519"), 0o644);

        SecretResource::new(ssh.clone(), false, &FS).apply().unwrap();

        assert_eq!(mode(&ssh), 0o700);
        assert_eq!(mode(&ssh.join("id_ed25519")), 0o644);
    }

    #[test]
    fn recursive_hardening_walks_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let ssh = dir.path().join(".ssh");
        std::fs::create_dir_all(ssh.join("keys")).unwrap();
        std::fs::write(ssh.join("keys/id"), "k").unwrap();
        chmod(&ssh.join("keys"), 0o755);
        chmod(&ssh.join("keys/id"), 0o644);

        let secret = SecretResource::new(ssh.clone(), true, &FS);
        assert!(matches!(secret.current_state().unwrap(), ResourceState::Incorrect { .. }));
        secret.apply().unwrap();

        assert_eq!(mode(&ssh.join("keys")), 0o700);
        assert_eq!(mode(&ssh.join("keys/id")), 0o600);
        assert_eq!(secret.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn recursive_hardening_does_not_touch_symlink_targets() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("shared.txt");
        std::fs::write(&outside, "shared").unwrap();
        chmod(&outside, 0o644);

        let secret_dir = dir.path().join("secret");
        std::fs::create_dir(&secret_dir).unwrap();
        std::os::unix::fs::symlink(&outside, secret_dir.join("link")).unwrap();

        SecretResource::new(secret_dir.clone(), true, &FS).apply().unwrap();

        assert_eq!(mode(&outside), 0o644);
        assert_eq!(mode(&secret_dir), 0o700);
    }

    #[test]
    fn top_level_symlink_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("real");
        std::fs::write(&outside, "x").unwrap();
        chmod(&outside, 0o644);
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        let secret = SecretResource::new(link, false, &FS);
        assert!(matches!(secret.current_state().unwrap(), ResourceState::Invalid { .. }));
        assert!(matches!(secret.apply().unwrap(), ResourceChange::Skipped { .. }));
        assert_eq!(mode(&outside), 0o644);
    }

    #[test]
    fn missing_path_is_secret_missing() {
        let dir = tempfile::tempdir().unwrap();
        let secret = SecretResource::new(dir.path().join("nope"), false, &FS);
        assert_eq!(secret.current_state().unwrap(), ResourceState::Missing);
        let err = secret.apply().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResourceError>(),
            Some(ResourceError::SecretMissing { .. })
        ));
    }

    #[test]
    fn refused_mode_change_is_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("token");
        std::fs::write(&file, "t").unwrap();
        let ops = FailingModeOps {
            kind: std::io::ErrorKind::PermissionDenied,
        };

        let err = SecretResource::new(file, false, &ops).apply().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResourceError>(),
            Some(ResourceError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn other_mode_failures_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("token");
        std::fs::write(&file, "t").unwrap();
        let ops = FailingModeOps {
            kind: std::io::ErrorKind::Other,
        };

        let err = SecretResource::new(file, false, &ops).apply().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResourceError>(),
            Some(ResourceError::Io { .. })
        ));
    }
}
