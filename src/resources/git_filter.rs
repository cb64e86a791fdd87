//! Git configuration filtering for copied config files.
use anyhow::Result;
use std::path::{Path, PathBuf};

use super::error::ResourceError;
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::exec::Executor;
use crate::operations::{EntryKind, FileSystemOps};

/// Exit code of `git config --unset-all` when the key is not present.
const GIT_KEY_ABSENT: i32 = 5;

/// Host-only keys stripped from a copied git configuration file.
///
/// The file is located without following symlinks. A link in the volume
/// may point back at the host, so git is never run on one.
#[derive(Debug)]
pub struct GitFilterResource<'a> {
    /// Copied entry inside the volume: a config file, or a directory
    /// holding a `config` file (a `.git` or `~/.config/git` copy).
    pub target: PathBuf,
    /// Keys removed from the file.
    pub keys: Vec<String>,
    /// Executor for running git commands.
    executor: &'a dyn Executor,
    fs_ops: &'a dyn FileSystemOps,
}

impl<'a> GitFilterResource<'a> {
    /// Create a filter for the entry at `target`.
    #[must_use]
    pub fn new(
        target: &Path,
        keys: Vec<String>,
        executor: &'a dyn Executor,
        fs_ops: &'a dyn FileSystemOps,
    ) -> Self {
        Self {
            target: target.to_path_buf(),
            keys,
            executor,
            fs_ops,
        }
    }

    /// The regular file git will edit, or `None` when nothing is there.
    fn config_file(&self) -> Result<Option<PathBuf>> {
        let path = match self.kind(&self.target)? {
            None => return Ok(None),
            Some(EntryKind::Directory) => self.target.join("config"),
            Some(EntryKind::File) => return Ok(Some(self.target.clone())),
            Some(EntryKind::Symlink) => return Err(symlink_refused(&self.target).into()),
        };
        match self.kind(&path)? {
            None => Ok(None),
            Some(EntryKind::File) => Ok(Some(path)),
            Some(EntryKind::Symlink) => Err(symlink_refused(&path).into()),
            Some(EntryKind::Directory) => Err(ResourceError::InvalidState {
                resource: path.display().to_string(),
                reason: "expected a git config file, found a directory".to_string(),
            }
            .into()),
        }
    }

    fn kind(&self, path: &Path) -> Result<Option<EntryKind>> {
        self.fs_ops
            .kind(path)
            .map_err(|e| ResourceError::from_io(path, e).into())
    }
}

fn symlink_refused(path: &Path) -> ResourceError {
    ResourceError::InvalidState {
        resource: path.display().to_string(),
        reason: "refusing to filter git config through a symlink".to_string(),
    }
}

impl Applicable for GitFilterResource<'_> {
    fn description(&self) -> String {
        format!("git filter {}", self.target.display())
    }

    fn apply(&self) -> Result<ResourceChange> {
        let Some(path) = self.config_file()? else {
            return Err(ResourceError::NotFound {
                resource: self.target.display().to_string(),
            }
            .into());
        };
        let file = path.display().to_string();
        let mut removed = false;
        for key in &self.keys {
            let result = self
                .executor
                .run_unchecked("git", &["config", "--file", &file, "--unset-all", key])?;
            match result.code {
                Some(0) => removed = true,
                Some(GIT_KEY_ABSENT) => {}
                code => {
                    return Err(ResourceError::ExecutionFailed {
                        program: "git".to_string(),
                        exit_code: code.unwrap_or(-1),
                        stderr: result.stderr.trim().to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(if removed {
            ResourceChange::Applied
        } else {
            ResourceChange::AlreadyCorrect
        })
    }
}

impl Resource for GitFilterResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        let Some(path) = self.config_file()? else {
            return Ok(ResourceState::Missing);
        };
        let file = path.display().to_string();
        let mut present = Vec::new();
        for key in &self.keys {
            let result = self
                .executor
                .run_unchecked("git", &["config", "--file", &file, "--get-all", key])?;
            if result.success {
                present.push(key.as_str());
            }
        }
        if present.is_empty() {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Incorrect {
                current: present.join(", "),
            })
        }
    }
}
