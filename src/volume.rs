//! Destination volume: a name plus the host path of its filesystem tree.
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use crate::exec::Executor;
use crate::paths::{self, PathError};
use crate::resources::error::ResourceError;

/// A provisioning destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Volume identifier (container volume name or directory name).
    pub name: String,
    /// Host path at which the volume's tree is reachable.
    pub root: PathBuf,
}

impl Volume {
    /// Create a volume with an explicit root.
    #[must_use]
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    /// Use a plain directory as the volume; the name is the directory name.
    #[must_use]
    pub fn from_root(root: &Path) -> Self {
        let name = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().to_string());
        Self::new(name, root)
    }

    /// Resolve `name` to its mountpoint through the container runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] if the runtime is not on `PATH` or
    /// reports no mountpoint, or the runtime's failure.
    pub fn resolve(executor: &dyn Executor, runtime: &str, name: &str) -> Result<Self> {
        if !executor.which(runtime) {
            return Err(ResourceError::NotFound {
                resource: format!("container runtime '{runtime}'"),
            }
            .into());
        }
        let result = executor
            .run(
                runtime,
                &["volume", "inspect", "--format", "{{.Mountpoint}}", name],
            )
            .with_context(|| format!("inspecting volume '{name}' with {runtime}"))?;
        let mountpoint = result.stdout.trim();
        if mountpoint.is_empty() {
            return Err(ResourceError::NotFound {
                resource: format!("mountpoint of volume '{name}'"),
            }
            .into());
        }
        Ok(Self::new(name, mountpoint))
    }

    /// Host path for a manifest target inside this volume.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if the target is empty or escapes the root.
    pub fn path_for(&self, target: &str) -> Result<PathBuf, PathError> {
        paths::safe_join(&self.root, target)
    }
}
