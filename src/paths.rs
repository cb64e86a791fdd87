//! Source and target path resolution.
//!
//! Sources are host paths (`~` expanded, relative paths anchored at the
//! workspace root). Targets are relative paths inside a volume and are
//! validated so a manifest cannot write outside the volume root.
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors related to target path validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The target is empty after normalization.
    #[error("target path is empty")]
    Empty,
    /// The target climbs above the volume root with `..`.
    #[error("target escapes the volume root: {0}")]
    Traversal(String),
    /// The target contains a NUL byte or a drive prefix.
    #[error("invalid target component in {0}")]
    InvalidComponent(String),
}

/// Normalize a target to forward slashes with no leading slash.
///
/// Idempotent; no other rewriting happens here.
///
/// ```
/// use devbox_cli::paths::normalize_target;
///
/// assert_eq!(normalize_target("/home\\dev/.gitconfig"), "home/dev/.gitconfig");
/// assert_eq!(normalize_target("home/.ssh"), "home/.ssh");
/// ```
#[must_use]
pub fn normalize_target(target: &str) -> String {
    target.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Normalize `target` and resolve `.`/`..` without leaving the root.
///
/// # Errors
///
/// Returns [`PathError`] if the target is empty, escapes the root, or has an
/// invalid component.
pub fn relative_target(target: &str) -> Result<PathBuf, PathError> {
    let normalized = normalize_target(target);
    if normalized.contains('\0') {
        return Err(PathError::InvalidComponent(normalized));
    }

    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(PathError::Traversal(normalized));
                }
                out.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::InvalidComponent(normalized));
            }
        }
    }

    if depth == 0 {
        return Err(PathError::Empty);
    }
    Ok(out)
}

/// Join a manifest target under `root`.
///
/// The check is logical: symlinks inside the volume are not resolved here,
/// callers that act on them must not follow them.
///
/// # Errors
///
/// Returns [`PathError`] as for [`relative_target`].
pub fn safe_join(root: &Path, target: &str) -> Result<PathBuf, PathError> {
    Ok(root.join(relative_target(target)?))
}

/// Expand a leading `~` or `~/` to `home`.
///
/// `~user` forms and paths without a tilde are returned unchanged, as is
/// everything when no home directory is known.
#[must_use]
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (p, Some(home)) if p.starts_with("~/") || p.starts_with("~\\") => {
            home.join(p.get(2..).unwrap_or_default())
        }
        (p, _) => PathBuf::from(p),
    }
}

/// Resolve a manifest source: expand `~`, then anchor relative paths at
/// `workspace`.
#[must_use]
pub fn resolve_source(source: &str, home: Option<&Path>, workspace: &Path) -> PathBuf {
    let expanded = expand_home(source, home);
    if expanded.is_absolute() {
        expanded
    } else {
        workspace.join(expanded)
    }
}
