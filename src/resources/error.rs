//! Typed error variants for resource operations.
//!
//! This module provides [`ResourceError`], a structured error type for
//! resource check and apply operations.  Resource code returns these
//! variants directly; callers convert to [`anyhow::Error`] via `?`.

use std::io;
use std::path::Path;

use thiserror::Error;

/// Errors that arise from resource checks and apply operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A command invoked by a resource failed with an unexpected exit code.
    #[error("command '{program}' failed (exit {exit_code}): {stderr}")]
    ExecutionFailed {
        /// Name of the program that was invoked.
        program: String,
        /// Exit code returned by the process (`-1` when killed by a signal).
        exit_code: i32,
        /// Captured standard error output.
        stderr: String,
    },

    /// A path the resource operates on does not exist.
    #[error("resource not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },

    /// A required (non-optional) manifest source does not exist.
    #[error("source does not exist: {path}")]
    SourceMissing {
        /// Resolved source path.
        path: String,
    },

    /// A secret target was not present in the volume after copying.
    #[error("secret path does not exist: {path}")]
    SecretMissing {
        /// Path inside the volume that was expected to exist.
        path: String,
    },

    /// The OS refused a permission change.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// Path for which permission was denied.
        path: String,
    },

    /// A resource exists but is in an unexpected or inconsistent state.
    #[error("invalid state for '{resource}': {reason}")]
    InvalidState {
        /// Name or description of the resource in the invalid state.
        resource: String,
        /// Human-readable explanation of why the state is invalid.
        reason: String,
    },

    /// Any other I/O failure on a resource path.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path the failed operation touched.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl ResourceError {
    /// Classify an I/O error on `path`, keeping permission failures distinct.
    #[must_use]
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        let path = path.display().to_string();
        if err.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path }
        } else {
            Self::Io { path, source: err }
        }
    }
}
