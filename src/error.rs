//! Domain-specific error types for the provisioning engine.
//!
//! Internal modules return typed errors ([`ConfigError`], [`TaskError`],
//! [`ManifestError`], [`ResourceError`]) while command handlers at the CLI
//! boundary carry them inside [`anyhow::Error`] with added context.
//! [`exit_code`] recovers the typed error from such a chain to pick the
//! process exit status.
//!
//! # Exit status
//!
//! ```text
//! 0    success
//! 1    any other failure
//! 2    input error     ManifestError, ConfigError
//! 3    resource error  ResourceError, TaskError::SecretSweepFailed
//! 130  cancelled       TaskError::Cancelled
//! ```

use std::io;

use thiserror::Error;

use crate::config::manifest::ManifestError;
use crate::resources::error::ResourceError;

/// Errors that arise from loading or editing the settings document.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A dotted key path was empty or contained an invalid segment.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey {
        /// The key path as given.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The document is not valid TOML (before or after an edit).
    #[error("invalid TOML in {file}: {message}")]
    InvalidSyntax {
        /// Path to the offending file.
        file: String,
        /// Parser message.
        message: String,
    },

    /// A value needed by the command was given neither on the command line
    /// nor in the settings file.
    #[error("no {key} given: {hint}")]
    Missing {
        /// Settings key that would have supplied the value.
        key: String,
        /// How to provide it.
        hint: String,
    },

    /// An I/O error occurred while reading or writing a settings file.
    #[error("I/O error on config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read or written.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Errors that arise while running provisioning tasks.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The run was interrupted between entries.
    #[error("cancelled after {completed} of {total} entries")]
    Cancelled {
        /// Entries fully processed before cancellation.
        completed: usize,
        /// Entries in the run.
        total: usize,
    },

    /// One or more secret paths could not be hardened during the sweep.
    #[error("{failed} secret path(s) could not be hardened: {details}")]
    SecretSweepFailed {
        /// Number of entries that failed.
        failed: usize,
        /// `; `-joined per-entry messages.
        details: String,
    },
}

/// Process exit status for a successful run.
pub const EXIT_OK: u8 = 0;
/// Exit status for failures without a more specific class.
pub const EXIT_FAILURE: u8 = 1;
/// Exit status for manifest or settings input errors.
pub const EXIT_INPUT: u8 = 2;
/// Exit status for resource failures.
pub const EXIT_RESOURCE: u8 = 3;
/// Exit status for an interrupted run.
pub const EXIT_CANCELLED: u8 = 130;

/// Map an error chain to a process exit status.
///
/// The outermost typed error in the chain wins, so context added by tasks
/// and commands does not hide the original classification.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(task) = cause.downcast_ref::<TaskError>() {
            return match task {
                TaskError::Cancelled { .. } => EXIT_CANCELLED,
                TaskError::SecretSweepFailed { .. } => EXIT_RESOURCE,
            };
        }
        if cause.is::<ManifestError>() || cause.is::<ConfigError>() {
            return EXIT_INPUT;
        }
        if cause.is::<ResourceError>() {
            return EXIT_RESOURCE;
        }
    }
    EXIT_FAILURE
}
