use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::cancel::CancelSignal;
use crate::config::Config;
use crate::config::manifest::ManifestEntry;
use crate::exec::Executor;
use crate::logging::Log;
use crate::operations::{FileSystemOps, SystemFileSystemOps};
use crate::paths;
use crate::platform::Environment;
use crate::volume::Volume;

/// Per-run switches shared by every task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Preview changes without applying them.
    pub dry_run: bool,
    /// Promote per-entry detail messages to info level.
    pub verbose: bool,
    /// Leave secret entries out of the run entirely.
    pub no_secrets: bool,
}

/// Shared context for task execution.
pub struct Context {
    /// Settings, workspace root and parsed manifest entries.
    pub config: Arc<Config>,
    /// Destination volume.
    pub volume: Volume,
    /// Logger for output and task recording.
    pub log: Arc<dyn Log>,
    /// Whether to perform a dry run (preview changes without applying).
    pub dry_run: bool,
    /// Whether per-entry messages are logged at info level.
    pub verbose: bool,
    /// Whether secret entries and the secret sweep are skipped.
    pub no_secrets: bool,
    /// User's home directory, used to expand `~` in sources.
    pub home: Option<PathBuf>,
    /// Command executor (for testing or real system calls).
    pub executor: Arc<dyn Executor>,
    /// Filesystem operation abstraction (injectable for testing).
    pub fs_ops: Arc<dyn FileSystemOps>,
    /// Environment used for home lookup and template rendering.
    pub env: Arc<dyn Environment>,
    /// Set by the Ctrl-C handler; checked between entries.
    pub cancel: CancelSignal,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &"<Config>")
            .field("volume", &self.volume)
            .field("log", &"<dyn Log>")
            .field("dry_run", &self.dry_run)
            .field("verbose", &self.verbose)
            .field("no_secrets", &self.no_secrets)
            .field("home", &self.home)
            .field("executor", &"<dyn Executor>")
            .field("fs_ops", &"<dyn FileSystemOps>")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a new context for task execution.
    ///
    /// The home directory comes from `env`; when it is unknown, `~` in
    /// sources is left unexpanded.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        volume: Volume,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
        env: Arc<dyn Environment>,
        opts: RunOptions,
    ) -> Self {
        Self {
            home: env.home_dir(),
            config,
            volume,
            log,
            dry_run: opts.dry_run,
            verbose: opts.verbose,
            no_secrets: opts.no_secrets,
            executor,
            fs_ops: Arc::new(SystemFileSystemOps),
            env,
            cancel: CancelSignal::new(),
        }
    }

    /// Use `cancel` instead of the context's own signal.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create a copy of this context with a different [`FileSystemOps`] implementation.
    ///
    /// Used in tests to inject failures so that tasks can be exercised
    /// against refused permission changes.
    #[cfg(test)]
    #[must_use]
    pub fn with_fs_ops(mut self, fs_ops: Arc<dyn FileSystemOps>) -> Self {
        self.fs_ops = fs_ops;
        self
    }

    /// Resolved host source path of `entry`.
    #[must_use]
    pub fn source_path(&self, entry: &ManifestEntry) -> PathBuf {
        paths::resolve_source(&entry.source, self.home.as_deref(), &self.config.root)
    }

    /// Destination of `entry` inside the volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the target escapes the volume root.
    pub fn target_path(&self, entry: &ManifestEntry) -> Result<PathBuf> {
        self.volume
            .path_for(&entry.target)
            .with_context(|| format!("resolving target {}", entry.target))
    }
}
