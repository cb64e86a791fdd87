//! Named tasks that drive a provisioning run.
pub mod cancel;
mod context;
pub mod post_copy;
pub mod secrets;
pub mod sync_entries;

pub use cancel::CancelSignal;
pub use context::{Context, RunOptions};

use anyhow::Result;

use crate::logging::TaskStatus;

/// Result of a single task execution.
///
/// # Examples
///
/// ```
/// use devbox_cli::tasks::TaskResult;
///
/// let ok = TaskResult::Ok;
/// let skipped = TaskResult::Skipped("secrets disabled".into());
/// let dry = TaskResult::DryRun;
///
/// assert!(matches!(ok, TaskResult::Ok));
/// assert!(matches!(skipped, TaskResult::Skipped(_)));
/// assert!(matches!(dry, TaskResult::DryRun));
/// ```
#[derive(Debug, Clone)]
pub enum TaskResult {
    /// Task completed successfully.
    Ok,
    /// Task was skipped.
    Skipped(String),
    /// Task ran in dry-run mode.
    DryRun,
}

/// Counters for tasks that process many entries.
///
/// ```
/// use devbox_cli::tasks::TaskStats;
///
/// let stats = TaskStats { changed: 1, already_ok: 2, skipped: 3 };
/// assert_eq!(stats.summary(false), "1 changed, 2 already ok, 3 skipped");
/// assert_eq!(stats.summary(true), "1 would change, 2 already ok, 3 skipped");
/// ```
#[derive(Debug, Default)]
pub struct TaskStats {
    /// Number of entries changed or applied.
    pub changed: u32,
    /// Number of entries already in the correct state.
    pub already_ok: u32,
    /// Number of entries skipped.
    pub skipped: u32,
}

impl TaskStats {
    /// Create a new empty stats counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Format the summary string (e.g. "3 changed, 10 already ok, 1 skipped").
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        if self.skipped > 0 {
            format!(
                "{} {verb}, {} already ok, {} skipped",
                self.changed, self.already_ok, self.skipped
            )
        } else {
            format!("{} {verb}, {} already ok", self.changed, self.already_ok)
        }
    }

    /// Log the summary and return the appropriate `TaskResult`.
    #[must_use]
    pub fn finish(self, ctx: &Context) -> TaskResult {
        ctx.log.info(&self.summary(ctx.dry_run));
        if ctx.dry_run {
            TaskResult::DryRun
        } else {
            TaskResult::Ok
        }
    }
}

/// A named, executable task.
pub trait Task: Send + Sync {
    /// Human-readable task name.
    fn name(&self) -> &str;

    /// Whether this task has anything to do for this run.
    fn should_run(&self, ctx: &Context) -> bool;

    /// Execute the task.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry fails or the run is cancelled.
    fn run(&self, ctx: &Context) -> Result<TaskResult>;
}

/// The tasks of a provisioning run, in execution order.
#[must_use]
pub fn provision_tasks() -> Vec<Box<dyn Task>> {
    vec![
        Box::new(sync_entries::SyncEntries),
        Box::new(secrets::EnforceSecretPermissions::AFTER_SYNC),
    ]
}

/// Execute a task, recording the result in the logger.
///
/// # Errors
///
/// Returns the task's error after recording it as failed.
pub fn execute(task: &dyn Task, ctx: &Context) -> Result<()> {
    if !task.should_run(ctx) {
        ctx.log
            .debug(&format!("skipping task: {} (not applicable)", task.name()));
        ctx.log
            .record_task(task.name(), TaskStatus::NotApplicable, None);
        return Ok(());
    }

    ctx.log.stage(task.name());

    match task.run(ctx) {
        Ok(TaskResult::Ok) => {
            ctx.log.record_task(task.name(), TaskStatus::Ok, None);
            Ok(())
        }
        Ok(TaskResult::Skipped(reason)) => {
            ctx.log.info(&format!("skipped: {reason}"));
            ctx.log
                .record_task(task.name(), TaskStatus::Skipped, Some(&reason));
            Ok(())
        }
        Ok(TaskResult::DryRun) => {
            ctx.log.record_task(task.name(), TaskStatus::DryRun, None);
            Ok(())
        }
        Err(e) => {
            ctx.log.error(&format!("{}: {e:#}", task.name()));
            ctx.log
                .record_task(task.name(), TaskStatus::Failed, Some(&format!("{e:#}")));
            Err(e)
        }
    }
}
