//! Structured logger with dry-run awareness and summary collection.
use std::path::PathBuf;
use std::sync::Mutex;

use super::files::log_file_path;
use super::style::{DIM, GREEN, GREY, RED, YELLOW, paint};
use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::{Log, TaskEntry, TaskStatus};
use crate::platform::SystemEnvironment;

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Structured logger with dry-run awareness and summary collection.
///
/// Every message also lands in the command's run log (see
/// [`LOG_DIR_ENV`](super::LOG_DIR_ENV)) through the layer installed by
/// [`init_subscriber`](super::subscriber::init_subscriber).
#[derive(Debug)]
pub struct Logger {
    tasks: Mutex<Vec<TaskEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger for `command`.
    ///
    /// Only remembers the log file path for the summary; the file itself is
    /// opened by the subscriber.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self::with_log_file(log_file_path(&SystemEnvironment, command))
    }

    /// A logger whose summary points at `log_file`.
    #[must_use]
    pub(crate) const fn with_log_file(log_file: Option<PathBuf>) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            log_file,
        }
    }

    /// Return the log file path, if available.
    #[cfg(test)]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Return a clone of all recorded task entries (test-only).
    #[cfg(test)]
    pub(crate) fn task_entries(&self) -> Vec<TaskEntry> {
        self.tasks.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a dry-run action message.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    /// Record a task result for the summary.
    pub fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.tasks.lock() {
            guard.push(TaskEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Count the number of failed tasks.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.tasks.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|t| t.status == TaskStatus::Failed)
                .count()
        })
    }

    /// Print the summary of all recorded tasks.
    pub fn print_summary(&self) {
        let tasks = match self.tasks.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        if tasks.is_empty() {
            return;
        }

        self.stage("Summary");

        let mut ok = 0u32;
        let mut skipped = 0u32;
        let mut dry_run = 0u32;
        let mut failed = 0u32;

        for task in &tasks {
            let (icon, color) = match task.status {
                TaskStatus::Ok => {
                    ok += 1;
                    ("✓", GREEN)
                }
                TaskStatus::NotApplicable | TaskStatus::Skipped => {
                    skipped += 1;
                    ("○", YELLOW)
                }
                TaskStatus::DryRun => {
                    dry_run += 1;
                    ("~", GREY)
                }
                TaskStatus::Failed => {
                    failed += 1;
                    ("✗", RED)
                }
            };

            let suffix = task
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&paint(color, &format!("{icon} {}{suffix}", task.name)));
        }

        let total = ok + skipped + dry_run + failed;
        self.info(&format!(
            "{total} tasks: {}, {}, {}, {}",
            paint(GREEN, &format!("{ok} ok")),
            paint(YELLOW, &format!("{skipped} skipped")),
            paint(GREY, &format!("{dry_run} dry-run")),
            paint(RED, &format!("{failed} failed")),
        ));

        if let Some(path) = &self.log_file {
            self.info(&paint(DIM, &format!("log: {}", path.display())));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run);

    fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        self.record_task(name, status, message);
    }
}
