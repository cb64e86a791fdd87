//! Console and run log output.
//!
//! Commands and tasks log through [`Logger`] (or any [`Log`]).
//! [`init_subscriber`] sends those events to the console and to a run log
//! per command, `provision.log` or `harden.log`, under [`LOG_DIR_ENV`] or the
//! XDG cache directory.

mod files;
mod logger;
mod style;
mod subscriber;
mod types;

pub use files::LOG_DIR_ENV;
pub use logger::Logger;
pub use subscriber::{FILTER_ENV, init_subscriber};
pub use types::{Log, TaskEntry, TaskStatus};

/// A [`Logger`] writing to a run log in a fresh temp dir through a
/// thread-local subscriber. Keep the guard alive for the whole test.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) fn isolated_logger() -> (Logger, tempfile::TempDir, tracing::dispatcher::DefaultGuard) {
    use tracing_subscriber::{Layer as _, filter::LevelFilter, layer::SubscriberExt as _};

    let tmp = tempfile::tempdir().expect("create temp dir");
    let path = tmp.path().join("test.log");
    let file_layer = subscriber::FileLayer::create(&path, "test").expect("create run log");
    let log = Logger::with_log_file(Some(path));
    let subscriber =
        tracing_subscriber::registry().with(file_layer.with_filter(LevelFilter::DEBUG));
    let guard = tracing::dispatcher::set_default(&tracing::Dispatch::new(subscriber));
    (log, tmp, guard)
}
