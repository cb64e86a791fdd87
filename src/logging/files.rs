//! Run log location, rotation and timestamps.
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::platform::Environment;

/// Environment variable overriding the run log directory.
pub const LOG_DIR_ENV: &str = "DEVBOX_LOG_DIR";

/// Directory holding run logs: `DEVBOX_LOG_DIR`, else
/// `$XDG_CACHE_HOME/devbox`, else `~/.cache/devbox`.
pub(super) fn log_dir(env: &dyn Environment) -> Option<PathBuf> {
    let set = |name: &str| env.var(name).filter(|v| !v.is_empty()).map(PathBuf::from);
    if let Some(dir) = set(LOG_DIR_ENV) {
        return Some(dir);
    }
    let cache = set("XDG_CACHE_HOME").or_else(|| env.home_dir().map(|home| home.join(".cache")))?;
    Some(cache.join("devbox"))
}

/// Run log of `command`, e.g. `provision.log`.
pub(super) fn log_file_path(env: &dyn Environment, command: &str) -> Option<PathBuf> {
    Some(log_dir(env)?.join(format!("{command}.log")))
}

/// Path the previous run's log is moved to.
pub(super) fn previous_log_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".1");
    PathBuf::from(name)
}

/// Keep exactly one previous run: `<command>.log` becomes `<command>.log.1`.
pub(super) fn rotate(path: &Path) -> io::Result<()> {
    match fs::rename(path, previous_log_path(path)) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub(super) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
