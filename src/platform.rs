//! Host environment access: environment variables and the home directory.
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;

/// Read-only view of the process environment.
///
/// Path resolution and template rendering go through this trait so tests can
/// supply a fixed environment instead of mutating the real one.
pub trait Environment: Send + Sync + Debug {
    /// Return the value of the environment variable `name`, if set and UTF-8.
    fn var(&self, name: &str) -> Option<String>;

    /// Return the user's home directory (`HOME`, then `USERPROFILE`).
    fn home_dir(&self) -> Option<PathBuf> {
        self.var("HOME")
            .or_else(|| self.var("USERPROFILE"))
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }
}

/// [`Environment`] backed by [`std::env`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// [`Environment`] backed by a fixed map.
#[derive(Debug, Default, Clone)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable.
    #[must_use]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl Environment for MapEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}
