//! Top-level subcommand orchestration.
//!
//! Each subcommand module exposes a `run` function; the shared setup here
//! resolves the workspace root, the settings file, the manifest and the
//! destination volume the same way for all of them.
pub mod config;
pub mod harden;
pub mod manifest;
pub mod provision;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{GlobalOpts, TargetOpts};
use crate::config::Config;
use crate::config::manifest::ParseOptions;
use crate::config::settings::{self, Settings};
use crate::error::ConfigError;
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::platform::{Environment, SystemEnvironment};
use crate::tasks::{self, CancelSignal, Context, RunOptions, Task};
use crate::volume::Volume;

/// Environment variable naming the workspace root.
pub const ROOT_ENV: &str = "DEVBOX_ROOT";

/// Process-wide handles passed from `main` to every command.
#[derive(Debug, Clone)]
pub struct Session {
    /// Logger shared with the task context.
    pub log: Arc<Logger>,
    /// Promote detail messages to info.
    pub verbose: bool,
    /// Set by the Ctrl-C handler.
    pub cancel: CancelSignal,
    /// Runs the container runtime and `git`.
    pub executor: Arc<dyn Executor>,
    /// Variables and home directory.
    pub env: Arc<dyn Environment>,
}

impl Session {
    /// A session against the real process environment.
    #[must_use]
    pub fn new(log: Arc<Logger>, verbose: bool, cancel: CancelSignal) -> Self {
        Self {
            log,
            verbose,
            cancel,
            executor: Arc::new(SystemExecutor),
            env: Arc::new(SystemEnvironment),
        }
    }

    /// Use `env` instead of the process environment.
    #[must_use]
    pub fn with_env(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    /// Use `executor` instead of spawning real processes.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Settings file for this invocation: `--config`, else the default
    /// location derived from the environment.
    #[must_use]
    pub fn settings_path(&self, global: &GlobalOpts) -> Option<PathBuf> {
        global
            .config
            .clone()
            .or_else(|| settings::default_path(self.env.as_ref()))
    }
}

/// Loaded state shared by the commands that read a manifest.
#[derive(Debug)]
pub struct CommandSetup {
    /// Settings plus parsed manifest.
    pub config: Arc<Config>,
}

impl CommandSetup {
    /// Resolve the root, load settings and parse the manifest.
    ///
    /// `include_disabled` is honoured when either the flag or the
    /// `provision.include_disabled` setting is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be determined or the settings or
    /// manifest are invalid.
    pub fn init(
        global: &GlobalOpts,
        session: &Session,
        manifest: Option<&Path>,
        opts: ParseOptions,
    ) -> Result<Self> {
        let root = resolve_root(global, session.env.as_ref())?;
        session.log.debug(&format!("workspace root: {}", root.display()));

        let settings = match session.settings_path(global) {
            Some(path) => {
                session.log.debug(&format!("settings: {}", path.display()));
                Settings::load(&path)
                    .with_context(|| format!("loading settings from {}", path.display()))?
            }
            None => Settings::default(),
        };
        let opts = ParseOptions {
            include_disabled: opts.include_disabled || settings.provision.include_disabled,
            ..opts
        };

        let config = Config::with_settings(&root, settings, manifest, opts)?;
        session.log.debug(&format!(
            "loaded {} entries from {}",
            config.entries.len(),
            config.manifest_path.display()
        ));
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Build the task context for a run against `volume`.
    #[must_use]
    pub fn context(&self, session: &Session, volume: Volume, opts: RunOptions) -> Context {
        let log: Arc<dyn Log> = session.log.clone();
        Context::new(
            Arc::clone(&self.config),
            volume,
            log,
            Arc::clone(&session.executor),
            Arc::clone(&session.env),
            opts,
        )
        .with_cancel(session.cancel.clone())
    }
}

/// Resolve the workspace root: `--root`, then `DEVBOX_ROOT`, then the
/// current directory.
///
/// # Errors
///
/// Returns an error if the current directory cannot be read.
pub fn resolve_root(global: &GlobalOpts, env: &dyn Environment) -> Result<PathBuf> {
    if let Some(ref root) = global.root {
        return Ok(root.clone());
    }
    if let Some(root) = env.var(ROOT_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(root));
    }
    std::env::current_dir().context("cannot determine workspace root; use --root or set DEVBOX_ROOT")
}

/// Resolve the destination volume.
///
/// `--volume-root` wins; otherwise the volume name from `--volume` or
/// `provision.volume` is resolved through the container runtime.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] when no volume is named, or the runtime
/// error when the name cannot be resolved.
pub fn resolve_volume(
    target: &TargetOpts,
    settings: &Settings,
    executor: &dyn Executor,
) -> Result<Volume> {
    if let Some(ref root) = target.volume_root {
        return Ok(Volume::from_root(root));
    }
    let name = target
        .volume
        .as_deref()
        .or(settings.provision.volume.as_deref())
        .ok_or_else(|| ConfigError::Missing {
            key: "provision.volume".to_string(),
            hint: "pass --volume or --volume-root, or set provision.volume".to_string(),
        })?;
    Volume::resolve(executor, &settings.container.runtime, name)
}

/// Execute `tasks` in order, stopping at the first failure, then print the
/// summary.
///
/// # Errors
///
/// Returns the first task error unchanged so its exit code survives.
pub fn run_tasks_to_completion<'a>(
    tasks: impl IntoIterator<Item = &'a dyn Task>,
    ctx: &Context,
    log: &Logger,
) -> Result<()> {
    for task in tasks {
        if let Err(e) = tasks::execute(task, ctx) {
            log.print_summary();
            return Err(e);
        }
    }
    log.print_summary();

    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} task(s) failed");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::platform::MapEnvironment;
    use crate::resources::test_helpers::MockExecutor;

    fn session(env: MapEnvironment) -> Session {
        Session::new(Arc::new(Logger::new("test")), false, CancelSignal::new())
            .with_env(Arc::new(env))
    }

    #[test]
    fn resolve_root_uses_explicit_root() {
        let global = GlobalOpts {
            root: Some(PathBuf::from("/explicit/path")),
            ..GlobalOpts::default()
        };
        let env = MapEnvironment::new().with(ROOT_ENV, "/from/env");
        assert_eq!(
            resolve_root(&global, &env).unwrap(),
            PathBuf::from("/explicit/path")
        );
    }

    #[test]
    fn resolve_root_falls_back_to_env_then_cwd() {
        let global = GlobalOpts::default();
        let env = MapEnvironment::new().with(ROOT_ENV, "/from/env");
        assert_eq!(resolve_root(&global, &env).unwrap(), PathBuf::from("/from/env"));

        let empty = MapEnvironment::new().with(ROOT_ENV, "");
        assert_eq!(
            resolve_root(&global, &empty).unwrap(),
            std::env::current_dir().unwrap()
        );
    }

    #[test]
    fn settings_path_prefers_flag() {
        let s = session(MapEnvironment::new().with("XDG_CONFIG_HOME", "/xdg"));
        assert_eq!(
            s.settings_path(&GlobalOpts::default()),
            Some(PathBuf::from("/xdg/devbox/config.toml"))
        );
        let global = GlobalOpts {
            config: Some(PathBuf::from("/etc/devbox.toml")),
            ..GlobalOpts::default()
        };
        assert_eq!(s.settings_path(&global), Some(PathBuf::from("/etc/devbox.toml")));
    }

    #[test]
    fn volume_root_skips_runtime() {
        let target = TargetOpts {
            volume_root: Some(PathBuf::from("/srv/home-vol")),
            ..TargetOpts::default()
        };
        let exec = MockExecutor::default();
        let volume = resolve_volume(&target, &Settings::default(), &exec).unwrap();
        assert_eq!(volume, Volume::new("home-vol", "/srv/home-vol"));
        assert_eq!(exec.call_count(), 0);
    }

    #[test]
    fn volume_name_from_settings_is_inspected() {
        let mut settings = Settings::default();
        settings.provision.volume = Some("devbox-home".to_string());
        settings.container.runtime = "podman".to_string();
        let exec = MockExecutor::ok("/var/lib/containers/devbox-home/_data\n").with_which(true);

        let volume = resolve_volume(&TargetOpts::default(), &settings, &exec).unwrap();

        assert_eq!(volume.root, PathBuf::from("/var/lib/containers/devbox-home/_data"));
        assert_eq!(
            exec.calls(),
            vec!["podman volume inspect --format {{.Mountpoint}} devbox-home".to_string()]
        );
    }

    #[test]
    fn flag_volume_overrides_settings() {
        let mut settings = Settings::default();
        settings.provision.volume = Some("from-settings".to_string());
        let target = TargetOpts {
            volume: Some("from-flag".to_string()),
            ..TargetOpts::default()
        };
        let exec = MockExecutor::ok("/mnt/v\n").with_which(true);
        resolve_volume(&target, &settings, &exec).unwrap();
        assert!(exec.calls()[0].ends_with("from-flag"));
    }

    #[test]
    fn missing_volume_is_an_input_error() {
        let exec = MockExecutor::default();
        let err = resolve_volume(&TargetOpts::default(), &Settings::default(), &exec).unwrap_err();
        assert_eq!(crate::error::exit_code(&err), crate::error::EXIT_INPUT);
        assert!(err.to_string().contains("provision.volume"));
    }

    #[test]
    fn setup_honours_include_disabled_setting() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("m.toml");
        std::fs::write(
            &manifest,
            "[[entry]]\nsource = \"a\"\ntarget = \"home/a\"\ndisabled = true\n",
        )
        .unwrap();
        let settings = dir.path().join("config.toml");
        std::fs::write(&settings, "[provision]\ninclude_disabled = true\n").unwrap();
        let global = GlobalOpts {
            root: Some(dir.path().to_path_buf()),
            config: Some(settings),
            dry_run: false,
        };

        let setup = CommandSetup::init(
            &global,
            &session(MapEnvironment::new()),
            Some(&manifest),
            ParseOptions::default(),
        )
        .unwrap();

        assert_eq!(setup.config.entries.len(), 1);
        assert!(setup.config.entries[0].disabled);
    }
}
