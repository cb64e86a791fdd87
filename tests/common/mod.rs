// Shared helpers for integration tests.
//
// Provides a temporary workspace with a host home directory, a volume
// directory and a settings file, plus a scripted executor, so each
// integration test can drive the commands without a container runtime.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use devbox_cli::cli::{GlobalOpts, TargetOpts};
use devbox_cli::commands::Session;
use devbox_cli::exec::{ExecResult, Executor};
use devbox_cli::logging::Logger;
use devbox_cli::platform::MapEnvironment;
use devbox_cli::tasks::CancelSignal;

/// [`Executor`] answering from a queue of `(exit code, stdout)` pairs.
///
/// Once the queue is empty every call exits 127.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<(i32, String)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    /// Answer calls with `responses`, in order.
    pub fn new(responses: &[(i32, &str)]) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .iter()
                    .map(|(code, out)| (*code, (*out).to_string()))
                    .collect(),
            ),
            calls: Mutex::default(),
        }
    }

    /// Every call so far as `program arg arg ...`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl Executor for ScriptedExecutor {
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        let result = self.run_unchecked(program, args)?;
        if !result.success {
            anyhow::bail!("{program} exited with {:?}", result.code);
        }
        Ok(result)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().expect("calls lock").push(line);
        let (code, stdout) = self
            .responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or((127, String::new()));
        Ok(ExecResult {
            stdout,
            stderr: String::new(),
            success: code == 0,
            code: Some(code),
        })
    }

    fn which(&self, _program: &str) -> bool {
        true
    }
}

/// An isolated workspace backed by a [`tempfile::TempDir`].
///
/// Layout: `workspace/` (the root, manifest at `.devbox/manifest.toml`),
/// `home/` (the host home), `volume/` (the destination) and `config.toml`.
pub struct TestWorkspace {
    dir: tempfile::TempDir,
    env: MapEnvironment,
    executor: Arc<ScriptedExecutor>,
    cancel: CancelSignal,
}

impl TestWorkspace {
    /// Create the directory layout with an empty manifest.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        for sub in ["workspace/.devbox", "home", "volume"] {
            std::fs::create_dir_all(dir.path().join(sub)).expect("create layout");
        }
        let home = dir.path().join("home");
        let env = MapEnvironment::new().with("HOME", &home.display().to_string());
        let ws = Self {
            dir,
            env,
            executor: Arc::new(ScriptedExecutor::default()),
            cancel: CancelSignal::new(),
        };
        ws.manifest("");
        ws
    }

    /// Workspace root.
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("workspace")
    }

    /// Host home directory.
    pub fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    /// Volume directory.
    pub fn volume(&self) -> PathBuf {
        self.dir.path().join("volume")
    }

    /// Settings file path (may not exist).
    pub fn settings_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    /// The default manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.root().join(".devbox/manifest.toml")
    }

    /// Replace the default manifest.
    pub fn manifest(&self, content: &str) -> &Self {
        std::fs::write(self.manifest_path(), content).expect("write manifest");
        self
    }

    /// Write the settings file.
    pub fn settings(&self, content: &str) -> &Self {
        std::fs::write(self.settings_path(), content).expect("write settings");
        self
    }

    /// Write a file under the workspace root.
    pub fn file(&self, rel: &str, content: &str) -> &Self {
        write(&self.root().join(rel), content);
        self
    }

    /// Write a file under the host home.
    pub fn home_file(&self, rel: &str, content: &str) -> &Self {
        write(&self.home().join(rel), content);
        self
    }

    /// Add an environment variable visible to template rendering.
    pub fn with_var(mut self, name: &str, value: &str) -> Self {
        self.env = self.env.with(name, value);
        self
    }

    /// Answer subprocess calls from `responses`.
    pub fn with_executor(mut self, responses: &[(i32, &str)]) -> Self {
        self.executor = Arc::new(ScriptedExecutor::new(responses));
        self
    }

    /// The executor handed to sessions.
    pub fn executor(&self) -> &ScriptedExecutor {
        &self.executor
    }

    /// The cancel signal handed to sessions.
    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Read a file from the volume.
    pub fn read_volume(&self, rel: &str) -> String {
        std::fs::read_to_string(self.volume().join(rel)).expect("read volume file")
    }

    /// Permission bits of a volume path.
    #[cfg(unix)]
    pub fn volume_mode(&self, rel: &str) -> u32 {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::symlink_metadata(self.volume().join(rel))
            .expect("stat volume path")
            .permissions()
            .mode()
            & 0o777
    }

    /// Global options pointing at this workspace and settings file.
    pub fn global(&self, dry_run: bool) -> GlobalOpts {
        GlobalOpts {
            dry_run,
            config: Some(self.settings_path()),
            root: Some(self.root()),
        }
    }

    /// Target options using the volume directory directly.
    pub fn target(&self) -> TargetOpts {
        TargetOpts {
            volume_root: Some(self.volume()),
            ..TargetOpts::default()
        }
    }

    /// A session wired to this workspace's environment and executor.
    pub fn session(&self) -> Session {
        let executor: Arc<dyn Executor> = self.executor.clone();
        Session::new(Arc::new(Logger::new("test")), false, self.cancel.clone())
            .with_env(Arc::new(self.env.clone()))
            .with_executor(executor)
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, content).expect("write file");
}
