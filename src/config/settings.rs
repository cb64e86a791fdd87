//! Typed user settings and in-place edits of the settings file.
//!
//! Reads go through `serde`; writes go through the line editor so comments
//! and layout in the user's file are preserved.
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::editor::{self, KeyPath, SettingValue};
use super::toml_loader::{load_config, parse_str};
use crate::error::ConfigError;
use crate::platform::Environment;

/// Git keys stripped from copied git configuration files by default.
///
/// Each of these points at host-only programs or credentials that do not
/// exist inside the container.
pub const DEFAULT_FILTER_KEYS: &[&str] = &[
    "credential.helper",
    "core.sshCommand",
    "gpg.program",
    "gpg.ssh.program",
    "core.fsmonitor",
];

/// Default container runtime used to resolve volume mountpoints.
pub const DEFAULT_RUNTIME: &str = "docker";

/// Typed view of the settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Manifest path; relative paths resolve against the workspace root.
    pub manifest: Option<String>,
    /// Provisioning defaults.
    pub provision: ProvisionSettings,
    /// Container runtime settings.
    pub container: ContainerSettings,
    /// Git filter settings.
    pub git: GitSettings,
}

/// `[provision]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProvisionSettings {
    /// Default destination volume name.
    pub volume: Option<String>,
    /// Skip secret entries and the secret sweep.
    pub no_secrets: bool,
    /// Provision entries marked `disabled` as well.
    pub include_disabled: bool,
}

/// `[container]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Program invoked as `<runtime> volume inspect`.
    pub runtime: String,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
        }
    }
}

/// `[git]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    /// Keys removed from git configuration files flagged `g`.
    pub filter_keys: Vec<String>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            filter_keys: DEFAULT_FILTER_KEYS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Resolve the configured manifest path against `root`.
    #[must_use]
    pub fn manifest_path(&self, root: &Path) -> Option<PathBuf> {
        self.manifest.as_ref().map(|m| root.join(m))
    }
}

/// Default settings file location:
/// `$XDG_CONFIG_HOME/devbox/config.toml`, else `~/.config/devbox/config.toml`.
#[must_use]
pub fn default_path(env: &dyn Environment) -> Option<PathBuf> {
    let base = env
        .var("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env.home_dir().map(|home| home.join(".config")))?;
    Some(base.join("devbox").join("config.toml"))
}

/// Set `key` to `value` in the settings file at `path`.
///
/// The file is created if missing. Returns `true` when the file changed;
/// an edit that leaves the text identical does not rewrite the file.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSyntax`] if the edited document would no
/// longer load as [`Settings`], or [`ConfigError::Io`] on read/write failure.
pub fn set_key(path: &Path, key: &KeyPath, value: &SettingValue) -> Result<bool, ConfigError> {
    let original = read_document(path)?;
    let line = editor::format_assignment(key.key(), value);
    let updated = editor::upsert_key(&original, key, &line);
    commit(path, &original, &updated)
}

/// Remove the root-level `key` from the settings file at `path`.
///
/// Returns `true` when the key was present and the file was rewritten.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidKey`] for a sectioned key path, or the
/// errors of [`set_key`].
pub fn unset_root_key(path: &Path, key: &KeyPath) -> Result<bool, ConfigError> {
    if !key.is_root() {
        return Err(ConfigError::InvalidKey {
            key: key.to_string(),
            reason: "only root-level keys can be removed".to_string(),
        });
    }
    let original = read_document(path)?;
    let updated = editor::remove_root_key(&original, key.key());
    commit(path, &original, &updated)
}

fn read_document(path: &Path) -> Result<String, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(ConfigError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn commit(path: &Path, original: &str, updated: &str) -> Result<bool, ConfigError> {
    if original == updated {
        return Ok(false);
    }
    parse_str::<Settings>(updated, path)?;
    atomic_write(path, updated.as_bytes())?;
    Ok(true)
}

/// Write via a temp file next to the real file, fsync, then rename.
///
/// A symlinked settings file is resolved first so the link survives and the
/// edit lands in the file it points at. An existing file keeps its
/// permission bits.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let io_err = |source: std::io::Error| ConfigError::Io {
        path: path.display().to_string(),
        source,
    };
    let target = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => dunce::canonicalize(path).map_err(io_err)?,
        _ => path.to_path_buf(),
    };
    let permissions = match std::fs::metadata(&target) {
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(io_err(e)),
    };
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(data).map_err(io_err)?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions).map_err(io_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(&target).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::platform::MapEnvironment;

    fn key(raw: &str) -> KeyPath {
        KeyPath::parse(raw).unwrap()
    }

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings.container.runtime, "docker");
        assert_eq!(settings.git.filter_keys.len(), DEFAULT_FILTER_KEYS.len());
        assert!(!settings.provision.no_secrets);
        assert_eq!(settings.manifest, None);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[provision]\nvolume = \"home\"\n[git]\nfilter_keys = []\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.provision.volume.as_deref(), Some("home"));
        assert!(settings.git.filter_keys.is_empty());
        assert_eq!(settings.container.runtime, "docker");
    }

    #[test]
    fn default_path_prefers_xdg() {
        let env = MapEnvironment::new()
            .with("XDG_CONFIG_HOME", "/xdg")
            .with("HOME", "/home/dev");
        assert_eq!(
            default_path(&env),
            Some(PathBuf::from("/xdg/devbox/config.toml"))
        );
        let env = MapEnvironment::new().with("HOME", "/home/dev");
        assert_eq!(
            default_path(&env),
            Some(PathBuf::from("/home/dev/.config/devbox/config.toml"))
        );
        assert_eq!(default_path(&MapEnvironment::new()), None);
    }

    #[test]
    fn set_key_creates_file_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devbox").join("config.toml");
        let changed = set_key(
            &path,
            &key("provision.volume"),
            &SettingValue::String("home".into()),
        )
        .unwrap();
        assert!(changed);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[provision]\nvolume = \"home\"\n"
        );
    }

    #[test]
    fn set_key_preserves_comments_and_reports_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# mine\n[provision]\nno_secrets = true # keep\n").unwrap();

        assert!(set_key(&path, &key("provision.no_secrets"), &SettingValue::Boolean(false)).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# mine\n[provision]\nno_secrets = false\n"
        );
        assert!(!set_key(&path, &key("provision.no_secrets"), &SettingValue::Boolean(false)).unwrap());
    }

    #[test]
    fn set_key_rejects_type_mismatch_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[provision]\n").unwrap();
        let err = set_key(
            &path,
            &key("provision.no_secrets"),
            &SettingValue::String("maybe".into()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSyntax { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[provision]\n");
    }

    #[test]
    fn unset_root_key_removes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "manifest = \"m.toml\"\n\n[provision]\nvolume = \"v\"\n").unwrap();
        assert!(unset_root_key(&path, &key("manifest")).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "\n[provision]\nvolume = \"v\"\n"
        );
        assert!(!unset_root_key(&path, &key("manifest")).unwrap());
    }

    #[test]
    fn unset_rejects_sectioned_keys() {
        let dir = tempfile::tempdir().unwrap();
        let err = unset_root_key(&dir.path().join("c.toml"), &key("provision.volume")).unwrap_err();
        assert!(err.to_string().contains("only root-level keys"));
    }

    #[test]
    fn manifest_path_is_relative_to_root() {
        let settings = Settings {
            manifest: Some("ops/manifest.toml".into()),
            ..Settings::default()
        };
        assert_eq!(
            settings.manifest_path(Path::new("/ws")),
            Some(PathBuf::from("/ws/ops/manifest.toml"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn set_key_writes_through_symlinked_settings() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("dotfiles-devbox.toml");
        std::fs::write(&real, "# mine\n").unwrap();
        let link = dir.path().join("config.toml");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        set_key(&link, &key("provision.volume"), &SettingValue::String("home".into())).unwrap();

        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(
            std::fs::read_to_string(&real).unwrap(),
            "# mine\n\n[provision]\nvolume = \"home\"\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn set_key_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[provision]\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        set_key(&path, &key("provision.no_secrets"), &SettingValue::Boolean(true)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
