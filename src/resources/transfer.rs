//! Copying a manifest entry's source into the volume.
//!
//! A [`TransferResource`] follows the same check-then-apply pattern as every
//! other resource: [`Resource::current_state`] compares source and
//! destination without touching either, [`Applicable::apply`] performs the
//! copy. Sources are followed through symlinks; destinations never are.
use anyhow::Result;
use std::path::{Path, PathBuf};

use super::error::ResourceError;
use super::helpers::fs as fs_helpers;
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::config::flags::Flag;
use crate::config::manifest::{EntryType, ManifestEntry};
use crate::operations::{EntryKind, FileSystemOps};
use crate::platform::Environment;

/// Copy of one manifest entry into the volume.
#[derive(Debug)]
pub struct TransferResource<'a> {
    entry: &'a ManifestEntry,
    /// Resolved host source path.
    pub source: PathBuf,
    /// Destination path inside the volume.
    pub destination: PathBuf,
    fs: &'a dyn FileSystemOps,
    env: &'a dyn Environment,
}

impl<'a> TransferResource<'a> {
    /// Create a transfer for `entry` from an already-resolved `source` to
    /// `destination`.
    #[must_use]
    pub const fn new(
        entry: &'a ManifestEntry,
        source: PathBuf,
        destination: PathBuf,
        fs: &'a dyn FileSystemOps,
        env: &'a dyn Environment,
    ) -> Self {
        Self {
            entry,
            source,
            destination,
            fs,
            env,
        }
    }

    /// The source's real path and kind, following symlinks; `None` if it
    /// does not exist (including dangling links).
    fn resolve_source(&self) -> Result<Option<(PathBuf, EntryKind)>, ResourceError> {
        let kind = self
            .fs
            .kind(&self.source)
            .map_err(|e| ResourceError::from_io(&self.source, e))?;
        match kind {
            None => Ok(None),
            Some(EntryKind::Symlink) => match dunce::canonicalize(&self.source) {
                Ok(real) => Ok(self
                    .fs
                    .kind(&real)
                    .map_err(|e| ResourceError::from_io(&real, e))?
                    .map(|k| (real, k))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(ResourceError::from_io(&self.source, e)),
            },
            Some(kind) => Ok(Some((self.source.clone(), kind))),
        }
    }

    /// Source path and kind, checked against the entry type.
    ///
    /// `Ok(None)` means the source is missing and the entry is optional.
    fn checked_source(&self) -> Result<Option<(PathBuf, EntryKind)>, ResourceError> {
        let Some((real, kind)) = self.resolve_source()? else {
            if self.entry.optional {
                return Ok(None);
            }
            return Err(ResourceError::SourceMissing {
                path: self.source.display().to_string(),
            });
        };
        let expected = match self.entry.entry_type {
            EntryType::Directory => EntryKind::Directory,
            EntryType::File | EntryType::Template => EntryKind::File,
        };
        if kind != expected {
            return Err(ResourceError::InvalidState {
                resource: self.description(),
                reason: format!(
                    "{} entry but source {} is not a {}",
                    self.entry.entry_type,
                    self.source.display(),
                    if expected == EntryKind::File { "file" } else { "directory" }
                ),
            });
        }
        Ok(Some((real, kind)))
    }

    fn rendered(&self, source: &Path) -> Result<Vec<u8>, ResourceError> {
        let bytes = self
            .fs
            .read(source)
            .map_err(|e| ResourceError::from_io(source, e))?;
        let text = String::from_utf8(bytes).map_err(|_| ResourceError::InvalidState {
            resource: self.description(),
            reason: format!("template {} is not valid UTF-8", source.display()),
        })?;
        Ok(render_template(&text, self.env).into_bytes())
    }

    fn mode_of(&self, path: &Path) -> Result<u32, ResourceError> {
        self.fs.mode(path).map_err(|e| ResourceError::from_io(path, e))
    }

    fn destination_kind(&self) -> Result<Option<EntryKind>, ResourceError> {
        self.fs
            .kind(&self.destination)
            .map_err(|e| ResourceError::from_io(&self.destination, e))
    }
}

impl Applicable for TransferResource<'_> {
    fn description(&self) -> String {
        format!(
            "{} {} -> {}",
            self.entry.entry_type,
            self.source.display(),
            self.destination.display()
        )
    }

    fn apply(&self) -> Result<ResourceChange> {
        let Some((source, _)) = self.checked_source()? else {
            return Ok(ResourceChange::Skipped {
                reason: format!("optional source missing: {}", self.source.display()),
            });
        };
        fs_helpers::ensure_parent_dir(self.fs, &self.destination)?;

        match self.entry.entry_type {
            EntryType::File => fs_helpers::copy_file(self.fs, &source, &self.destination)?,
            EntryType::Directory => {
                fs_helpers::copy_dir_recursive(self.fs, &source, &self.destination)?;
            }
            EntryType::Template => {
                let content = self.rendered(&source)?;
                let mode = self.mode_of(&source)?;
                fs_helpers::write_file(self.fs, &self.destination, &content, mode)?;
            }
        }
        Ok(ResourceChange::Applied)
    }
}

impl Resource for TransferResource<'_> {
    fn current_state(&self) -> Result<ResourceState> {
        let Some((source, _)) = self.checked_source()? else {
            return Ok(ResourceState::Invalid {
                reason: format!("optional source missing: {}", self.source.display()),
            });
        };
        let Some(dest_kind) = self.destination_kind()? else {
            return Ok(ResourceState::Missing);
        };

        let expected = match self.entry.entry_type {
            EntryType::File => self
                .fs
                .read(&source)
                .map_err(|e| ResourceError::from_io(&source, e))?,
            EntryType::Template => self.rendered(&source)?,
            // Directory trees are merged on every run.
            EntryType::Directory => {
                return Ok(ResourceState::Incorrect {
                    current: if dest_kind == EntryKind::Directory {
                        "existing directory".to_string()
                    } else {
                        "not a directory".to_string()
                    },
                });
            }
        };

        if fs_helpers::file_matches(self.fs, &self.destination, &expected)? {
            // Secret hardening owns the mode of `s` entries.
            if !self.entry.flags.contains(Flag::Secret) {
                let wanted = self.mode_of(&source)?;
                let current = self.mode_of(&self.destination)?;
                if wanted != current {
                    return Ok(ResourceState::Incorrect {
                        current: format!("mode {current:o}, want {wanted:o}"),
                    });
                }
            }
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Incorrect {
                current: match dest_kind {
                    EntryKind::File => "content differs".to_string(),
                    EntryKind::Directory => "directory".to_string(),
                    EntryKind::Symlink => "symlink".to_string(),
                },
            })
        }
    }
}

/// Replace `${NAME}` placeholders with environment values.
///
/// Names follow shell rules (`[A-Za-z_][A-Za-z0-9_]*`). Unknown variables
/// and anything that is not a well-formed placeholder are left verbatim.
///
/// ```
/// use devbox_cli::platform::MapEnvironment;
/// use devbox_cli::resources::transfer::render_template;
///
/// let env = MapEnvironment::new().with("USER", "dev");
/// assert_eq!(
///     render_template("user=${USER} shell=${SHELL} cost=$5", &env),
///     "user=dev shell=${SHELL} cost=$5"
/// );
/// ```
#[must_use]
pub fn render_template(text: &str, env: &dyn Environment) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let (before, after) = rest.split_at(start);
        out.push_str(before);
        let body = after.get(2..).unwrap_or_default();
        let replaced = body.find('}').and_then(|end| {
            let name = body.get(..end)?;
            if !is_variable_name(name) {
                return None;
            }
            env.var(name).map(|value| (value, end))
        });
        match replaced {
            Some((value, end)) => {
                out.push_str(&value);
                rest = body.get(end + 1..).unwrap_or_default();
            }
            None => {
                out.push_str("${");
                rest = body;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::flags::FlagSet;
    use crate::operations::SystemFileSystemOps;
    use crate::platform::MapEnvironment;

    const FS: SystemFileSystemOps = SystemFileSystemOps;

    fn entry(entry_type: EntryType, optional: bool) -> ManifestEntry {
        ManifestEntry {
            source: "src".to_string(),
            target: "dst".to_string(),
            container_link: None,
            flags: FlagSet::default(),
            disabled: false,
            entry_type,
            optional,
            source_file: None,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        src: PathBuf,
        dst: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("host").join("src");
        let dst = dir.path().join("volume").join("nested").join("dst");
        std::fs::create_dir_all(dir.path().join("host")).unwrap();
        Fixture { _dir: dir, src, dst }
    }

    #[test]
    fn file_copy_creates_parents_and_becomes_correct() {
        let fx = fixture();
        std::fs::write(&fx.src, "hello").unwrap();
        let entry = entry(EntryType::File, false);
        let env = MapEnvironment::new();
        let transfer = TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env);

        assert_eq!(transfer.current_state().unwrap(), ResourceState::Missing);
        assert_eq!(transfer.apply().unwrap(), ResourceChange::Applied);
        assert_eq!(std::fs::read_to_string(&fx.dst).unwrap(), "hello");
        assert_eq!(transfer.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn changed_content_is_incorrect() {
        let fx = fixture();
        std::fs::write(&fx.src, "new").unwrap();
        std::fs::create_dir_all(fx.dst.parent().unwrap()).unwrap();
        std::fs::write(&fx.dst, "old").unwrap();
        let entry = entry(EntryType::File, false);
        let env = MapEnvironment::new();
        let transfer = TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env);

        assert!(matches!(
            transfer.current_state().unwrap(),
            ResourceState::Incorrect { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn source_mode_change_is_incorrect_and_reapplied() {
        use std::os::unix::fs::PermissionsExt as _;

        let fx = fixture();
        std::fs::write(&fx.src, "#!/bin/sh\n").unwrap();
        FS.set_mode(&fx.src, 0o644).unwrap();
        let entry = entry(EntryType::File, false);
        let env = MapEnvironment::new();
        let transfer = TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env);
        transfer.apply().unwrap();

        std::fs::set_permissions(&fx.src, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            transfer.current_state().unwrap(),
            ResourceState::Incorrect {
                current: "mode 644, want 755".to_string()
            }
        );
        transfer.apply().unwrap();
        assert_eq!(FS.mode(&fx.dst).unwrap(), 0o755);
        assert_eq!(transfer.current_state().unwrap(), ResourceState::Correct);
    }

    #[cfg(unix)]
    #[test]
    fn secret_entry_mode_is_not_compared() {
        let fx = fixture();
        std::fs::write(&fx.src, "token").unwrap();
        FS.set_mode(&fx.src, 0o644).unwrap();
        let mut entry = entry(EntryType::File, false);
        entry.flags = FlagSet::parse("s").unwrap();
        let env = MapEnvironment::new();
        let transfer = TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env);
        transfer.apply().unwrap();
        FS.set_mode(&fx.dst, 0o600).unwrap();

        assert_eq!(transfer.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn optional_missing_source_is_skipped() {
        let fx = fixture();
        let entry = entry(EntryType::File, true);
        let env = MapEnvironment::new();
        let transfer = TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env);

        assert!(matches!(
            transfer.current_state().unwrap(),
            ResourceState::Invalid { .. }
        ));
        assert!(matches!(
            transfer.apply().unwrap(),
            ResourceChange::Skipped { .. }
        ));
        assert!(!fx.dst.parent().unwrap().exists());
    }

    #[test]
    fn required_missing_source_fails() {
        let fx = fixture();
        let entry = entry(EntryType::File, false);
        let env = MapEnvironment::new();
        let transfer = TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env);

        let err = transfer.current_state().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResourceError>(),
            Some(ResourceError::SourceMissing { .. })
        ));
    }

    #[test]
    fn file_entry_with_directory_source_is_invalid_state() {
        let fx = fixture();
        std::fs::create_dir(&fx.src).unwrap();
        let entry = entry(EntryType::File, false);
        let env = MapEnvironment::new();
        let transfer = TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env);

        let err = transfer.apply().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResourceError>(),
            Some(ResourceError::InvalidState { .. })
        ));
        assert!(!fx.dst.exists());
    }

    #[test]
    fn directory_entry_merges_into_existing_destination() {
        let fx = fixture();
        std::fs::create_dir_all(fx.src.join("sub")).unwrap();
        std::fs::write(fx.src.join("sub/a"), "a").unwrap();
        std::fs::create_dir_all(&fx.dst).unwrap();
        std::fs::write(fx.dst.join("unrelated"), "u").unwrap();
        let entry = entry(EntryType::Directory, false);
        let env = MapEnvironment::new();
        let transfer = TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env);

        assert!(transfer.needs_change().unwrap());
        transfer.apply().unwrap();

        assert_eq!(std::fs::read_to_string(fx.dst.join("sub/a")).unwrap(), "a");
        assert!(fx.dst.join("unrelated").exists());
    }

    #[test]
    fn directory_replaces_file_destination() {
        let fx = fixture();
        std::fs::create_dir_all(&fx.src).unwrap();
        std::fs::write(fx.src.join("a"), "a").unwrap();
        std::fs::create_dir_all(fx.dst.parent().unwrap()).unwrap();
        std::fs::write(&fx.dst, "stale file").unwrap();
        let entry = entry(EntryType::Directory, false);
        let env = MapEnvironment::new();

        TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env)
            .apply()
            .unwrap();

        assert!(fx.dst.is_dir());
        assert!(fx.dst.join("a").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_source_is_followed() {
        let fx = fixture();
        let real = fx.src.with_file_name("real");
        std::fs::write(&real, "through link").unwrap();
        std::os::unix::fs::symlink(&real, &fx.src).unwrap();
        let entry = entry(EntryType::File, false);
        let env = MapEnvironment::new();

        TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env)
            .apply()
            .unwrap();

        assert_eq!(FS.kind(&fx.dst).unwrap(), Some(EntryKind::File));
        assert_eq!(std::fs::read_to_string(&fx.dst).unwrap(), "through link");
    }

    #[cfg(unix)]
    #[test]
    fn template_renders_and_keeps_mode() {
        use std::os::unix::fs::PermissionsExt as _;
        let fx = fixture();
        std::fs::write(&fx.src, "export EDITOR=${EDITOR}\nexport X=${UNSET}\n").unwrap();
        std::fs::set_permissions(&fx.src, std::fs::Permissions::from_mode(0o640)).unwrap();
        let entry = entry(EntryType::Template, false);
        let env = MapEnvironment::new().with("EDITOR", "vim");
        let transfer = TransferResource::new(&entry, fx.src.clone(), fx.dst.clone(), &FS, &env);

        transfer.apply().unwrap();

        assert_eq!(
            std::fs::read_to_string(&fx.dst).unwrap(),
            "export EDITOR=vim\nexport X=${UNSET}\n"
        );
        assert_eq!(FS.mode(&fx.dst).unwrap(), 0o640);
        assert_eq!(transfer.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn render_template_edge_cases() {
        let env = MapEnvironment::new().with("A", "1").with("_B2", "2");
        assert_eq!(render_template("${A}${_B2}", &env), "12");
        assert_eq!(render_template("${", &env), "${");
        assert_eq!(render_template("${A", &env), "${A");
        assert_eq!(render_template("${1A}", &env), "${1A}");
        assert_eq!(render_template("${}", &env), "${}");
        assert_eq!(render_template("$${A}", &env), "$1");
        assert_eq!(render_template("no vars", &env), "no vars");
    }
}
