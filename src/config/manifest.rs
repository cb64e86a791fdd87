//! Provisioning manifest parsing.
//!
//! A manifest is a TOML document with one `[[entry]]` table per mapping:
//!
//! ```toml
//! include = ["secrets.toml"]
//!
//! [[entry]]
//! source = "~/.gitconfig"
//! target = "home/.gitconfig"
//! container_link = "/home/dev/.gitconfig"
//! flags = "g"
//!
//! [[entry]]
//! source = "~/.ssh"
//! target = "home/.ssh"
//! type = "directory"
//! flags = "sd"
//! optional = true
//! ```
//!
//! Included files are expanded before the including file's own entries so
//! the including file can override targets. A directory path loads every
//! `*.toml` file in it, sorted by file name.
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::flags::{FlagError, FlagSet};
use crate::paths::{self, PathError};

/// How a source is copied into the volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryType {
    /// A single regular file.
    #[default]
    File,
    /// A directory tree, copied recursively.
    Directory,
    /// A text file with `${VAR}` placeholders rendered from the environment.
    Template,
}

impl EntryType {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "file" => Some(Self::File),
            "directory" | "dir" => Some(Self::Directory),
            "template" => Some(Self::Template),
            _ => None,
        }
    }

    /// Name used in manifests and diagnostic output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Template => "template",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source → target mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Host path; may start with `~`, relative paths anchor at the workspace.
    pub source: String,
    /// Path inside the volume, slash-normalized without a leading slash.
    pub target: String,
    /// Path inside the running container; carried for display only.
    pub container_link: Option<String>,
    /// Post-copy behavior flags.
    pub flags: FlagSet,
    /// Whether the entry is disabled.
    pub disabled: bool,
    /// Copy mode.
    pub entry_type: EntryType,
    /// Whether a missing source is tolerated.
    pub optional: bool,
    /// Declaring manifest file, when provenance was requested.
    pub source_file: Option<PathBuf>,
}

/// Options for [`parse`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Return disabled entries (with `disabled = true`) instead of dropping them.
    pub include_disabled: bool,
    /// Record the declaring file in [`ManifestEntry::source_file`].
    pub emit_source_file: bool,
}

/// Manifest input errors. These are data errors: they name the file and,
/// for entry problems, the entry's 1-based position in that file.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file or directory could not be read.
    #[error("cannot read manifest {}: {source}", path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unexpected keys.
    #[error("invalid manifest {}: {message}", path.display())]
    Syntax {
        /// Offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A required field is absent or empty.
    #[error("{}: entry {index} is missing required field '{field}'", path.display())]
    MissingField {
        /// Offending file.
        path: PathBuf,
        /// 1-based entry index within the file.
        index: usize,
        /// Field name.
        field: &'static str,
    },

    /// A field has an unusable value.
    #[error("{}: entry {index} has invalid {field}: {reason}", path.display())]
    InvalidField {
        /// Offending file.
        path: PathBuf,
        /// 1-based entry index within the file.
        index: usize,
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The flag string is malformed or an invalid combination.
    #[error("{}: entry {index} has invalid flags: {source}", path.display())]
    InvalidFlags {
        /// Offending file.
        path: PathBuf,
        /// 1-based entry index within the file.
        index: usize,
        /// Flag parse error.
        source: FlagError,
    },

    /// A file includes itself, directly or indirectly.
    #[error("manifest include cycle at {}", path.display())]
    IncludeCycle {
        /// File that closed the cycle.
        path: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDocument {
    #[serde(default)]
    include: Vec<String>,
    #[serde(default, rename = "entry")]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    source: Option<String>,
    target: Option<String>,
    container_link: Option<String>,
    #[serde(default)]
    flags: String,
    #[serde(default)]
    disabled: bool,
    #[serde(rename = "type")]
    entry_type: Option<String>,
    #[serde(default)]
    optional: bool,
}

/// Parse the manifest at `path` (a file or a directory of `*.toml` files).
///
/// Entries come back in declaration order. Parsing is deterministic: the
/// same input always yields the same sequence.
///
/// # Errors
///
/// Returns a [`ManifestError`] for unreadable files, syntax errors, missing
/// `source`/`target`, invalid `type` or target, invalid flags, and include
/// cycles.
pub fn parse(path: &Path, opts: ParseOptions) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut entries = Vec::new();
    let mut stack = Vec::new();
    if path.is_dir() {
        for file in toml_files_in(path)? {
            load_file(&file, opts, &mut stack, &mut entries)?;
        }
    } else {
        load_file(path, opts, &mut stack, &mut entries)?;
    }
    Ok(entries)
}

/// Render an entry as one pipe-delimited diagnostic line:
/// `source|target|container_link|flags|disabled|type|optional`, followed by
/// `|source_file` when provenance is present.
#[must_use]
pub fn render_line(entry: &ManifestEntry) -> String {
    let mut line = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        entry.source,
        entry.target,
        entry.container_link.as_deref().unwrap_or_default(),
        entry.flags,
        entry.disabled,
        entry.entry_type,
        entry.optional,
    );
    if let Some(file) = &entry.source_file {
        line.push('|');
        line.push_str(&file.display().to_string());
    }
    line
}

fn toml_files_in(dir: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    let io_err = |source: std::io::Error| ManifestError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_file(
    path: &Path,
    opts: ParseOptions,
    stack: &mut Vec<PathBuf>,
    out: &mut Vec<ManifestEntry>,
) -> Result<(), ManifestError> {
    let canonical = dunce::canonicalize(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if stack.contains(&canonical) {
        return Err(ManifestError::IncludeCycle {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = parse_document(&content, path)?;

    stack.push(canonical);
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for include in &doc.include {
        load_file(&base.join(include), opts, stack, out)?;
    }
    stack.pop();

    out.extend(convert_entries(doc.entries, path, opts)?);
    Ok(())
}

fn parse_document(content: &str, path: &Path) -> Result<ManifestDocument, ManifestError> {
    toml::from_str(content).map_err(|e| ManifestError::Syntax {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })
}

fn convert_entries(
    raw: Vec<RawEntry>,
    path: &Path,
    opts: ParseOptions,
) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut entries = Vec::with_capacity(raw.len());
    for (i, raw) in raw.into_iter().enumerate() {
        let entry = convert_entry(raw, path, i + 1, opts)?;
        if entry.disabled && !opts.include_disabled {
            continue;
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn convert_entry(
    raw: RawEntry,
    path: &Path,
    index: usize,
    opts: ParseOptions,
) -> Result<ManifestEntry, ManifestError> {
    let required = |value: Option<String>, field: &'static str| {
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ManifestError::MissingField {
                path: path.to_path_buf(),
                index,
                field,
            })
    };
    let source = required(raw.source, "source")?;
    let target = required(raw.target, "target")?;

    paths::relative_target(&target).map_err(|e: PathError| ManifestError::InvalidField {
        path: path.to_path_buf(),
        index,
        field: "target",
        reason: e.to_string(),
    })?;

    let entry_type = match raw.entry_type.as_deref() {
        None => EntryType::default(),
        Some(name) => EntryType::parse(name).ok_or_else(|| ManifestError::InvalidField {
            path: path.to_path_buf(),
            index,
            field: "type",
            reason: format!("unknown type '{name}' (expected file, directory, or template)"),
        })?,
    };

    let flags = FlagSet::parse(&raw.flags).map_err(|source| ManifestError::InvalidFlags {
        path: path.to_path_buf(),
        index,
        source,
    })?;

    Ok(ManifestEntry {
        source,
        target: paths::normalize_target(&target),
        container_link: raw.container_link.filter(|l| !l.is_empty()),
        flags,
        disabled: raw.disabled,
        entry_type,
        optional: raw.optional,
        source_file: opts.emit_source_file.then(|| path.to_path_buf()),
    })
}
