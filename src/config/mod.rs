//! Settings and manifest loading.
//!
//! - [`settings`]: typed user settings plus comment-preserving edits
//! - [`editor`]: the line-based key editor behind those edits
//! - [`manifest`] and [`flags`]: the provisioning manifest
pub mod editor;
pub mod flags;
pub mod manifest;
pub mod settings;
pub mod toml_loader;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use manifest::{ManifestEntry, ParseOptions};
use settings::Settings;

/// Manifest location used when neither the CLI nor settings name one.
pub const DEFAULT_MANIFEST: &str = ".devbox/manifest.toml";

/// Everything a provisioning run reads before touching the volume.
#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace root; relative manifest sources resolve against it.
    pub root: PathBuf,
    /// User settings (defaults when the file is missing).
    pub settings: Settings,
    /// Manifest file or directory that was parsed.
    pub manifest_path: PathBuf,
    /// Parsed entries, in declaration order.
    pub entries: Vec<ManifestEntry>,
}

impl Config {
    /// Parse the manifest for already loaded `settings`.
    ///
    /// The manifest is `manifest_override` when given, otherwise the
    /// settings' `manifest` key relative to `root`, otherwise
    /// [`DEFAULT_MANIFEST`] under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is invalid.
    pub fn with_settings(
        root: &Path,
        settings: Settings,
        manifest_override: Option<&Path>,
        opts: ParseOptions,
    ) -> Result<Self> {
        let manifest_path = Self::manifest_location(root, &settings, manifest_override);
        let entries = manifest::parse(&manifest_path, opts)
            .with_context(|| format!("loading manifest {}", manifest_path.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            settings,
            manifest_path,
            entries,
        })
    }

    /// Resolve the manifest path without loading it.
    #[must_use]
    pub fn manifest_location(
        root: &Path,
        settings: &Settings,
        manifest_override: Option<&Path>,
    ) -> PathBuf {
        manifest_override.map_or_else(
            || {
                settings
                    .manifest_path(root)
                    .unwrap_or_else(|| root.join(DEFAULT_MANIFEST))
            },
            Path::to_path_buf,
        )
    }
}
