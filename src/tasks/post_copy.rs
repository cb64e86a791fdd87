//! Effects applied to an entry after its content is in the volume.
//!
//! Flags are evaluated in [`Flag::EVALUATION_ORDER`]: the git filter runs
//! before secret hardening, and a git filter failure ends the entry before
//! any hardening happens.
use anyhow::Result;

use super::Context;
use crate::config::flags::Flag;
use crate::config::manifest::ManifestEntry;
use crate::logging::Log;
use crate::paths::normalize_target;
use crate::resources::git_filter::GitFilterResource;
use crate::resources::secret::SecretResource;
use crate::resources::{Applicable as _, ResourceChange};

/// The side effects a flag can trigger, addressed by volume-relative target.
#[cfg_attr(test, mockall::automock)]
pub trait PostCopyEffects {
    /// Strip host-only keys from the git configuration at `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or git fails.
    fn configure_git_filter(&self, target: &str) -> Result<ResourceChange>;

    /// Restrict `target` to owner-only access, recursing when `recursive`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is missing or the mode change fails.
    fn harden_secret(&self, target: &str, recursive: bool) -> Result<ResourceChange>;
}

/// Run the post-copy effects of `entry`.
///
/// A dry run returns [`ResourceChange::Skipped`] without invoking any
/// effect. Without `s` the result is [`ResourceChange::AlreadyCorrect`] when
/// no effect ran and [`ResourceChange::Applied`] otherwise; with `s` it is
/// the hardening result.
///
/// # Errors
///
/// Propagates the first failing effect.
pub fn apply(
    effects: &dyn PostCopyEffects,
    entry: &ManifestEntry,
    dry_run: bool,
    verbose: bool,
    log: &dyn Log,
) -> Result<ResourceChange> {
    if dry_run {
        return Ok(ResourceChange::Skipped {
            reason: "dry run".to_string(),
        });
    }

    let target = normalize_target(&entry.target);
    let unknown: String = entry.flags.unknown().iter().collect();
    if !unknown.is_empty() {
        log.detail(verbose, &format!("ignoring unknown flags '{unknown}' on {target}"));
    }
    let mut ran = false;
    for flag in entry.flags.iter() {
        match flag {
            Flag::GitFilter => {
                log.detail(verbose, &format!("filtering git config {target}"));
                effects.configure_git_filter(&target)?;
                ran = true;
            }
            Flag::Secret => {
                let recursive = entry.flags.contains(Flag::SecretDir);
                log.detail(verbose, &format!("hardening {target}"));
                return effects.harden_secret(&target, recursive);
            }
            // Consumed by `Flag::Secret`.
            Flag::SecretDir => {}
        }
    }

    Ok(if ran {
        ResourceChange::Applied
    } else {
        ResourceChange::AlreadyCorrect
    })
}

/// [`PostCopyEffects`] acting on the context's volume.
#[derive(Debug)]
pub struct VolumeEffects<'a> {
    ctx: &'a Context,
}

impl<'a> VolumeEffects<'a> {
    /// Effects against `ctx.volume`.
    #[must_use]
    pub const fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }
}

impl PostCopyEffects for VolumeEffects<'_> {
    fn configure_git_filter(&self, target: &str) -> Result<ResourceChange> {
        let path = self.ctx.volume.path_for(target)?;
        GitFilterResource::new(
            &path,
            self.ctx.config.settings.git.filter_keys.clone(),
            self.ctx.executor.as_ref(),
            self.ctx.fs_ops.as_ref(),
        )
        .apply()
    }

    fn harden_secret(&self, target: &str, recursive: bool) -> Result<ResourceChange> {
        let path = self.ctx.volume.path_for(target)?;
        SecretResource::new(path, recursive, self.ctx.fs_ops.as_ref()).apply()
    }
}
