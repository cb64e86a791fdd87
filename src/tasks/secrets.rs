//! Volume-wide sweep hardening every secret entry.
use anyhow::Result;

use super::{Context, Task, TaskResult, TaskStats};
use crate::config::flags::Flag;
use crate::config::manifest::ManifestEntry;
use crate::error::TaskError;
use crate::resources::error::ResourceError;
use crate::resources::secret::SecretResource;
use crate::resources::{Applicable as _, Resource as _, ResourceChange, ResourceState};

/// Re-harden all `s` entries.
#[derive(Debug, Clone, Copy)]
pub struct EnforceSecretPermissions {
    /// The sweep follows a sync in the same run. A dry-run sync copies
    /// nothing, so a missing required target is then reported as pending
    /// instead of failing.
    pub after_sync: bool,
}

impl EnforceSecretPermissions {
    /// Sweep run as the last step of `provision`.
    pub const AFTER_SYNC: Self = Self { after_sync: true };
    /// Sweep run on its own by `harden`.
    pub const STANDALONE: Self = Self { after_sync: false };
}

impl Task for EnforceSecretPermissions {
    fn name(&self) -> &str {
        "Harden secret paths"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.config
            .entries
            .iter()
            .any(|e| e.flags.contains(Flag::Secret))
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        if ctx.no_secrets {
            return Ok(TaskResult::Skipped("secrets disabled".to_string()));
        }
        let stats = sweep(ctx, &ctx.config.entries, self.after_sync)?;
        Ok(stats.finish(ctx))
    }
}

/// Harden every `s` entry of `entries` inside the context's volume.
///
/// With `no_secrets` nothing is touched and the sweep succeeds. Paths that
/// are already owner-only count as ok, and missing targets of optional
/// entries are skipped. A dry run fails on the same missing targets a real
/// run would. Failures do not stop the sweep; they are collected and
/// reported together at the end.
///
/// # Errors
///
/// Returns [`TaskError::SecretSweepFailed`] if any entry could not be
/// hardened.
pub fn enforce_secret_path_permissions(
    ctx: &Context,
    entries: &[ManifestEntry],
    no_secrets: bool,
) -> Result<TaskStats> {
    if no_secrets {
        ctx.log.debug("secret sweep disabled");
        return Ok(TaskStats::new());
    }
    sweep(ctx, entries, false)
}

fn sweep(ctx: &Context, entries: &[ManifestEntry], after_sync: bool) -> Result<TaskStats> {
    let mut stats = TaskStats::new();
    let mut failures = Vec::new();
    for entry in entries.iter().filter(|e| e.flags.contains(Flag::Secret)) {
        if let Err(e) = sweep_entry(ctx, entry, after_sync, &mut stats) {
            ctx.log.error(&format!("{}: {e:#}", entry.target));
            failures.push(format!("{}: {e:#}", entry.target));
        }
    }

    if failures.is_empty() {
        Ok(stats)
    } else {
        Err(TaskError::SecretSweepFailed {
            failed: failures.len(),
            details: failures.join("; "),
        }
        .into())
    }
}

fn sweep_entry(
    ctx: &Context,
    entry: &ManifestEntry,
    after_sync: bool,
    stats: &mut TaskStats,
) -> Result<()> {
    let path = ctx.target_path(entry)?;
    let secret = SecretResource::new(path, entry.flags.contains(Flag::SecretDir), ctx.fs_ops.as_ref());
    match secret.current_state()? {
        ResourceState::Correct => stats.already_ok += 1,
        ResourceState::Missing if entry.optional => {
            ctx.log
                .detail(ctx.verbose, &format!("skipping missing optional secret {}", entry.target));
            stats.skipped += 1;
        }
        ResourceState::Invalid { reason } => {
            ctx.log.detail(ctx.verbose, &format!("skipping {}: {reason}", entry.target));
            stats.skipped += 1;
        }
        ResourceState::Missing if ctx.dry_run && !after_sync => {
            return Err(ResourceError::SecretMissing {
                path: secret.path.display().to_string(),
            }
            .into());
        }
        ResourceState::Missing if ctx.dry_run => {
            ctx.log.dry_run(&format!("would {} after copying", secret.description()));
            stats.changed += 1;
        }
        ResourceState::Incorrect { .. } if ctx.dry_run => {
            ctx.log.dry_run(&format!("would {}", secret.description()));
            stats.changed += 1;
        }
        ResourceState::Missing | ResourceState::Incorrect { .. } => match secret.apply()? {
            ResourceChange::Skipped { reason } => {
                ctx.log.detail(ctx.verbose, &format!("skipping {}: {reason}", entry.target));
                stats.skipped += 1;
            }
            ResourceChange::Applied | ResourceChange::AlreadyCorrect => {
                ctx.log.detail(ctx.verbose, &format!("hardened {}", entry.target));
                stats.changed += 1;
            }
        },
    }
    Ok(())
}

#[cfg(all(test, unix))]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::error::{EXIT_RESOURCE, exit_code};
    use crate::operations::FailingModeOps;
    use crate::tasks::RunOptions;
    use crate::tasks::test_helpers::{TestRun, entry};
    use std::sync::Arc;

    fn secret_run() -> TestRun {
        let mut optional = entry("dotfiles/gone", "home/.gone", "s");
        optional.optional = true;
        let run = TestRun::new(vec![
            entry("dotfiles/token", "home/.token", "s"),
            entry("dotfiles/ssh", "home/.ssh", "sd"),
            entry("dotfiles/plain", "home/.plain", ""),
            optional,
        ]);
        run.write_volume("home/.token", "t", 0o644);
        run.write_volume("home/.ssh/id", "k", 0o644);
        run.write_volume("home/.plain", "p", 0o644);
        run
    }

    #[test]
    fn sweep_hardens_secret_entries_only() {
        let run = secret_run();
        let ctx = run.context(RunOptions::default());

        let stats = enforce_secret_path_permissions(&ctx, &ctx.config.entries, false).unwrap();

        assert_eq!((stats.changed, stats.skipped), (2, 1));
        assert_eq!(run.volume_mode("home/.token"), 0o600);
        assert_eq!(run.volume_mode("home/.ssh"), 0o700);
        assert_eq!(run.volume_mode("home/.ssh/id"), 0o600);
        assert_eq!(run.volume_mode("home/.plain"), 0o644);

        let again = enforce_secret_path_permissions(&ctx, &ctx.config.entries, false).unwrap();
        assert_eq!((again.changed, again.already_ok), (0, 2));
    }

    #[test]
    fn no_secrets_changes_nothing() {
        let run = secret_run();
        let ctx = run.context(RunOptions::default());

        let stats = enforce_secret_path_permissions(&ctx, &ctx.config.entries, true).unwrap();

        assert_eq!(stats.changed + stats.already_ok + stats.skipped, 0);
        assert_eq!(run.volume_mode("home/.token"), 0o644);
    }

    #[test]
    fn dry_run_reports_without_changing_modes() {
        let run = secret_run();
        let (ctx, log) = run.context_with_recording_log(RunOptions {
            dry_run: true,
            ..RunOptions::default()
        });

        let stats = enforce_secret_path_permissions(&ctx, &ctx.config.entries, false).unwrap();

        assert_eq!(stats.changed, 2);
        assert_eq!(run.volume_mode("home/.token"), 0o644);
        assert_eq!(log.messages("dry_run").len(), 2);
    }

    #[test]
    fn failures_are_aggregated() {
        let run = secret_run();
        let ctx = run.context(RunOptions::default()).with_fs_ops(Arc::new(FailingModeOps {
            kind: std::io::ErrorKind::PermissionDenied,
        }));

        let err = enforce_secret_path_permissions(&ctx, &ctx.config.entries, false).unwrap_err();

        match err.downcast_ref::<TaskError>() {
            Some(TaskError::SecretSweepFailed { failed, details }) => {
                assert_eq!(*failed, 2);
                assert!(details.contains("home/.token"));
                assert!(details.contains("home/.ssh"));
                assert!(details.contains("permission denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(exit_code(&err), EXIT_RESOURCE);
    }

    #[test]
    fn required_missing_secret_fails() {
        let run = TestRun::new(vec![entry("dotfiles/token", "home/.token", "s")]);
        let ctx = run.context(RunOptions::default());

        let err = enforce_secret_path_permissions(&ctx, &ctx.config.entries, false).unwrap_err();
        assert!(format!("{err:#}").contains("secret path does not exist"));
    }

    #[test]
    fn dry_run_fails_on_missing_required_secret() {
        let run = TestRun::new(vec![entry("dotfiles/token", "home/.token", "s")]);
        let real = run.context(RunOptions::default());
        let dry = run.context(RunOptions {
            dry_run: true,
            ..RunOptions::default()
        });

        let real_err =
            enforce_secret_path_permissions(&real, &real.config.entries, false).unwrap_err();
        let dry_err =
            enforce_secret_path_permissions(&dry, &dry.config.entries, false).unwrap_err();

        assert_eq!(exit_code(&dry_err), exit_code(&real_err));
        assert!(format!("{dry_err:#}").contains("secret path does not exist"));
        assert!(EnforceSecretPermissions::STANDALONE.run(&dry).is_err());
    }

    #[test]
    fn dry_run_after_sync_reports_pending_secret() {
        let run = TestRun::new(vec![entry("dotfiles/token", "home/.token", "s")]);
        let (ctx, log) = run.context_with_recording_log(RunOptions {
            dry_run: true,
            ..RunOptions::default()
        });

        EnforceSecretPermissions::AFTER_SYNC.run(&ctx).unwrap();

        let messages = log.messages("dry_run");
        assert_eq!(messages.len(), 1);
        assert!(messages[0].ends_with("after copying"));
    }

    #[test]
    fn task_is_skipped_with_no_secrets() {
        let run = secret_run();
        let ctx = run.context(RunOptions {
            no_secrets: true,
            ..RunOptions::default()
        });
        assert!(EnforceSecretPermissions::STANDALONE.should_run(&ctx));
        assert!(matches!(
            EnforceSecretPermissions::STANDALONE.run(&ctx).unwrap(),
            TaskResult::Skipped(_)
        ));
    }
}
