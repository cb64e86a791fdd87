//! Copy every manifest entry into the volume, in manifest order.
use anyhow::{Context as _, Result};

use super::post_copy::{self, PostCopyEffects, VolumeEffects};
use super::{Context, Task, TaskResult, TaskStats};
use crate::config::flags::Flag;
use crate::config::manifest::ManifestEntry;
use crate::error::TaskError;
use crate::resources::transfer::TransferResource;
use crate::resources::{Applicable as _, Resource as _, ResourceChange, ResourceState};

/// What happened to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Changed,
    AlreadyOk,
    Skipped,
}

/// Transfer each entry, then apply its post-copy effects.
///
/// The first failing entry fails the task; entries before it stay applied.
#[derive(Debug)]
pub struct SyncEntries;

impl Task for SyncEntries {
    fn name(&self) -> &str {
        "Sync manifest entries"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        !ctx.config.entries.is_empty()
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let effects = VolumeEffects::new(ctx);
        let stats = sync_entries(ctx, &effects, &ctx.config.entries)?;
        Ok(stats.finish(ctx))
    }
}

/// Apply `entries` to the context's volume using `effects` for flags.
///
/// # Errors
///
/// Returns [`TaskError::Cancelled`] when the cancel signal is set between
/// entries, or the first entry failure with context naming the entry index,
/// target, and step.
pub fn sync_entries(
    ctx: &Context,
    effects: &dyn PostCopyEffects,
    entries: &[ManifestEntry],
) -> Result<TaskStats> {
    let mut stats = TaskStats::new();
    let total = entries.len();
    for (index, entry) in entries.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            return Err(TaskError::Cancelled {
                completed: index,
                total,
            }
            .into());
        }
        if ctx.no_secrets && entry.flags.contains(Flag::Secret) {
            ctx.log
                .detail(ctx.verbose, &format!("skipping secret entry {}", entry.target));
            stats.skipped += 1;
            continue;
        }
        match sync_entry(ctx, effects, index + 1, entry)? {
            Outcome::Changed => stats.changed += 1,
            Outcome::AlreadyOk => stats.already_ok += 1,
            Outcome::Skipped => stats.skipped += 1,
        }
    }
    Ok(stats)
}

fn sync_entry(
    ctx: &Context,
    effects: &dyn PostCopyEffects,
    n: usize,
    entry: &ManifestEntry,
) -> Result<Outcome> {
    let target = &entry.target;
    let step = |name: &str| format!("entry {n} ({target}): {name} failed");

    let destination = ctx.target_path(entry).with_context(|| step("resolve"))?;
    let transfer = TransferResource::new(
        entry,
        ctx.source_path(entry),
        destination,
        ctx.fs_ops.as_ref(),
        ctx.env.as_ref(),
    );

    let copied = match transfer.current_state().with_context(|| step("copy"))? {
        ResourceState::Invalid { reason } => {
            ctx.log.detail(ctx.verbose, &format!("skipping {target}: {reason}"));
            return Ok(Outcome::Skipped);
        }
        ResourceState::Correct => {
            ctx.log.debug(&format!("ok: {target}"));
            false
        }
        ResourceState::Missing | ResourceState::Incorrect { .. } => {
            if ctx.dry_run {
                ctx.log.dry_run(&format!("would copy {}", transfer.description()));
            } else {
                transfer.apply().with_context(|| step("copy"))?;
                ctx.log
                    .detail(ctx.verbose, &format!("copied {}", transfer.description()));
            }
            true
        }
    };

    if ctx.dry_run && entry.flags.iter().next().is_some() {
        ctx.log
            .dry_run(&format!("would apply flags '{}' to {target}", entry.flags));
    }
    let post = post_copy::apply(effects, entry, ctx.dry_run, ctx.verbose, ctx.log.as_ref())
        .with_context(|| step("post-copy"))?;

    Ok(if copied || post == ResourceChange::Applied {
        Outcome::Changed
    } else {
        Outcome::AlreadyOk
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::error::{EXIT_CANCELLED, EXIT_RESOURCE, exit_code};
    use crate::resources::error::ResourceError;
    use crate::tasks::RunOptions;
    use crate::tasks::post_copy::MockPostCopyEffects;
    use crate::tasks::test_helpers::{TestRun, entry};

    fn no_effects() -> MockPostCopyEffects {
        let mut effects = MockPostCopyEffects::new();
        effects.expect_configure_git_filter().times(0);
        effects.expect_harden_secret().times(0);
        effects
    }

    #[test]
    fn copies_entries_in_order_and_is_idempotent() {
        let run = TestRun::new(vec![
            entry("dotfiles/bashrc", "home/.bashrc", ""),
            entry("dotfiles/bashrc", "home/.bashrc", ""),
            entry("~/.profile", "home/.profile", ""),
        ]);
        run.write_workspace("dotfiles/bashrc", "alias ll='ls -l'\n");
        run.write_home(".profile", "export PATH\n");
        let ctx = run.context(RunOptions::default());

        let stats = sync_entries(&ctx, &no_effects(), &ctx.config.entries).unwrap();
        assert_eq!((stats.changed, stats.already_ok), (2, 1));
        assert_eq!(run.read_volume("home/.bashrc"), "alias ll='ls -l'\n");
        assert_eq!(run.read_volume("home/.profile"), "export PATH\n");

        let again = sync_entries(&ctx, &no_effects(), &ctx.config.entries).unwrap();
        assert_eq!((again.changed, again.already_ok), (0, 3));
    }

    #[test]
    fn dry_run_mutates_nothing() {
        let run = TestRun::new(vec![entry("dotfiles/bashrc", "home/.bashrc", "s")]);
        run.write_workspace("dotfiles/bashrc", "x");
        let (ctx, log) = run.context_with_recording_log(RunOptions {
            dry_run: true,
            ..RunOptions::default()
        });

        let stats = sync_entries(&ctx, &no_effects(), &ctx.config.entries).unwrap();

        assert_eq!(stats.changed, 1);
        assert!(!run.volume_root().join("home").exists());
        let planned = log.messages("dry_run");
        assert!(planned[0].starts_with("would copy file"));
        assert_eq!(planned[1], "would apply flags 's' to home/.bashrc");
    }

    #[test]
    fn optional_missing_source_is_skipped_without_effects() {
        let mut e = entry("dotfiles/missing", "home/.missing", "s");
        e.optional = true;
        let run = TestRun::new(vec![e]);
        let ctx = run.context(RunOptions::default());

        let stats = sync_entries(&ctx, &no_effects(), &ctx.config.entries).unwrap();
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn required_missing_source_names_entry_and_step() {
        let run = TestRun::new(vec![entry("dotfiles/missing", "home/.missing", "")]);
        let ctx = run.context(RunOptions::default());

        let err = sync_entries(&ctx, &no_effects(), &ctx.config.entries).unwrap_err();
        assert!(format!("{err:#}").contains("entry 1 (home/.missing): copy failed"));
        assert!(matches!(
            err.root_cause().downcast_ref::<ResourceError>(),
            Some(ResourceError::SourceMissing { .. })
        ));
        assert_eq!(exit_code(&err), EXIT_RESOURCE);
    }

    #[test]
    fn stops_at_first_failure_keeping_earlier_entries() {
        let run = TestRun::new(vec![
            entry("dotfiles/a", "home/a", ""),
            entry("dotfiles/b", "home/.gitconfig", "g"),
            entry("dotfiles/a", "home/c", ""),
        ]);
        run.write_workspace("dotfiles/a", "a");
        run.write_workspace("dotfiles/b", "b");
        let ctx = run.context(RunOptions::default());
        let mut effects = MockPostCopyEffects::new();
        effects
            .expect_configure_git_filter()
            .times(1)
            .returning(|_| anyhow::bail!("git exploded"));

        let err = sync_entries(&ctx, &effects, &ctx.config.entries).unwrap_err();

        assert!(format!("{err:#}").contains("entry 2 (home/.gitconfig): post-copy failed"));
        assert!(run.volume_root().join("home/a").exists());
        assert!(run.volume_root().join("home/.gitconfig").exists());
        assert!(!run.volume_root().join("home/c").exists());
    }

    #[test]
    fn no_secrets_leaves_secret_entries_out() {
        let run = TestRun::new(vec![
            entry("dotfiles/token", "home/.token", "s"),
            entry("dotfiles/a", "home/a", ""),
        ]);
        run.write_workspace("dotfiles/token", "t");
        run.write_workspace("dotfiles/a", "a");
        let ctx = run.context(RunOptions {
            no_secrets: true,
            ..RunOptions::default()
        });

        let stats = sync_entries(&ctx, &no_effects(), &ctx.config.entries).unwrap();

        assert_eq!((stats.changed, stats.skipped), (1, 1));
        assert!(!run.volume_root().join("home/.token").exists());
    }

    #[test]
    fn cancellation_is_checked_between_entries() {
        let run = TestRun::new(vec![entry("dotfiles/a", "home/a", "")]);
        run.write_workspace("dotfiles/a", "a");
        let ctx = run.context(RunOptions::default());
        ctx.cancel.cancel();

        let err = sync_entries(&ctx, &no_effects(), &ctx.config.entries).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::Cancelled {
                completed: 0,
                total: 1
            })
        ));
        assert_eq!(exit_code(&err), EXIT_CANCELLED);
        assert!(!run.volume_root().join("home/a").exists());
    }

    #[cfg(unix)]
    #[test]
    fn task_hardens_secret_entries_in_volume() {
        let run = TestRun::new(vec![entry("dotfiles/token", "home/.token", "s")]);
        run.write_workspace("dotfiles/token", "t");
        let ctx = run.context(RunOptions::default());

        let result = SyncEntries.run(&ctx).unwrap();

        assert!(matches!(result, TaskResult::Ok));
        assert_eq!(run.volume_mode("home/.token"), 0o600);
    }
}
