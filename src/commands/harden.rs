//! `devbox harden`: run only the volume-wide secret sweep.
use anyhow::Result;

use super::{CommandSetup, Session, resolve_volume, run_tasks_to_completion};
use crate::cli::{GlobalOpts, HardenOpts};
use crate::config::manifest::ParseOptions;
use crate::tasks::secrets::EnforceSecretPermissions;
use crate::tasks::{RunOptions, Task};

/// Run the harden command.
///
/// # Errors
///
/// Returns an error if loading fails, the volume cannot be resolved, or any
/// secret path cannot be hardened.
pub fn run(global: &GlobalOpts, opts: &HardenOpts, session: &Session) -> Result<()> {
    session.log.stage("Loading manifest");
    let setup = CommandSetup::init(
        global,
        session,
        opts.target.manifest.as_deref(),
        ParseOptions {
            include_disabled: opts.include_disabled,
            ..ParseOptions::default()
        },
    )?;
    let settings = &setup.config.settings;
    session.log.info(&format!(
        "{} entries from {}",
        setup.config.entries.len(),
        setup.config.manifest_path.display()
    ));
    let volume = resolve_volume(&opts.target, settings, session.executor.as_ref())?;

    let ctx = setup.context(
        session,
        volume,
        RunOptions {
            dry_run: global.dry_run,
            verbose: session.verbose,
            no_secrets: opts.no_secrets || settings.provision.no_secrets,
        },
    );
    let sweep: &dyn Task = &EnforceSecretPermissions::STANDALONE;
    run_tasks_to_completion([sweep], &ctx, &session.log)
}
