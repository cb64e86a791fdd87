//! `devbox provision`: sync the manifest into the volume, then sweep secrets.
use anyhow::Result;

use super::{CommandSetup, Session, resolve_volume, run_tasks_to_completion};
use crate::cli::{GlobalOpts, ProvisionOpts};
use crate::config::manifest::ParseOptions;
use crate::tasks::{self, RunOptions, Task};

/// Run the provision command.
///
/// # Errors
///
/// Returns an error if loading fails, the volume cannot be resolved, or a
/// task fails.
pub fn run(global: &GlobalOpts, opts: &ProvisionOpts, session: &Session) -> Result<()> {
    let version = option_env!("DEVBOX_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    session.log.info(&format!("devbox {version}"));

    session.log.stage("Loading manifest");
    let setup = CommandSetup::init(
        global,
        session,
        opts.target.manifest.as_deref(),
        ParseOptions {
            include_disabled: opts.include_disabled,
            emit_source_file: false,
        },
    )?;
    let settings = &setup.config.settings;
    session.log.info(&format!(
        "{} entries from {}",
        setup.config.entries.len(),
        setup.config.manifest_path.display()
    ));
    let volume = resolve_volume(&opts.target, settings, session.executor.as_ref())?;
    session.log.info(&format!(
        "volume: {} ({})",
        volume.name,
        volume.root.display()
    ));

    let ctx = setup.context(
        session,
        volume,
        RunOptions {
            dry_run: global.dry_run,
            verbose: session.verbose,
            no_secrets: opts.no_secrets || settings.provision.no_secrets,
        },
    );
    let all_tasks = tasks::provision_tasks();
    run_tasks_to_completion(all_tasks.iter().map(AsRef::<dyn Task>::as_ref), &ctx, &session.log)
}
