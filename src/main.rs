//! `devbox` binary: parse arguments, set up logging, dispatch.
use anyhow::Result;
use clap::Parser;
use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;

use devbox_cli::cli::{Cli, Command};
use devbox_cli::commands::{self, Session};
use devbox_cli::error::exit_code;
use devbox_cli::logging::{self, Logger};
use devbox_cli::tasks::CancelSignal;

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    let name = command_name(&args.command);
    logging::init_subscriber(args.verbose, name);
    let log = Arc::new(Logger::new(name));

    let cancel = CancelSignal::new();
    if let Err(e) = cancel.install_ctrlc_handler() {
        log.warn(&format!("Ctrl-C will not stop the run cleanly: {e:#}"));
    }
    let session = Session::new(Arc::clone(&log), args.verbose, cancel);

    match dispatch(&args, &session) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log.error(&format!("{e:#}"));
            ExitCode::from(exit_code(&e))
        }
    }
}

fn dispatch(args: &Cli, session: &Session) -> Result<()> {
    match &args.command {
        Command::Provision(opts) => commands::provision::run(&args.global, opts, session),
        Command::Harden(opts) => commands::harden::run(&args.global, opts, session),
        Command::Manifest(opts) => {
            commands::manifest::run(&args.global, opts, session, &mut std::io::stdout().lock())
        }
        Command::Config(opts) => commands::config::run(&args.global, opts, session),
        Command::Version => {
            let version = option_env!("DEVBOX_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
            writeln!(std::io::stdout().lock(), "devbox {version}")?;
            Ok(())
        }
    }
}

const fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Provision(_) => "provision",
        Command::Harden(_) => "harden",
        Command::Manifest(_) => "manifest",
        Command::Config(_) => "config",
        Command::Version => "version",
    }
}
