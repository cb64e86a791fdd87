//! Command-line interface definitions.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI entry point for the workspace provisioner.
#[derive(Parser, Debug)]
#[command(
    name = "devbox",
    about = "Provision container workspace volumes from a manifest",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Settings file (default: $XDG_CONFIG_HOME/devbox/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Workspace root (default: $DEVBOX_ROOT or the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub root: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy manifest entries into the volume and harden secrets
    Provision(ProvisionOpts),
    /// Re-run the secret permission sweep only
    Harden(HardenOpts),
    /// Print the parsed manifest, one entry per line
    Manifest(ManifestOpts),
    /// Edit the settings file
    Config(ConfigOpts),
    /// Print version information
    Version,
}

/// Manifest and destination selection.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetOpts {
    /// Manifest file or directory
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Container volume to provision (default: provision.volume)
    #[arg(long, value_name = "NAME", conflicts_with = "volume_root")]
    pub volume: Option<String>,

    /// Use a host directory as the volume instead of asking the runtime
    #[arg(long, value_name = "PATH")]
    pub volume_root: Option<PathBuf>,
}

/// Options for the `provision` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ProvisionOpts {
    /// Manifest and destination.
    #[command(flatten)]
    pub target: TargetOpts,

    /// Also provision entries marked disabled
    #[arg(long)]
    pub include_disabled: bool,

    /// Leave secret entries out and skip the secret sweep
    #[arg(long)]
    pub no_secrets: bool,
}

/// Options for the `harden` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct HardenOpts {
    /// Manifest and destination.
    #[command(flatten)]
    pub target: TargetOpts,

    /// Also sweep secret entries marked disabled
    #[arg(long)]
    pub include_disabled: bool,

    /// Skip the sweep entirely
    #[arg(long)]
    pub no_secrets: bool,
}

/// Options for the `manifest` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ManifestOpts {
    /// Manifest file or directory
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Include entries marked disabled
    #[arg(long)]
    pub include_disabled: bool,

    /// Append the declaring manifest file to each line
    #[arg(long)]
    pub source_file: bool,
}

/// Options for the `config` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConfigOpts {
    /// Edit to perform.
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Settings file edits.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Set a dotted key (e.g. provision.volume) to a value
    Set {
        /// Dotted key path
        key: String,
        /// `true`/`false` and integers are written bare, anything else as a string
        value: String,
    },
    /// Remove a root-level key
    Unset {
        /// Key name
        key: String,
    },
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_provision_with_volume() {
        let cli = Cli::parse_from(["devbox", "provision", "--volume", "home", "--no-secrets"]);
        let Command::Provision(opts) = cli.command else {
            panic!("expected provision");
        };
        assert_eq!(opts.target.volume.as_deref(), Some("home"));
        assert!(opts.no_secrets);
        assert!(!opts.include_disabled);
    }

    #[test]
    fn volume_and_volume_root_conflict() {
        let result = Cli::try_parse_from([
            "devbox",
            "provision",
            "--volume",
            "home",
            "--volume-root",
            "/srv/home",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_dry_run_short_and_after_subcommand() {
        let cli = Cli::parse_from(["devbox", "-d", "harden"]);
        assert!(cli.global.dry_run);
        let cli = Cli::parse_from(["devbox", "harden", "--dry-run"]);
        assert!(cli.global.dry_run);
    }

    #[test]
    fn parse_harden_include_disabled() {
        let cli = Cli::parse_from(["devbox", "harden", "--include-disabled"]);
        let Command::Harden(opts) = cli.command else {
            panic!("expected harden");
        };
        assert!(opts.include_disabled);
        assert!(!opts.no_secrets);
    }

    #[test]
    fn parse_manifest_flags() {
        let cli = Cli::parse_from(["devbox", "manifest", "--include-disabled", "--source-file"]);
        let Command::Manifest(opts) = cli.command else {
            panic!("expected manifest");
        };
        assert!(opts.include_disabled && opts.source_file);
    }

    #[test]
    fn parse_config_set_and_unset() {
        let cli = Cli::parse_from(["devbox", "config", "set", "provision.volume", "home"]);
        let Command::Config(opts) = cli.command else {
            panic!("expected config");
        };
        assert!(matches!(
            opts.action,
            ConfigAction::Set { ref key, ref value } if key == "provision.volume" && value == "home"
        ));

        let cli = Cli::parse_from(["devbox", "config", "unset", "manifest"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigOpts {
                action: ConfigAction::Unset { .. }
            })
        ));
    }

    #[test]
    fn parse_global_paths() {
        let cli = Cli::parse_from([
            "devbox",
            "--root",
            "/ws",
            "--config",
            "/etc/devbox.toml",
            "-v",
            "version",
        ]);
        assert_eq!(cli.global.root, Some(PathBuf::from("/ws")));
        assert_eq!(cli.global.config, Some(PathBuf::from("/etc/devbox.toml")));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Version));
    }
}
