//! Tracing subscriber: console formatter, run log layer, initialisation.
//!
//! Console lines go to stdout (stderr for warnings and errors) and are
//! coloured only when stdout is a terminal and `NO_COLOR` is unset. Every
//! event at debug level and above is also appended to the command's run log
//! as `<timestamp> <kind> <message>`.
use std::fs;
use std::io::{self, IsTerminal as _, Write as _};
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;

use super::files::{log_file_path, rotate, timestamp};
use super::style::{BOLD_BLUE, DIM, RED, YELLOW, paint, strip_ansi};
use crate::platform::{Environment, SystemEnvironment};

/// Tracing target for stage headers emitted by [`Logger::stage`](super::Logger::stage).
pub(super) const STAGE_TARGET: &str = "devbox::stage";
/// Tracing target for dry-run lines emitted by [`Logger::dry_run`](super::Logger::dry_run).
pub(super) const DRY_RUN_TARGET: &str = "devbox::dry_run";

/// Environment variable with console filter directives, e.g. `DEVBOX_LOG=debug`.
pub const FILTER_ENV: &str = "DEVBOX_LOG";

/// How an event is presented, derived from its level and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Stage,
    DryRun,
    Error,
    Warn,
    Info,
    Debug,
}

impl Kind {
    fn of(metadata: &tracing::Metadata<'_>) -> Self {
        match (*metadata.level(), metadata.target()) {
            (Level::ERROR, _) => Self::Error,
            (Level::WARN, _) => Self::Warn,
            (Level::INFO, STAGE_TARGET) => Self::Stage,
            (Level::INFO, DRY_RUN_TARGET) => Self::DryRun,
            (Level::INFO, _) => Self::Info,
            _ => Self::Debug,
        }
    }

    /// Column written in the run log.
    const fn tag(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::DryRun => "dry-run",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Run log line for an event.
fn log_line(kind: Kind, msg: &str) -> String {
    format!("{} {:<7} {}", timestamp(), kind.tag(), strip_ansi(msg))
}

#[derive(Default)]
struct Message(String);

impl tracing::field::Visit for Message {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.0);
        }
    }
}

fn message(event: &tracing::Event<'_>) -> String {
    let mut visitor = Message::default();
    event.record(&mut visitor);
    visitor.0
}

/// Layer appending every event to the run log.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Start the run log for `command` at `path`. The log of the previous
    /// run is kept next to it as `<path>.1`.
    pub(super) fn create(path: &Path, command: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        rotate(path)?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        let version =
            option_env!("DEVBOX_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        writeln!(file, "# devbox {version} {command} started {}", timestamp())?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let line = log_line(Kind::of(event.metadata()), &message(event));
        if let Ok(mut file) = self.file.lock() {
            writeln!(file, "{line}").ok();
        }
    }
}

/// Console style: `:: stage` headers, indented detail, `[dry-run]` markers
/// and `error:` / `warning:` prefixes.
struct ConsoleFormatter {
    color: bool,
}

impl ConsoleFormatter {
    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            paint(code, text)
        } else {
            text.to_string()
        }
    }

    fn line(&self, kind: Kind, msg: &str) -> String {
        let plain;
        let msg = if self.color {
            msg
        } else {
            plain = strip_ansi(msg);
            &plain
        };
        match kind {
            Kind::Error => format!("{} {msg}", self.paint(RED, "error:")),
            Kind::Warn => format!("{} {msg}", self.paint(YELLOW, "warning:")),
            Kind::Stage => self.paint(BOLD_BLUE, &format!(":: {msg}")),
            Kind::DryRun => format!("  {} {msg}", self.paint(YELLOW, "[dry-run]")),
            Kind::Info => format!("  {msg}"),
            Kind::Debug => format!("  {}", self.paint(DIM, msg)),
        }
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        writeln!(writer, "{}", self.line(Kind::of(event.metadata()), &message(event)))
    }
}

fn color_enabled(env: &dyn Environment) -> bool {
    env.var("NO_COLOR").is_none_or(|v| v.is_empty()) && io::stdout().is_terminal()
}

/// Console filter: debug with `-v`, else the `DEVBOX_LOG` directives, else info.
fn console_filter(verbose: bool, env: &dyn Environment) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    if verbose {
        return EnvFilter::new("debug");
    }
    env.var(FILTER_ENV)
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Initialise the global [`tracing`] subscriber.
///
/// Must be called once at program startup, before any logging. The run log
/// is skipped silently when its directory cannot be created.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let env = SystemEnvironment;
    let make_writer = io::stderr
        .with_max_level(Level::WARN)
        .and(io::stdout.with_min_level(Level::INFO));

    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter {
            color: color_enabled(&env),
        })
        .with_writer(make_writer)
        .with_filter(console_filter(verbose, &env));

    let file_layer = log_file_path(&env, command)
        .and_then(|path| FileLayer::create(&path, command).ok())
        .map(|layer| layer.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}
