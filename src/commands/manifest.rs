//! `devbox manifest`: print the parsed manifest.
use anyhow::Result;
use std::io::Write;

use super::{CommandSetup, Session};
use crate::cli::{GlobalOpts, ManifestOpts};
use crate::config::manifest::{ParseOptions, render_line};

/// Write one rendered line per entry to `out`.
///
/// # Errors
///
/// Returns an error if the manifest is invalid or `out` cannot be written.
pub fn run(
    global: &GlobalOpts,
    opts: &ManifestOpts,
    session: &Session,
    out: &mut dyn Write,
) -> Result<()> {
    let setup = CommandSetup::init(
        global,
        session,
        opts.manifest.as_deref(),
        ParseOptions {
            include_disabled: opts.include_disabled,
            emit_source_file: opts.source_file,
        },
    )?;
    for entry in &setup.config.entries {
        writeln!(out, "{}", render_line(entry))?;
    }
    out.flush()?;
    Ok(())
}
