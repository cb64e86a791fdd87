//! `devbox config set|unset`: edit the settings file in place.
use anyhow::{Context as _, Result};

use super::Session;
use crate::cli::{ConfigAction, ConfigOpts, GlobalOpts};
use crate::config::editor::{KeyPath, SettingValue};
use crate::config::settings;
use crate::error::ConfigError;

/// Run the config command.
///
/// # Errors
///
/// Returns an error if the settings path cannot be determined, the key is
/// invalid, or the edit cannot be written.
pub fn run(global: &GlobalOpts, opts: &ConfigOpts, session: &Session) -> Result<()> {
    let path = session
        .settings_path(global)
        .ok_or_else(|| ConfigError::Missing {
            key: "settings path".to_string(),
            hint: "pass --config, or set HOME or XDG_CONFIG_HOME".to_string(),
        })?;
    let log = &session.log;

    let (key, changed) = match &opts.action {
        ConfigAction::Set { key, value } => {
            let key = KeyPath::parse(key)?;
            let value = SettingValue::infer(value);
            if global.dry_run {
                log.dry_run(&format!("would set {key} = {} in {}", value.render(), path.display()));
                return Ok(());
            }
            let changed = settings::set_key(&path, &key, &value)
                .with_context(|| format!("setting {key}"))?;
            (key, changed)
        }
        ConfigAction::Unset { key } => {
            let key = KeyPath::parse(key)?;
            if global.dry_run {
                log.dry_run(&format!("would remove {key} from {}", path.display()));
                return Ok(());
            }
            let changed = settings::unset_root_key(&path, &key)
                .with_context(|| format!("removing {key}"))?;
            (key, changed)
        }
    };

    if changed {
        log.info(&format!("updated {key} in {}", path.display()));
    } else {
        log.info(&format!("{key} unchanged"));
    }
    Ok(())
}
