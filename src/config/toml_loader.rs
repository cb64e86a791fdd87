//! TOML document loading with typed errors.
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::ConfigError;

/// Load a TOML file into `T`.
///
/// A missing file is treated as an empty document, so `T` gets whatever its
/// serde defaults produce.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be read, or
/// [`ConfigError::InvalidSyntax`] if it does not deserialize into `T`.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return parse_str("", path);
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    parse_str(&content, path)
}

/// Deserialize `content`, attributing errors to `origin`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSyntax`] with the parser message.
pub fn parse_str<T: DeserializeOwned>(content: &str, origin: &Path) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::InvalidSyntax {
        file: origin.display().to_string(),
        message: e.message().to_string(),
    })
}
