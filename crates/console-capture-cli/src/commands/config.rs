//! Config command implementation.

use crate::error::Result;
use console_capture::CaptureConfig;
use std::path::Path;

/// Renders the effective configuration (defaults, file, environment) as TOML.
///
/// # Errors
///
/// Returns an error if a source holds an invalid value.
pub fn render(config_path: Option<&Path>) -> Result<String> {
    let config = CaptureConfig::load(config_path)?;
    Ok(toml::to_string_pretty(&config)?)
}

/// Execute the config command.
///
/// # Errors
///
/// See [`render`].
pub fn execute(config_path: Option<&Path>) -> Result<()> {
    print!("{}", render(config_path)?);
    Ok(())
}
