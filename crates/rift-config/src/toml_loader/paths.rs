//! Where the config file lives, and writing the commented default.

use std::path::{Path, PathBuf};

use rift_common::ConfigError;

use super::template::default_config_toml;

/// Overrides the config file location. Headless relay hosts often have no
/// platform config directory.
pub const CONFIG_PATH_ENV: &str = "RIFT_CONFIG";

/// `$RIFT_CONFIG` if set, else `<platform config dir>/rift/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    resolve_config_path(std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
}

fn resolve_config_path(env_override: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = env_override.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path);
    }
    let base = dirs::config_dir().ok_or_else(|| {
        ConfigError::ParseError(format!(
            "no platform config directory; set {CONFIG_PATH_ENV}"
        ))
    })?;
    Ok(base.join("rift").join("config.toml"))
}

/// Write the commented default config to `path`, creating parent dirs.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let io_err = |what: &str, e: std::io::Error| {
        ConfigError::ParseError(format!("{what} {}: {e}", path.display()))
    };

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err("cannot create directory for", e))?;
    }
    std::fs::write(path, default_config_toml()).map_err(|e| io_err("cannot write", e))?;

    tracing::info!(path = %path.display(), "Wrote default config");
    Ok(())
}
