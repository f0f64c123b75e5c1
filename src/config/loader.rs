// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable overriding `[ralph].state_dir`.
pub const STATE_DIR_ENV: &str = "RALPH_STATE_DIR";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; durations are resolved by
/// [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Resolve the configuration for one invocation.
///
/// - An explicit `--config` path must exist.
/// - Without one, `Ralph.toml` is used when present, built-in defaults otherwise.
/// - `state_dir_override` (from `--state-dir`) beats `RALPH_STATE_DIR`, which
///   beats the file.
pub fn resolve(
    explicit: Option<&Path>,
    state_dir_override: Option<&Path>,
) -> Result<ConfigFile> {
    let mut config = match explicit {
        Some(path) => load_and_validate(path)?,
        None => {
            let path = default_config_path();
            if path.is_file() {
                load_and_validate(&path)?
            } else {
                debug!(path = ?path, "no config file; using built-in defaults");
                ConfigFile::default()
            }
        }
    };

    let env_dir = std::env::var_os(STATE_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    if let Some(dir) = state_dir_override.map(Path::to_path_buf).or(env_dir) {
        config.state_dir = dir;
    }

    Ok(config)
}

/// `Ralph.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Ralph.toml")
}
