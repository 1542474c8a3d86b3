//! Configuration file resolution and loading
//!
//! Both binaries take their settings from the command line first. Values not
//! given there fall back to an optional TOML file, then to compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `<config_dir>/chunkplay/<module>.toml` if it exists
///
/// Returns `None` when no file applies; callers then use defaults.
pub fn resolve_config_file(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    module_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: platform config directory
    default_config_file(module_name).filter(|path| path.exists())
}

/// Platform default location of a module's config file.
pub fn default_config_file(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chunkplay").join(format!("{}.toml", module_name)))
}

/// Load a TOML config file.
///
/// A missing file is not an error: a warning is logged and `T::default()` is
/// returned. A file that exists but does not parse is a configuration error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No config file, using defaults");
        return Ok(T::default());
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(T::default());
        }
        Err(e) => return Err(Error::Io(e)),
    };

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}
