//! Locating and reading `config.toml` for the `armillary` binary.

use std::{
    fs, io, iter,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use thiserror::Error;

use armillary::{ArmillaryError, config::AppConfig};

/// Searched, relative to the working directory, before the platform
/// config directory.
const LOCAL_CONFIG: &str = "armillary/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration file: {0}")]
    MissingFile(PathBuf),

    #[error("Failed to read configuration file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse TOML configuration in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl From<ConfigError> for ArmillaryError {
    fn from(err: ConfigError) -> Self {
        ArmillaryError::Io(io::Error::other(err))
    }
}

/// Loads the CLI configuration.
///
/// An explicit path must name an existing file. Without one, the first file
/// found among `armillary/config.toml` and the platform config directory is
/// used, and defaults apply when neither exists.
///
/// # Errors
///
/// Returns error if the explicit file is missing, or if a found file cannot
/// be read or is not valid TOML for [`AppConfig`].
pub fn load_config(explicit_path: Option<impl AsRef<Path>>) -> Result<AppConfig, ArmillaryError> {
    if let Some(path) = explicit_path {
        let path = path.as_ref();
        info!(path:% = path.display(); "Loading configuration from explicit path");
        let config = read_config(path)?.ok_or_else(|| ConfigError::MissingFile(path.into()))?;
        return Ok(config);
    }

    for path in search_paths() {
        if let Some(config) = read_config(&path)? {
            info!(path:% = path.display(); "Loading configuration");
            return Ok(config);
        }
        debug!(path:% = path.display(); "No configuration file");
    }

    debug!("Using default configuration");
    Ok(AppConfig::default())
}

fn search_paths() -> impl Iterator<Item = PathBuf> {
    let platform = ProjectDirs::from("com", "armillary", "armillary")
        .map(|dirs| dirs.config_dir().join("config.toml"));
    iter::once(PathBuf::from(LOCAL_CONFIG)).chain(platform)
}

/// `Ok(None)` if there is no file at `path`.
fn read_config(path: &Path) -> Result<Option<AppConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.into(),
                source,
            });
        }
    };

    toml::from_str(&content)
        .map(Some)
        .map_err(|err| ConfigError::Parse {
            path: path.into(),
            message: err.to_string(),
        })
}
