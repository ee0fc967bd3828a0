//! Reads configuration files through capability-scoped directory handles.

use super::error::{ConfigurationError, ConfigurationResult};
use super::types::ConfigFile;
use crate::manager::domain::ManagerSettings;
use crate::provider::domain::ProviderDescriptor;
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;

/// Validated contents of a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Manager settings.
    pub settings: ManagerSettings,
    /// Provider descriptors in file order.
    pub providers: Vec<ProviderDescriptor>,
}

/// Parses and validates configuration text.
///
/// # Errors
///
/// Returns [`ConfigurationError::Parse`] for malformed TOML or unknown keys,
/// and the validation errors of [`ConfigFile::into_runtime`].
pub fn parse_config(text: &str) -> ConfigurationResult<BackendConfig> {
    let file: ConfigFile = toml::from_str(text)?;
    let (settings, providers) = file.into_runtime()?;
    Ok(BackendConfig {
        settings,
        providers,
    })
}

/// Loads `file_name` from an already opened directory.
///
/// # Errors
///
/// Returns [`ConfigurationError::Read`] when the file cannot be read, or the
/// errors of [`parse_config`].
pub fn load_from_dir(dir: &Dir, file_name: &str) -> ConfigurationResult<BackendConfig> {
    let text = dir
        .read_to_string(file_name)
        .map_err(|source| ConfigurationError::Read {
            path: file_name.to_owned(),
            source,
        })?;
    let config = parse_config(&text)?;
    tracing::info!(
        file = file_name,
        providers = config.providers.len(),
        "loaded backend configuration"
    );
    Ok(config)
}

/// Loads the configuration file at `path`.
///
/// Only the file's parent directory is opened with ambient authority.
///
/// # Errors
///
/// Returns [`ConfigurationError::Read`] when the path has no file name or
/// cannot be read, or the errors of [`parse_config`].
pub fn load_from_path(path: &Utf8Path) -> ConfigurationResult<BackendConfig> {
    let read_error = |source: std::io::Error| ConfigurationError::Read {
        path: path.to_string(),
        source,
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| read_error(std::io::Error::other("path must name a file")))?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
    load_from_dir(&dir, file_name)
}
