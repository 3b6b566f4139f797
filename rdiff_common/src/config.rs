use crate::{DiffOptions, RDiffError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "rdiff.toml";

/// Environment variable that points at an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "RDIFF_CONFIG";

/// Defaults read from `rdiff.toml`; command-line options extend or override them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Exclude patterns applied to every directory comparison
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Compare symbolic links instead of following them
    #[serde(default)]
    pub no_dereference: bool,

    /// Match directory entries case-insensitively
    #[serde(default)]
    pub ignore_file_name_case: bool,

    /// Default context lines for `-c`/`-u`
    #[serde(default)]
    pub context: Option<usize>,
}

impl AppConfig {
    /// Seed a `DiffOptions` with the configured defaults.
    pub fn apply_to(&self, options: &mut DiffOptions) {
        options
            .exclude_patterns
            .extend(self.exclude_patterns.iter().cloned());
        options.no_dereference |= self.no_dereference;
        options.ignore_file_name_case |= self.ignore_file_name_case;
        if let Some(context) = self.context {
            options.context = context;
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: Option<PathBuf>,
    pub exists: bool,
}

/// Load the configuration from `$RDIFF_CONFIG` or the platform config directory.
/// A missing file yields the defaults.
pub fn load_config() -> Result<LoadedConfig, RDiffError> {
    let path = match std::env::var_os(CONFIG_ENV_VAR) {
        Some(explicit) => Some(PathBuf::from(explicit)),
        None => default_config_path(),
    };

    match path {
        Some(path) => load_config_from(&path),
        None => Ok(LoadedConfig {
            config: AppConfig::default(),
            path: None,
            exists: false,
        }),
    }
}

pub fn load_config_from(path: &Path) -> Result<LoadedConfig, RDiffError> {
    let exists = path.is_file();

    let config = if exists {
        let data = fs::read_to_string(path)?;
        toml::from_str(&data).map_err(|e| {
            RDiffError::Config(format!("{}: {}", path.display(), e))
        })?
    } else {
        AppConfig::default()
    };

    Ok(LoadedConfig {
        config,
        path: Some(path.to_path_buf()),
        exists,
    })
}

/// True when the locale governing dates (`LC_ALL`, then `LC_TIME`, then
/// `LANG`) is anything other than the C/POSIX locale.
pub fn time_locale_is_localized() -> bool {
    let name = ["LC_ALL", "LC_TIME", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty());
    is_localized(name.as_deref())
}

fn is_localized(locale: Option<&str>) -> bool {
    !matches!(locale, None | Some("C") | Some("POSIX"))
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "aecs4u", "rdiff").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
