// Configuration loading and parsing (gridpool.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::draft::engine::DEFAULT_ON_DECK_COUNT;
use crate::leaderboard::DEFAULT_REFRESH_INTERVAL;

/// Name of the config file under `config/` (and its template under `defaults/`).
pub const CONFIG_FILE: &str = "gridpool.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub draft: DraftConfig,
    pub refresh: RefreshConfig,
    pub grid: GridConfig,
}

// ---------------------------------------------------------------------------
// gridpool.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire gridpool.toml file. Every
/// section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    draft: DraftConfig,
    #[serde(default)]
    refresh: RefreshConfig,
    #[serde(default)]
    grid: GridConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftConfig {
    /// Upcoming pickers shown in the draft status view.
    #[serde(default = "default_on_deck_count")]
    pub on_deck_count: usize,
}

impl Default for DraftConfig {
    fn default() -> Self {
        DraftConfig {
            on_deck_count: DEFAULT_ON_DECK_COUNT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// JSON file the race leaderboard is read from. No refresh worker runs
    /// without one.
    #[serde(default)]
    pub leaderboard_path: Option<String>,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            interval_secs: default_interval_secs(),
            leaderboard_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GridConfig {
    /// CSV imported at startup when the stored grid is empty.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_on_deck_count() -> usize {
    DEFAULT_ON_DECK_COUNT
}

fn default_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_secs()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/gridpool.toml` relative to
/// `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&config_path)?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    let db_path = match file.database.path {
        Some(path) => path,
        None => default_db_path(),
    };

    let config = Config {
        db_path,
        draft: file.draft,
        refresh: file.refresh,
        grid: file.grid,
    };

    validate(&config)?;

    Ok(config)
}

/// Create `config/gridpool.toml` from `defaults/gridpool.toml` when it is
/// missing. Returns the path written, or `None` when a config already exists.
/// An existing config is never overwritten.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }

    let template = base_dir.join("defaults").join(CONFIG_FILE);
    if !template.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no {} or {}; run from the project root",
                target.display(),
                template.display()
            ),
        });
    }

    let copy_err = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!(
            "failed to copy {} to {}: {e}",
            template.display(),
            target.display()
        ),
    };
    std::fs::create_dir_all(base_dir.join("config")).map_err(copy_err)?;
    std::fs::copy(&template, &target).map_err(copy_err)?;

    Ok(Some(target))
}

/// Loads config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd)
}

/// `gridpool.db` in the platform data directory, or in the working
/// directory when no home directory can be determined.
pub fn default_db_path() -> String {
    directories::ProjectDirs::from("", "", "gridpool")
        .map(|dirs| dirs.data_dir().join("gridpool.db"))
        .unwrap_or_else(|| PathBuf::from("gridpool.db"))
        .display()
        .to_string()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    if config.draft.on_deck_count == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.on_deck_count".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.refresh.interval_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "refresh.interval_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    let optional_paths = [
        ("refresh.leaderboard_path", &config.refresh.leaderboard_path),
        ("grid.path", &config.grid.path),
    ];
    for (field, value) in optional_paths {
        if value.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ConfigError::ValidationError {
                field: field.into(),
                message: "must not be empty when set".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
