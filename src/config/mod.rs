//! Configuration module
//!
//! Handles application settings and the settings-provider boundary the
//! session is built from.

mod settings;

pub use settings::{
    AppConfig, LogFormat, LoggingConfig, LoginSettings, SettingsProvider, TerminalSettings,
    TimingSettings, METHOD_ENV,
};

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File content is not valid TOML for this schema
    #[error("Parse error: {0}")]
    Parse(String),

    /// A setting has an unusable value
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Setting name
        key: String,
        /// Offending value
        value: String,
    },

    /// A required setting is absent
    #[error("Missing setting: {0}")]
    MissingKey(String),

    /// No platform config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "greenscreen", "Greenscreen")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "greenscreen", "Greenscreen")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Default config file location
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Get the log directory
pub fn log_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs"))
}
