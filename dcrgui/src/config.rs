use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// log level, can be "info", "debug", "trace".
    pub log_level: Option<String>,
    /// Log at debug level if no log level is set.
    pub debug: Option<bool>,
    /// Capacity of the channel of each notification listener.
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
    /// Number of new transactions kept by the overview page.
    #[serde(default = "default_recent_transactions")]
    pub recent_transactions: usize,
}

pub const DEFAULT_FILE_NAME: &str = "dcrgui.toml";

fn default_notification_buffer() -> usize {
    64
}

fn default_recent_transactions() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            debug: None,
            notification_buffer: default_notification_buffer(),
            recent_transactions: default_recent_transactions(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = std::fs::read(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ConfigError::NotFound,
                _ => ConfigError::ReadingFile(format!("Reading configuration file: {}", e)),
            })
            .and_then(|file_content| {
                toml::from_slice::<Config>(&file_content).map_err(|e| {
                    ConfigError::ReadingFile(format!("Parsing configuration file: {}", e))
                })
            })?;

        config.check()?;
        Ok(config)
    }

    /// Read the configuration file, falling back to the default one if there
    /// is none.
    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::from_file(path) {
            Err(ConfigError::NotFound) => {
                tracing::info!("No configuration file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            res => res,
        }
    }

    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string(&self)
            .map_err(|e| ConfigError::WritingFile(format!("Failed to serialize config: {}", e)))?;

        let mut config_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| ConfigError::WritingFile(e.to_string()))?;

        config_file.write_all(content.as_bytes()).map_err(|e| {
            tracing::warn!("failed to write to file: {:?}", e);
            ConfigError::WritingFile(e.to_string())
        })?;

        tracing::info!("Done writing configuration file");
        Ok(())
    }

    fn check(&self) -> Result<(), ConfigError> {
        self.log_level()?;
        if self.notification_buffer == 0 {
            return Err(ConfigError::InvalidField(
                "notification_buffer",
                "must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<filter::LevelFilter, ConfigError> {
        if let Some(level) = &self.log_level {
            match level.as_ref() {
                "info" => Ok(filter::LevelFilter::INFO),
                "debug" => Ok(filter::LevelFilter::DEBUG),
                "trace" => Ok(filter::LevelFilter::TRACE),
                _ => Err(ConfigError::InvalidField(
                    "log_level",
                    format!("Unknown value '{}'", level),
                )),
            }
        } else if let Some(true) = self.debug {
            Ok(filter::LevelFilter::DEBUG)
        } else {
            Ok(filter::LevelFilter::INFO)
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ConfigError {
    InvalidField(&'static str, String),
    NotFound,
    ReadingFile(String),
    WritingFile(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Config file not found"),
            Self::InvalidField(field, message) => {
                write!(f, "Config field {} is invalid: {}", field, message)
            }
            Self::ReadingFile(e) => write!(f, "Error while reading file: {}", e),
            Self::WritingFile(e) => write!(f, "Error while writing file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Get the absolute path to the dcrgui data folder.
///
/// This is `~/.dcrgui` on Linux and a "Dcrgui" directory in the standard
/// configuration directory everywhere else.
pub fn default_datadir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    #[cfg(target_os = "linux")]
    let configs_dir = dirs::home_dir();

    #[cfg(not(target_os = "linux"))]
    let configs_dir = dirs::config_dir();

    if let Some(mut path) = configs_dir {
        #[cfg(target_os = "linux")]
        path.push(".dcrgui");

        #[cfg(not(target_os = "linux"))]
        path.push("Dcrgui");

        return Ok(path);
    }

    Err("Failed to get default data directory".into())
}
