use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::ReadError(e.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::ParseError(e.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_device_dir")]
    pub device_dir: PathBuf,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_device_dir() -> PathBuf {
    PathBuf::from("/dev/input")
}

fn default_debounce_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_color")]
    pub color: ColorChoice,
    #[serde(default = "default_banner_interval_ms")]
    pub banner_interval_ms: u64,
}

fn default_color() -> ColorChoice {
    ColorChoice::Auto
}

fn default_banner_interval_ms() -> u64 {
    3000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            device_dir: default_device_dir(),
            debounce_ms: default_debounce_ms(),
            max_retries: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            color: default_color(),
            banner_interval_ms: default_banner_interval_ms(),
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# evsniff Configuration File
# All options are shown below with their default values.
# Uncomment and modify any option you want to change.

[filters]
# Filters applied when none are given on the command line.
# "!" negates, absolute paths select one device node, anything else is a
# case-insensitive regex on the device name.
patterns = []

[discovery]
# Directory holding the event device nodes
device_dir = "/dev/input"
# Delay used to batch new device nodes before opening them
debounce_ms = 1000
# Retries for device nodes that are not readable yet (absent = unlimited)
# max_retries = 10

[output]
# "auto" (colors on a terminal), "always" or "never"
color = "auto"
# Reprint the device banner after this much silence
banner_interval_ms = 3000
"#;

impl Config {
    /// Loads the user config file, falling back to defaults when there is
    /// none.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{:?}: {}", path, e)))?;
        let config = Self::parse(&contents)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(contents)?;
        if config.discovery.debounce_ms == 0 {
            return Err(ConfigError::ParseError(
                "discovery.debounce_ms must be at least 1".to_string(),
            ));
        }
        config.discovery.device_dir = Self::expand_path(&config.discovery.device_dir)
            .map_err(|e| ConfigError::ReadError(format!("Path expansion error: {}", e)))?;
        Ok(config)
    }

    pub fn create_default_config(config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::ReadError(format!("Failed to create config directory: {}", e)))?;
        }

        fs::write(config_path, DEFAULT_CONFIG)
            .map_err(|e| ConfigError::ReadError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Created default config file at {:?}", config_path);
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::ReadError("Could not find config directory".to_string()))?;
        Ok(config_dir.join("evsniff").join("config.toml"))
    }

    fn expand_path(path: &Path) -> Result<PathBuf, std::io::Error> {
        match path.strip_prefix("~") {
            Ok(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "Could not find home directory",
                    )
                })?;
                Ok(home.join(rest))
            }
            Err(_) => Ok(path.to_path_buf()),
        }
    }
}
