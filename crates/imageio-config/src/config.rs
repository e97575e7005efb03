//! Configuration loading
//!
//! Sources are applied in the order they were added to the loader:
//! 1. Default values
//! 2. Configuration files and in-memory TOML
//! 3. Environment variables

use crate::{ConfigError, Result};
use imageio_block::MAX_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Load from a file
    File(PathBuf),
    /// Load from environment variables
    Env,
    /// Use default values
    Default,
    /// Load from in-memory string
    Memory(String),
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive understood by tracing filters
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ConfigError::InvalidValue {
                field: "log.level".to_string(),
                message: format!("Invalid log level: {s}"),
            }),
        }
    }
}

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format
    Pretty,
    /// Compact format
    #[default]
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(ConfigError::InvalidValue {
                field: "log.format".to_string(),
                message: format!("Invalid log format: {s}"),
            }),
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Output to stdout
    Stdout,
    /// Output to stderr
    #[default]
    Stderr,
    /// Output to file
    File,
}

impl std::str::FromStr for LogOutput {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            "file" => Ok(Self::File),
            _ => Err(ConfigError::InvalidValue {
                field: "log.output".to_string(),
                message: format!("Invalid log output: {s}"),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level, overridden by `RUST_LOG`
    pub level: LogLevel,
    /// Line format
    pub format: LogFormat,
    /// Destination
    pub output: LogOutput,
    /// Log file, required when output is `file`
    pub file_path: Option<PathBuf>,
}

/// Extent query configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtentConfig {
    /// Largest range requested from a backend in one block status query
    pub max_query_length: u64,
}

impl Default for ExtentConfig {
    fn default() -> Self {
        Self {
            max_query_length: MAX_LENGTH,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging
    pub log: LogConfig,
    /// Extent queries
    pub extents: ExtentConfig,
}

/// Configuration loader
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a loader producing the default configuration
    pub fn new() -> Self {
        Self {
            sources: vec![ConfigSource::Default],
            env_prefix: None,
        }
    }

    /// Load a TOML file
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.sources
            .push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Load a TOML document held in memory
    pub fn with_str(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Memory(toml.into()));
        self
    }

    /// Apply `<PREFIX>_*` environment variable overrides
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.sources.push(ConfigSource::Env);
        self
    }

    /// Load the configuration from all sources
    pub fn load(&self) -> Result<DaemonConfig> {
        let mut config = DaemonConfig::default();

        for source in &self.sources {
            match source {
                ConfigSource::Default => {}
                ConfigSource::File(path) => {
                    let content = std::fs::read_to_string(path)?;
                    config = Self::parse(&content)?;
                }
                ConfigSource::Memory(content) => {
                    config = Self::parse(content)?;
                }
                ConfigSource::Env => {
                    if let Some(prefix) = &self.env_prefix {
                        config = Self::apply_env_overrides(config, prefix)?;
                    }
                }
            }
        }

        Ok(Self::expand_paths(config))
    }

    /// Load a configuration from a TOML string
    pub fn load_from_str(toml: &str) -> Result<DaemonConfig> {
        Ok(Self::expand_paths(Self::parse(toml)?))
    }

    fn parse(toml: &str) -> Result<DaemonConfig> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_env_overrides(mut config: DaemonConfig, prefix: &str) -> Result<DaemonConfig> {
        if let Ok(val) = std::env::var(format!("{prefix}_LOG_LEVEL")) {
            config.log.level = val.parse()?;
        }
        if let Ok(val) = std::env::var(format!("{prefix}_LOG_FORMAT")) {
            config.log.format = val.parse()?;
        }
        if let Ok(val) = std::env::var(format!("{prefix}_LOG_OUTPUT")) {
            config.log.output = val.parse()?;
        }
        if let Ok(val) = std::env::var(format!("{prefix}_LOG_FILE_PATH")) {
            config.log.file_path = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var(format!("{prefix}_EXTENTS_MAX_QUERY_LENGTH")) {
            config.extents.max_query_length = val.parse().map_err(|_| {
                ConfigError::EnvVar(format!("Invalid max_query_length value: {val}"))
            })?;
        }

        Ok(config)
    }

    fn expand_paths(mut config: DaemonConfig) -> DaemonConfig {
        if let Some(ref path) = config.log.file_path {
            config.log.file_path = Some(Self::expand_path(path));
        }
        config
    }

    fn expand_path(path: &Path) -> PathBuf {
        if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        path.to_path_buf()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Env tests use a distinct prefix each so they can run in parallel.

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_output_from_str() {
        assert_eq!("stdout".parse::<LogOutput>().unwrap(), LogOutput::Stdout);
        assert_eq!("stderr".parse::<LogOutput>().unwrap(), LogOutput::Stderr);
        assert_eq!("file".parse::<LogOutput>().unwrap(), LogOutput::File);
        assert!("syslog".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.log.level, LogLevel::Info);
        assert_eq!(config.log.output, LogOutput::Stderr);
        assert_eq!(config.log.file_path, None);
        assert_eq!(config.extents.max_query_length, MAX_LENGTH);
    }

    #[test]
    fn test_load_from_str() {
        let config = ConfigLoader::load_from_str(
            r#"
            [log]
            level = "debug"
            format = "json"

            [extents]
            max_query_length = 1048576
            "#,
        )
        .unwrap();

        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.output, LogOutput::Stderr);
        assert_eq!(config.extents.max_query_length, 1 << 20);
    }

    #[test]
    fn test_load_from_str_invalid() {
        assert!(matches!(
            ConfigLoader::load_from_str("[log]\nlevel = \"loud\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ConfigLoader::load_from_str("[extents]\nmax_query_length = -1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[log]\noutput = \"stdout\"\nformat = \"pretty\"").unwrap();

        let config = ConfigLoader::new().with_file(file.path()).load().unwrap();
        assert_eq!(config.log.output, LogOutput::Stdout);
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.extents, ExtentConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new()
            .with_file("/nonexistent/imageio.toml")
            .load();
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_later_source_wins() {
        let config = ConfigLoader::new()
            .with_str("[log]\nlevel = \"trace\"")
            .with_str("[log]\nlevel = \"warn\"")
            .load()
            .unwrap();
        assert_eq!(config.log.level, LogLevel::Warn);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("IMGENV_LOG_LEVEL", "error");
        std::env::set_var("IMGENV_LOG_OUTPUT", "file");
        std::env::set_var("IMGENV_LOG_FILE_PATH", "/var/log/imageio.log");
        std::env::set_var("IMGENV_EXTENTS_MAX_QUERY_LENGTH", "65536");

        let config = ConfigLoader::new()
            .with_str("[log]\nlevel = \"debug\"")
            .with_env_prefix("IMGENV")
            .load()
            .unwrap();

        std::env::remove_var("IMGENV_LOG_LEVEL");
        std::env::remove_var("IMGENV_LOG_OUTPUT");
        std::env::remove_var("IMGENV_LOG_FILE_PATH");
        std::env::remove_var("IMGENV_EXTENTS_MAX_QUERY_LENGTH");

        assert_eq!(config.log.level, LogLevel::Error);
        assert_eq!(config.log.output, LogOutput::File);
        assert_eq!(
            config.log.file_path,
            Some(PathBuf::from("/var/log/imageio.log"))
        );
        assert_eq!(config.extents.max_query_length, 65536);
    }

    #[test]
    fn test_env_invalid_value() {
        std::env::set_var("IMGBAD_EXTENTS_MAX_QUERY_LENGTH", "lots");
        let result = ConfigLoader::new().with_env_prefix("IMGBAD").load();
        std::env::remove_var("IMGBAD_EXTENTS_MAX_QUERY_LENGTH");

        assert!(matches!(result, Err(ConfigError::EnvVar(_))));
    }

    #[test]
    fn test_expand_home() {
        let config = ConfigLoader::load_from_str(
            "[log]\noutput = \"file\"\nfile_path = \"~/imageio/daemon.log\"",
        )
        .unwrap();

        let path = config.log.file_path.unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join("imageio/daemon.log"));
            assert!(!path.starts_with("~"));
        }
    }
}
