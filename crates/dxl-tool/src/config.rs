//! TOML configuration for the command-line tool.
//!
//! The default file lives in the platform config directory:
//! - Windows:  `%APPDATA%\dxl-tool\config.toml`
//! - Linux:    `~/.config/dxl-tool/config.toml`
//! - macOS:    `~/Library/Application Support/dxl-tool/config.toml`
//!
//! Every field has a default, so an empty or missing file is valid:
//!
//! ```toml
//! log_level = "debug"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 1000000
//!
//! [device]
//! id = 3
//!
//! [driver]
//! receive_timeout_ms = 100
//! ```

use std::path::{Path, PathBuf};

use dxl_core::DriverConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolConfig {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Serial port settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB0`) or port name (`COM3`).
    #[serde(default = "default_port")]
    pub port: String,
    /// Line speed in bits per second.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// The device addressed by every command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Bus id, `0..=252`, or `254` for broadcast.
    #[serde(default = "default_device_id")]
    pub id: u8,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> String {
    if cfg!(target_os = "windows") {
        "COM1".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}
fn default_baud_rate() -> u32 {
    57_600
}
fn default_device_id() -> u8 {
    1
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            serial: SerialConfig::default(),
            device: DeviceConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: default_device_id(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(platform_config_dir()
        .ok_or(ConfigError::NoPlatformConfigDir)?
        .join("config.toml"))
}

/// Loads the config at `path`, returning [`ToolConfig::default()`] if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ToolConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ToolConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ToolConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("dxl-tool"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("dxl-tool"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("dxl-tool")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dxl_tool_{tag}_{}", std::process::id()))
    }

    #[test]
    fn test_default_config_values() {
        // Arrange / Act
        let cfg = ToolConfig::default();

        // Assert
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.serial.baud_rate, 57_600);
        assert_eq!(cfg.device.id, 1);
        assert_eq!(cfg.driver, DriverConfig::default());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: ToolConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ToolConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_given_fields() {
        // Arrange
        let toml_str = r#"
[serial]
baud_rate = 1000000
[driver]
receive_timeout_ms = 200
"#;

        // Act
        let cfg: ToolConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.serial.baud_rate, 1_000_000);
        assert_eq!(cfg.serial.port, default_port());
        assert_eq!(cfg.driver.receive_timeout_ms, 200);
        assert_eq!(cfg.driver.transmit_timeout_ms, 50);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result: Result<ToolConfig, toml::de::Error> = toml::from_str("[[[ nope");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = scratch_dir("absent").join("missing.toml");

        let cfg = load_config(&path).expect("missing file is not an error");

        assert_eq!(cfg, ToolConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        // Arrange
        let dir = scratch_dir("roundtrip");
        let path = dir.join("nested").join("config.toml");
        let mut cfg = ToolConfig::default();
        cfg.serial.port = "/dev/ttyACM1".to_string();
        cfg.device.id = 42;
        cfg.driver.transmit_timeout_ms = 20;

        // Act
        save_config(&path, &cfg).expect("save");
        let loaded = load_config(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_reports_parse_errors() {
        let dir = scratch_dir("parse");
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("config.toml");
        std::fs::write(&path, "log_level = ").expect("write");

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }
}
