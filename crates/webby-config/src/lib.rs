//! Configuration management for Webby.
//!
//! Parses `webby.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! `manager.host` supports environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override manager host.
    pub host: Option<String>,
    /// Override manager (control) port.
    pub port: Option<u16>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "webby.toml";

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Manager (control server) configuration.
    pub manager: ManagerConfig,
    /// Port range handed out to file servers.
    pub ports: PortsConfig,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Manager configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Host address the manager and its file servers bind to.
    pub host: String,
    /// Control port. A second invocation finding it taken hands off to the owner.
    pub port: u16,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 35729,
        }
    }
}

/// Port range for file servers (inclusive on both ends).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    /// First port scanned.
    pub start: u16,
    /// Last port scanned.
    pub end: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            start: 8000,
            end: 9000,
        }
    }
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Whether live reload is enabled at startup.
    pub enabled: bool,
    /// Minimum gap between two forwarded change events, in milliseconds.
    pub debounce_ms: u64,
    /// Outbound queue capacity per connected browser.
    pub client_buffer: usize,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 10,
            client_buffer: 16,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`manager.host`").
        field: String,
        /// Error message (e.g., "${`WEBBY_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `webby.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading, allowing CLI arguments to take
    /// precedence over config file values. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.manager.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.manager.port = port;
        }
        if let Some(live_reload_enabled) = settings.live_reload_enabled {
            self.live_reload.enabled = live_reload_enabled;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_manager()?;
        self.validate_ports()?;
        self.validate_live_reload()?;
        Ok(())
    }

    fn validate_manager(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.manager.host, "manager.host")?;

        if self.manager.port == 0 {
            return Err(ConfigError::Validation(
                "manager.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    fn validate_ports(&self) -> Result<(), ConfigError> {
        if self.ports.start == 0 {
            return Err(ConfigError::Validation(
                "ports.start must be greater than 0".to_owned(),
            ));
        }
        if self.ports.start > self.ports.end {
            return Err(ConfigError::Validation(format!(
                "ports.start ({}) cannot exceed ports.end ({})",
                self.ports.start, self.ports.end
            )));
        }
        Ok(())
    }

    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        if self.live_reload.client_buffer == 0 {
            return Err(ConfigError::Validation(
                "live_reload.client_buffer must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.manager.host = expand::expand_env(&self.manager.host, "manager.host")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.manager.host, "127.0.0.1");
        assert_eq!(config.manager.port, 35729);
        assert_eq!(config.ports.start, 8000);
        assert_eq!(config.ports.end, 9000);
        assert!(config.live_reload.enabled);
        assert_eq!(config.live_reload.debounce_ms, 10);
        assert_eq!(config.live_reload.client_buffer, 16);
        assert!(config.config_path.is_none());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.manager.port, 35729);
        assert_eq!(config.ports.start, 8000);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[manager]
host = "0.0.0.0"
port = 40000

[ports]
start = 9100
end = 9200

[live_reload]
enabled = false
debounce_ms = 50
client_buffer = 4
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.manager.host, "0.0.0.0");
        assert_eq!(config.manager.port, 40000);
        assert_eq!(config.ports.start, 9100);
        assert_eq!(config.ports.end, 9200);
        assert!(!config.live_reload.enabled);
        assert_eq!(config.live_reload.debounce_ms, 50);
        assert_eq!(config.live_reload.client_buffer, 4);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webby.toml");
        std::fs::write(&path, "[manager]\nport = 41000\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.manager.port, 41000);
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/webby.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webby.toml");
        std::fs::write(&path, "[ports]\nstart = 9000\nend = 8000\n").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_apply_cli_settings_port() {
        let mut config = Config::default();
        let overrides = CliSettings {
            port: Some(9000),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.manager.port, 9000);
        assert_eq!(config.manager.host, "127.0.0.1"); // Unchanged
    }

    #[test]
    fn test_apply_cli_settings_live_reload() {
        let mut config = Config::default();
        let overrides = CliSettings {
            live_reload_enabled: Some(false),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert!(!config.live_reload.enabled);
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let mut config = Config::default();

        config.apply_cli_settings(&CliSettings::default());

        assert_eq!(config.manager.host, "127.0.0.1");
        assert_eq!(config.manager.port, 35729);
        assert!(config.live_reload.enabled);
    }

    #[test]
    fn test_expand_env_vars_manager_host() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("WEBBY_TEST_HOST", "0.0.0.0");
        }

        let toml = r#"
[manager]
host = "${WEBBY_TEST_HOST}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();

        assert_eq!(config.manager.host, "0.0.0.0");

        unsafe {
            std::env::remove_var("WEBBY_TEST_HOST");
        }
    }

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_validation_error(config: &Config, expected_substrings: &[&str]) {
        let result = config.validate();
        assert!(result.is_err(), "Expected validation to fail");
        let err = result.unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected_substrings {
            assert!(
                msg.contains(s),
                "Expected error to contain '{s}', got: {msg}"
            );
        }
    }

    #[test]
    fn test_validate_default_config_passes() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_manager_host_empty() {
        let mut config = Config::default();
        config.manager.host = String::new();
        assert_validation_error(&config, &["manager.host", "empty"]);
    }

    #[test]
    fn test_validate_manager_port_zero() {
        let mut config = Config::default();
        config.manager.port = 0;
        assert_validation_error(&config, &["manager.port"]);
    }

    #[test]
    fn test_validate_ports_start_zero() {
        let mut config = Config::default();
        config.ports.start = 0;
        assert_validation_error(&config, &["ports.start"]);
    }

    #[test]
    fn test_validate_ports_inverted_range() {
        let mut config = Config::default();
        config.ports.start = 9001;
        assert_validation_error(&config, &["ports.start", "ports.end"]);
    }

    #[test]
    fn test_validate_single_port_range_passes() {
        let mut config = Config::default();
        config.ports.start = 8500;
        config.ports.end = 8500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_client_buffer_zero() {
        let mut config = Config::default();
        config.live_reload.client_buffer = 0;
        assert_validation_error(&config, &["client_buffer"]);
    }
}
