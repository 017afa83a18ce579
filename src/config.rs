//! Configuration file management for certlife.
//!
//! This module handles loading, parsing, and merging configuration from TOML files
//! and command-line arguments.
//!
//! # Configuration Precedence
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (certlife.toml or specified with --config)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! targets = ["transacid.de", "transacid.de:993", "smtp://transacid.de", "xmpp://0x7fffffff.net"]
//! output = "text"
//! exit_code = 1
//! timeout_secs = 10
//! parallelism = 4
//! verify = true
//! ehlo_name = "localhost"
//! ca_file = "/etc/certlife/internal-ca.pem"
//!
//! [prometheus]
//! enabled = true
//! address = "http://localhost:9091"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::report::OutputFormat;
use crate::target::Target;
use crate::{CheckOptions, DEFAULT_TIMEOUT_SECS};

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "certlife.toml";

/// Main configuration structure.
///
/// All fields are optional to support partial configuration and merging.
/// Missing values will be filled in by defaults or overridden by CLI arguments.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Targets to check, e.g. `example.com`, `smtp://mail.example.com:587`
    pub targets: Option<Vec<String>>,
    /// Output format: text, json, table
    pub output: Option<OutputFormat>,
    /// Exit code to use when any target fails
    pub exit_code: Option<i32>,
    /// Bound for every network operation, in seconds
    pub timeout_secs: Option<u64>,
    /// Most checks in flight at once
    pub parallelism: Option<usize>,
    /// Fail the handshake on untrusted or mismatched certificates
    pub verify: Option<bool>,
    /// Name announced in SMTP EHLO
    pub ehlo_name: Option<String>,
    /// PEM bundle of trust anchors used instead of the system store
    pub ca_file: Option<PathBuf>,
    /// Colour text output
    pub color: Option<bool>,
    /// Prometheus configuration
    pub prometheus: Option<PrometheusConfig>,
}

/// Prometheus integration configuration.
///
/// Controls whether metrics are pushed to a Prometheus Push Gateway
/// and specifies the gateway address.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PrometheusConfig {
    /// Enable prometheus metrics pushing
    pub enabled: Option<bool>,
    /// Prometheus push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

impl Default for Config {
    /// # Default Values
    ///
    /// - `targets`: None (must be provided)
    /// - `output`: text
    /// - `exit_code`: 0 (failed checks do not change the exit status)
    /// - `timeout_secs`: 10
    /// - `parallelism`: 4
    /// - `verify`: true
    /// - `ehlo_name`: "localhost"
    /// - `ca_file`: None (the system trust store)
    /// - `color`: true
    /// - `prometheus.enabled`: false
    /// - `prometheus.address`: "http://localhost:9091"
    fn default() -> Self {
        Config {
            targets: None,
            output: Some(OutputFormat::Text),
            exit_code: Some(0),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            parallelism: Some(4),
            verify: Some(true),
            ehlo_name: Some("localhost".to_string()),
            ca_file: None,
            color: Some(true),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        }
    }
}

impl Config {
    /// An all-`None` configuration, the neutral element of [`merge_with`](Self::merge_with).
    pub fn empty() -> Self {
        Config {
            targets: None,
            output: None,
            exit_code: None,
            timeout_secs: None,
            parallelism: None,
            verify: None,
            ehlo_name: None,
            ca_file: None,
            color: None,
            prometheus: None,
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use certlife::config::Config;
    /// let config = Config::from_file("certlife.toml")?;
    /// # Ok::<(), certlife::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, if the `other` config has a value (Some), it overrides
    /// this config's value. If the `other` value is None, keeps the current value.
    ///
    /// ```
    /// # use certlife::config::Config;
    /// let defaults = Config::default();
    /// let file_config = Config::from_file("missing.toml").unwrap_or_else(|_| Config::empty());
    /// let merged = defaults.merge_with(file_config);
    /// assert_eq!(merged.timeout_secs, Some(10));
    /// ```
    pub fn merge_with(self, other: Config) -> Self {
        let prometheus = match (self.prometheus, other.prometheus) {
            (Some(mine), Some(theirs)) => Some(PrometheusConfig {
                enabled: theirs.enabled.or(mine.enabled),
                address: theirs.address.or(mine.address),
            }),
            (mine, theirs) => theirs.or(mine),
        };
        Config {
            targets: other.targets.or(self.targets),
            output: other.output.or(self.output),
            exit_code: other.exit_code.or(self.exit_code),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            parallelism: other.parallelism.or(self.parallelism),
            verify: other.verify.or(self.verify),
            ehlo_name: other.ehlo_name.or(self.ehlo_name),
            ca_file: other.ca_file.or(self.ca_file),
            color: other.color.or(self.color),
            prometheus,
        }
    }

    /// Checks the merged configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.targets {
            Some(targets) if !targets.is_empty() => {}
            _ => {
                return Err(ConfigError::Validation(
                    "no targets given; pass them as arguments or set `targets`".to_string(),
                ))
            }
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.parallelism == Some(0) {
            return Err(ConfigError::Validation(
                "parallelism must be greater than 0".to_string(),
            ));
        }
        if let Some(name) = &self.ehlo_name {
            if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
                return Err(ConfigError::Validation(format!(
                    "ehlo_name '{}' must be a single non-empty word",
                    name
                )));
            }
        }
        if let Some(path) = &self.ca_file {
            if !path.is_file() {
                return Err(ConfigError::Validation(format!(
                    "ca_file '{}' is not a readable file",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Parses the configured target strings, in order.
    pub fn parsed_targets(&self) -> Result<Vec<Target>, ConfigError> {
        self.targets
            .iter()
            .flatten()
            .map(|t| {
                t.parse::<Target>()
                    .map_err(|e| ConfigError::Validation(e.to_string()))
            })
            .collect()
    }

    /// Options handed to the checker.
    pub fn check_options(&self) -> CheckOptions {
        let defaults = CheckOptions::default();
        CheckOptions {
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            verify: self.verify.unwrap_or(defaults.verify),
            ehlo_name: self.ehlo_name.clone().unwrap_or(defaults.ehlo_name),
            ca_file: self.ca_file.clone(),
        }
    }

    /// Push gateway address when Prometheus export is enabled.
    pub fn prometheus_address(&self) -> Option<String> {
        let prometheus = self.prometheus.as_ref()?;
        if prometheus.enabled.unwrap_or(false) {
            prometheus.address.clone()
        } else {
            None
        }
    }

    /// Generates an example configuration file in TOML format.
    ///
    /// ```
    /// # use certlife::config::Config;
    /// let example = Config::example_toml();
    /// assert!(example.contains("targets"));
    /// ```
    pub fn example_toml() -> String {
        let example = Config {
            targets: Some(vec![
                "transacid.de".to_string(),
                "transacid.de:993".to_string(),
                "transacid.de:6697".to_string(),
                "smtp://transacid.de".to_string(),
                "xmpp://0x7fffffff.net".to_string(),
            ]),
            output: Some(OutputFormat::Text),
            exit_code: Some(1),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            parallelism: Some(4),
            verify: Some(true),
            ehlo_name: Some("localhost".to_string()),
            ca_file: None,
            color: Some(true),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (missing targets, invalid values, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
