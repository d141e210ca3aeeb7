//! Configuration management for the machine tool.

use anyhow::{Context, Result};
use hyperv_common::LogFormat;
use hyperv_driver::PollPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Hyper-V backend configuration
    pub hyperv: HypervConfig,
    /// Polling configuration
    pub polling: PollingConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Result<Self> {
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if let Some(ref format) = args.log_format {
            self.logging.format = format.parse()?;
        }

        if let Some(ref store_path) = args.store_path {
            self.hyperv.store_path = Some(store_path.clone());
        }

        Ok(self)
    }

    /// Directory holding the files of one machine.
    pub fn machine_dir(&self, machine_name: &str) -> PathBuf {
        self.hyperv
            .store_path
            .clone()
            .unwrap_or_else(default_store_path)
            .join(machine_name)
    }
}

/// `~/.hyperv-machine/machines`, falling back to the working directory.
fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hyperv-machine")
        .join("machines")
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Hyper-V backend configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HypervConfig {
    /// PowerShell executable (looked up on PATH if not set)
    pub powershell_path: Option<PathBuf>,
    /// Directory holding one sub-directory per machine
    pub store_path: Option<PathBuf>,
}

/// Polling configuration for start and stop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between probes in milliseconds
    pub interval_ms: u64,
    /// How long to wait for a guest address (0 waits forever)
    pub ip_timeout_secs: u64,
    /// How long to wait for a VM to power off (0 waits forever)
    pub stop_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            ip_timeout_secs: 600,
            stop_timeout_secs: 300,
        }
    }
}

impl PollingConfig {
    pub fn ip_policy(&self) -> PollPolicy {
        self.policy(self.ip_timeout_secs)
    }

    pub fn stop_policy(&self) -> PollPolicy {
        self.policy(self.stop_timeout_secs)
    }

    fn policy(&self, timeout_secs: u64) -> PollPolicy {
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        PollPolicy::new(Duration::from_millis(self.interval_ms), timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
logging:
  level: debug
  format: json
hyperv:
  powershell_path: C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe
  store_path: D:\machines
polling:
  interval_ms: 250
  ip_timeout_secs: 0
"#;

        let config: Config = serde_yaml::from_str(yaml).expect("Failed to parse YAML");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.hyperv.powershell_path.is_some());

        let ip = config.polling.ip_policy();
        assert_eq!(ip.interval, Duration::from_millis(250));
        assert_eq!(ip.timeout, None);

        // Unset fields keep their defaults
        let stop = config.polling.stop_policy();
        assert_eq!(stop.timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::try_parse_from([
            "hyperv-machine",
            "--log-level",
            "trace",
            "--log-format",
            "json",
            "--store-path",
            "/srv/machines",
            "status",
        ])
        .unwrap();

        let config = Config::default().with_cli_overrides(&args).unwrap();
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.machine_dir("crc"), PathBuf::from("/srv/machines/crc"));
    }

    #[test]
    fn test_default_store_under_home() {
        let config = Config::default();
        let dir = config.machine_dir("crc");

        assert!(dir.ends_with(".hyperv-machine/machines/crc"));
        if let Some(home) = dirs::home_dir() {
            assert!(dir.starts_with(home));
        }
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/hyperv-machine.yaml").is_err());
    }
}
