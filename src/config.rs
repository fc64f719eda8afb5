//! Configuration management for Herald Runner.
//!
//! Configuration comes from two places:
//! - Command-line arguments via clap (config file path, verbosity)
//! - A YAML configuration file with the runtime settings
//!
//! # Example
//!
//! ```yaml
//! log_level: info
//! log_output: /var/log/herald-runner/runner.log
//! work_dir: /var/lib/herald-runner
//! secret: change-me
//! host: 127.0.0.1
//! port: 8124
//! ```
//!
//! `unix_socket` may be given instead of `host`/`port`. When neither a port
//! nor a socket is configured the runner listens on `127.0.0.1:8124`.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::server::BindTarget;

// =============================================================================
// Default Values
// =============================================================================

/// Default configuration file path.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Host used when neither a port nor a Unix socket is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when neither a port nor a Unix socket is configured.
pub const DEFAULT_PORT: u16 = 8124;

/// Host used when only a port is configured.
pub const DEFAULT_ANY_HOST: &str = "0.0.0.0";

/// Default timestamp format for log lines.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %z";

/// Default maximum request body size (10 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Herald Runner - execute signed webhook requests.
///
/// Listens for POST requests signed with a shared secret, runs the requested
/// command and returns its result together with any output files.
#[derive(Parser, Debug, Clone)]
#[command(name = "herald-runner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "HERALD_RUNNER_CONFIG")]
    pub config: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Configuration File
// =============================================================================

/// Runtime configuration loaded from the YAML file.
///
/// Built once at startup and passed by reference to the components that need
/// it; nothing mutates it afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (`trace`, `debug`, `info`, `warn`/`warning`, `error`).
    pub log_level: Option<String>,

    /// strftime-style timestamp format for log lines.
    #[serde(rename = "time_format")]
    pub log_time_format: Option<String>,

    /// Append logs to this file instead of stdout.
    pub log_output: Option<PathBuf>,

    /// Root directory for repositories and command runs.
    pub work_dir: PathBuf,

    /// Shared secret for `X-Herald-Signature` verification.
    pub secret: String,

    /// Listen on this Unix socket instead of TCP.
    pub unix_socket: Option<PathBuf>,

    /// TCP host to bind.
    pub host: Option<String>,

    /// TCP port to bind (`0` means unset).
    pub port: Option<u16>,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,

    /// Give up waiting for the executor after this many seconds.
    ///
    /// Unset means requests wait for the executor indefinitely.
    pub executor_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            log_time_format: None,
            log_output: None,
            work_dir: PathBuf::new(),
            secret: String::new(),
            unix_socket: None,
            host: None,
            port: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            executor_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::Invalid(
                "secret is required to verify request signatures".to_string(),
            ));
        }

        if self.work_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("work_dir is required".to_string()));
        }

        if self.unix_socket.is_some() && (self.tcp_port().is_some() || self.host.is_some()) {
            return Err(ConfigError::Invalid(
                "unix_socket cannot be combined with host/port".to_string(),
            ));
        }

        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid(
                "max_body_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve where the listener should bind.
    pub fn bind_target(&self) -> BindTarget {
        if let Some(ref path) = self.unix_socket {
            return BindTarget::Unix(path.clone());
        }

        match self.tcp_port() {
            Some(port) => BindTarget::Tcp {
                host: self
                    .host
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ANY_HOST.to_string()),
                port,
            },
            None => BindTarget::Tcp {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
        }
    }

    /// Configured TCP port; `0` counts as unset.
    fn tcp_port(&self) -> Option<u16> {
        self.port.filter(|port| *port != 0)
    }

    /// Timestamp format for log lines.
    pub fn time_format(&self) -> &str {
        self.log_time_format
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_TIME_FORMAT)
    }

    /// Log level, accepting `warning`, `fatal` and `panic` aliases and falling back to `info`.
    pub fn tracing_level(&self) -> tracing::Level {
        let level = self.log_level.as_deref().unwrap_or("info").to_lowercase();
        match level.as_str() {
            "warning" => tracing::Level::WARN,
            "fatal" | "panic" => tracing::Level::ERROR,
            other => other.parse().unwrap_or(tracing::Level::INFO),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
