use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BuildError, Result};

/// Resolved task configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Verbose mode: debug logging, no progress bars
    pub debug: bool,

    /// Log level used when `debug` is off
    pub log_level: LogLevel,

    /// Build daemon supervision
    pub daemon: DaemonConfig,

    /// Local registry for preloaded images
    pub registry: RegistryConfig,

    /// Rootfs materialization
    pub unpack: UnpackConfig,
}

impl TaskConfig {
    /// Load a configuration file (YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BuildError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse a configuration document (YAML).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: TaskConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde alone cannot reject.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.daemon_binary.is_empty() {
            return Err(BuildError::ConfigError(
                "daemon.daemon_binary must not be empty".to_string(),
            ));
        }
        if self.daemon.control_binary.is_empty() {
            return Err(BuildError::ConfigError(
                "daemon.control_binary must not be empty".to_string(),
            ));
        }
        if self.daemon.probe_interval_ms == 0 {
            return Err(BuildError::ConfigError(
                "daemon.probe_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.unpack.tag.is_empty() {
            return Err(BuildError::ConfigError(
                "unpack.tag must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective tracing level.
    pub fn effective_level(&self) -> tracing::Level {
        if self.debug {
            tracing::Level::DEBUG
        } else {
            self.log_level.into()
        }
    }
}

/// Build daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Root directory override (default: `$TMPDIR/buildkitd`)
    pub root_dir: Option<PathBuf>,

    /// Pre-rendered daemon config file, passed as `--config`
    pub config_file: Option<PathBuf>,

    /// Daemon executable
    pub daemon_binary: String,

    /// Extra arguments placed before the managed flags
    pub daemon_args: Vec<String>,

    /// Rootless execution shim used when not privileged
    pub rootless_binary: String,

    /// Control client executable used for readiness probes
    pub control_binary: String,

    /// Host preparation command (empty = skip)
    pub setup_command: Vec<String>,

    /// Force the launch strategy instead of detecting from the effective uid
    pub privileged: Option<bool>,

    /// Start the daemon with `--debug`
    pub debug: bool,

    /// Delay between readiness probes
    pub probe_interval_ms: u64,

    /// Readiness deadline in seconds (None = wait until the daemon dies)
    pub ready_timeout_secs: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            config_file: None,
            daemon_binary: "buildkitd".to_string(),
            daemon_args: Vec::new(),
            rootless_binary: "rootlesskit".to_string(),
            control_binary: "buildctl".to_string(),
            setup_command: vec!["setup-cgroups".to_string()],
            privileged: None,
            debug: false,
            probe_interval_ms: 100,
            ready_timeout_secs: Some(300),
        }
    }
}

impl DaemonConfig {
    /// Root directory, falling back to `$TMPDIR/buildkitd`.
    pub fn resolved_root_dir(&self) -> PathBuf {
        self.root_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("buildkitd"))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_secs.map(Duration::from_secs)
    }
}

/// Local registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Listen address; port 0 lets the OS pick
    pub listen_addr: String,

    /// Logical image name -> archive path
    pub images: BTreeMap<String, PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:0".to_string(),
            images: BTreeMap::new(),
        }
    }
}

/// Rootfs unpack configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpackConfig {
    /// Tag matched against `org.opencontainers.image.ref.name`
    pub tag: String,

    /// Render per-layer progress bars
    pub progress: bool,
}

impl Default for UnpackConfig {
    fn default() -> Self {
        Self {
            tag: "latest".to_string(),
            progress: true,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
