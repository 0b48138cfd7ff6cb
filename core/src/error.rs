use std::path::PathBuf;

use thiserror::Error;

/// OCI build task error types
#[derive(Error, Debug)]
pub enum BuildError {
    /// Host preparation or daemon launch failed
    #[error("Build daemon setup failed: {message}")]
    DaemonSetup {
        message: String,
        hint: Option<String>,
    },

    /// Daemon process died before its control socket became ready
    #[error("Build daemon exited before becoming ready ({status}), see {}", .log_path.display())]
    DaemonExited { status: String, log_path: PathBuf },

    /// Control client invocation failed
    #[error("Control client error: {0}")]
    ControlError(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Local registry load or serve error
    #[error("Registry error: {name} - {message}")]
    RegistryError { name: String, message: String },

    /// OCI image error
    #[error("OCI image error: {0}")]
    OciImageError(String),

    /// Layer materialization error
    #[error("Unpack failed in layer {layer}: {message}")]
    UnpackError { layer: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        BuildError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for BuildError {
    fn from(err: serde_yaml::Error) -> Self {
        BuildError::SerializationError(err.to_string())
    }
}

/// Result type alias for OCI build operations
pub type Result<T> = std::result::Result<T, BuildError>;
