//! Readiness probes against the daemon control socket.

use oci_build_core::error::{BuildError, Result};
use std::process::{Command, Stdio};

/// Checks whether the daemon answers on its control address.
pub trait ControlProbe: Send + Sync {
    /// Succeed once the daemon accepts control requests at `addr`.
    fn probe(&self, addr: &str) -> Result<()>;
}

/// Probe using the control client: `buildctl --addr=<addr> debug workers`.
#[derive(Debug, Clone)]
pub struct Buildctl {
    binary: String,
}

impl Buildctl {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for Buildctl {
    fn default() -> Self {
        Self::new("buildctl")
    }
}

impl ControlProbe for Buildctl {
    fn probe(&self, addr: &str) -> Result<()> {
        let status = Command::new(&self.binary)
            .arg(format!("--addr={}", addr))
            .args(["debug", "workers"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| BuildError::ControlError(format!("run {}: {}", self.binary, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(BuildError::ControlError(format!(
                "{} debug workers: {}",
                self.binary, status
            )))
        }
    }
}
