//! Build daemon process supervision.
//!
//! The daemon is started as a child process, polled until its control
//! socket answers, and terminated when the handle is cleaned up or dropped.

use oci_build_core::config::DaemonConfig;
use oci_build_core::error::{BuildError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{Duration, Instant};

use super::launch::{daemon_command, daemon_flags, run_setup, LaunchMode};
use super::log::{dump_log, open_log};
use super::probe::{Buildctl, ControlProbe};

/// Control socket file name inside the root directory.
pub const SOCKET_NAME: &str = "buildkitd.sock";

/// Combined stdout/stderr log inside the root directory.
pub const LOG_NAME: &str = "buildkitd.log";

/// A running, ready build daemon.
///
/// The control address is usable from a successful [`BuildDaemon::spawn`]
/// until [`BuildDaemon::cleanup`]. Dropping the handle cleans up.
#[derive(Debug)]
pub struct BuildDaemon {
    addr: String,
    root_dir: PathBuf,
    log_path: PathBuf,
    mode: LaunchMode,
    process: Option<Child>,
}

impl BuildDaemon {
    /// Start the daemon and wait until `buildctl debug workers` succeeds.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The host setup command fails
    /// - The root directory or log file cannot be created
    /// - The daemon cannot be started
    /// - The daemon exits before becoming ready (its log is dumped to stderr)
    /// - The readiness deadline passes (the daemon is killed)
    pub fn spawn(config: &DaemonConfig) -> Result<Self> {
        Self::spawn_with_probe(config, &Buildctl::new(&config.control_binary))
    }

    /// Like [`BuildDaemon::spawn`] with a custom readiness probe.
    pub fn spawn_with_probe(config: &DaemonConfig, probe: &dyn ControlProbe) -> Result<Self> {
        run_setup(config)?;

        let root_dir = config.resolved_root_dir();
        fs::create_dir_all(&root_dir).map_err(|e| BuildError::DaemonSetup {
            message: format!("create root dir {}: {}", root_dir.display(), e),
            hint: None,
        })?;

        let socket = root_dir.join(SOCKET_NAME);
        remove_stale_socket(&socket)?;

        let log_path = root_dir.join(LOG_NAME);
        let log = open_log(&log_path)?;
        let log_err = log.try_clone().map_err(|e| BuildError::DaemonSetup {
            message: format!("duplicate log handle: {}", e),
            hint: None,
        })?;

        let addr = format!("unix://{}", socket.display());
        let mode = LaunchMode::detect(config);
        let flags = daemon_flags(config, &root_dir, &addr);

        let mut command = daemon_command(mode, config, &flags);
        command.stdout(log).stderr(log_err);
        let child = command.spawn().map_err(|e| BuildError::DaemonSetup {
            message: format!("start {}: {}", config.daemon_binary, e),
            hint: match mode {
                LaunchMode::Rootless => Some(format!(
                    "unprivileged launch requires {} on PATH",
                    config.rootless_binary
                )),
                LaunchMode::Direct => None,
            },
        })?;

        tracing::info!(
            pid = child.id(),
            addr = %addr,
            mode = ?mode,
            "Started build daemon"
        );

        let mut daemon = Self {
            addr,
            root_dir,
            log_path,
            mode,
            process: Some(child),
        };
        daemon.wait_ready(probe, config.probe_interval(), config.ready_timeout())?;
        Ok(daemon)
    }

    fn wait_ready(
        &mut self,
        probe: &dyn ControlProbe,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let started = Instant::now();

        loop {
            if probe.probe(&self.addr).is_ok() {
                tracing::debug!(
                    addr = %self.addr,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Build daemon ready"
                );
                return Ok(());
            }

            let exited = match self.process.as_mut() {
                Some(process) => process.try_wait()?,
                None => {
                    return Err(BuildError::Other(
                        "build daemon is not running".to_string(),
                    ))
                }
            };
            if let Some(status) = exited {
                self.process = None;
                tracing::warn!(status = %status, "Build daemon exited during startup");
                dump_log(&self.log_path);
                return Err(BuildError::DaemonExited {
                    status: status.to_string(),
                    log_path: self.log_path.clone(),
                });
            }

            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    tracing::warn!(timeout_secs = limit.as_secs(), "Build daemon not ready in time");
                    self.kill();
                    dump_log(&self.log_path);
                    return Err(BuildError::TimeoutError(format!(
                        "build daemon did not become ready within {}s",
                        limit.as_secs()
                    )));
                }
            }

            tracing::debug!("Waiting for build daemon");
            std::thread::sleep(interval);
        }
    }

    /// Control address, e.g. `unix:///tmp/buildkitd/buildkitd.sock`.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn launch_mode(&self) -> LaunchMode {
        self.mode
    }

    /// Process id while the daemon is owned.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.id())
    }

    /// Send SIGTERM and wait for the daemon to exit.
    ///
    /// Returns the first error from signalling or waiting. Calling it again
    /// after the process has been released is a no-op.
    pub fn cleanup(&mut self) -> Result<()> {
        let mut process = match self.process.take() {
            Some(process) => process,
            None => return Ok(()),
        };

        let pid = process.id();
        tracing::debug!(pid, "Terminating build daemon");

        // SAFETY: pid belongs to a child we have not reaped yet.
        let signalled = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        let signal_err = (signalled != 0).then(io::Error::last_os_error);

        let waited = process.wait();

        if let Some(e) = signal_err {
            return Err(BuildError::Other(format!("terminate build daemon: {}", e)));
        }
        let status = waited
            .map_err(|e| BuildError::Other(format!("wait build daemon: {}", e)))?;

        tracing::debug!(pid, status = %status, "Build daemon stopped");
        Ok(())
    }

    fn kill(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

impl Drop for BuildDaemon {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(error = %e, "Build daemon cleanup failed");
        }
    }
}

fn remove_stale_socket(socket: &Path) -> Result<()> {
    match fs::remove_file(socket) {
        Ok(()) => {
            tracing::debug!(socket = %socket.display(), "Removed stale control socket");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::DaemonSetup {
            message: format!("remove stale socket {}: {}", socket.display(), e),
            hint: None,
        }),
    }
}
