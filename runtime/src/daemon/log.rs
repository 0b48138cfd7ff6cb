//! Daemon log file handling.

use oci_build_core::error::{BuildError, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Open (creating if needed) the daemon log for appending, mode 0600.
pub(crate) fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| BuildError::DaemonSetup {
            message: format!("open log file {}: {}", path.display(), e),
            hint: None,
        })
}

/// Copy the daemon log into `out`.
pub(crate) fn copy_log(path: &Path, out: &mut impl Write) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    let copied = std::io::copy(&mut file, out)?;
    out.flush()?;
    Ok(copied)
}

/// Dump the daemon log to stderr, warning when it cannot be read.
pub(crate) fn dump_log(path: &Path) {
    tracing::warn!(log = %path.display(), "Dumping build daemon log");

    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = writeln!(out);
    if let Err(e) = copy_log(path, &mut out) {
        tracing::warn!(log = %path.display(), error = %e, "Failed to dump daemon log");
    }
}
