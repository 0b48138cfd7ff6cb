//! Build daemon supervision.
//!
//! Prepares the host, launches the daemon (directly or under the rootless
//! shim), waits for its control socket and tears it down again.

mod launch;
mod log;
mod probe;
mod supervisor;

pub use launch::LaunchMode;
pub use probe::{Buildctl, ControlProbe};
pub use supervisor::{BuildDaemon, LOG_NAME, SOCKET_NAME};
