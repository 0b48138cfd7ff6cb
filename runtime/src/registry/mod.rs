//! Local read-only OCI registry.
//!
//! Makes preloaded image archives pullable as `localhost:<port>/<name>`
//! during a build. Only manifest and blob reads (GET/HEAD) are served.

mod handlers;
mod server;
mod store;

pub use store::{LocalRegistry, RegistryEntry};
