//! Name → image archive mapping backing the local registry.

use oci_build_core::config::RegistryConfig;
use oci_build_core::error::{BuildError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::oci::ImageArchive;

/// A loaded image addressable by name.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Name as given, used for build arguments
    pub name: String,

    /// Lower-cased lookup key
    pub key: String,

    pub archive: Arc<ImageArchive>,
}

/// Read-only set of images served over the distribution API.
///
/// Cloning is cheap; clones share the loaded archives.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    entries: Arc<BTreeMap<String, RegistryEntry>>,
    listen_addr: String,
}

impl LocalRegistry {
    /// Open every archive and index it by lower-cased name.
    ///
    /// Names that only differ in case are rejected. Names pointing at the
    /// same archive path share one loaded archive.
    pub fn load<I, N, P>(images: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: AsRef<Path>,
    {
        let mut entries: BTreeMap<String, RegistryEntry> = BTreeMap::new();
        let mut opened: HashMap<PathBuf, Arc<ImageArchive>> = HashMap::new();

        for (name, path) in images {
            let name = name.into();
            let path = path.as_ref();

            if name.is_empty() {
                return Err(BuildError::RegistryError {
                    name,
                    message: "image name must not be empty".to_string(),
                });
            }

            let key = name.to_lowercase();
            if let Some(existing) = entries.get(&key) {
                return Err(BuildError::RegistryError {
                    name,
                    message: format!("name collides with {}", existing.name),
                });
            }

            let canonical = std::fs::canonicalize(path).map_err(|e| BuildError::RegistryError {
                name: name.clone(),
                message: format!("cannot access {}: {}", path.display(), e),
            })?;

            let archive = match opened.get(&canonical) {
                Some(archive) => Arc::clone(archive),
                None => {
                    let archive =
                        Arc::new(ImageArchive::open(&canonical).map_err(|e| {
                            BuildError::RegistryError {
                                name: name.clone(),
                                message: format!("failed to load {}: {}", path.display(), e),
                            }
                        })?);
                    opened.insert(canonical, Arc::clone(&archive));
                    archive
                }
            };

            tracing::debug!(
                name = %name,
                archive = %path.display(),
                digest = %archive.artifact().manifest().digest,
                "Registered image"
            );

            entries.insert(key.clone(), RegistryEntry { name, key, archive });
        }

        Ok(Self {
            entries: Arc::new(entries),
            listen_addr: RegistryConfig::default().listen_addr,
        })
    }

    /// Load the images named in `config`, serving on its listen address.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        Ok(Self::load(&config.images)?.with_listen_addr(&config.listen_addr))
    }

    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `NAME=localhost:PORT/NAME` for every entry, keeping the original casing.
    pub fn build_args(&self, port: u16) -> Vec<String> {
        self.entries
            .values()
            .map(|entry| format!("{}=localhost:{}/{}", entry.name, port, entry.name))
            .collect()
    }
}
