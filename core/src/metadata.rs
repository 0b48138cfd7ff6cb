//! Image metadata record written next to an unpacked rootfs.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Runtime-relevant fields extracted from an image configuration.
///
/// Serialized as `{"env": [...], "user": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Environment in `KEY=value` form
    pub env: Vec<String>,

    /// Default user (may be empty)
    pub user: String,
}

impl ImageMetadata {
    /// Write the record as JSON, replacing any existing file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer(&file, self)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read a record previously written with [`ImageMetadata::write_to`].
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&content)?)
    }
}
