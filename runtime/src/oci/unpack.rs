//! Layer materialization.
//!
//! Applies the layers of an image, oldest first, onto a destination
//! directory so that the result is the image's final filesystem. Whiteout
//! entries delete paths from lower layers; any other entry replaces what
//! lower layers left at its path, except that directories merge.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use oci_build_core::error::{BuildError, Result};
use oci_build_core::ImageMetadata;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use super::artifact::{ImageSource, LayerDescriptor};
use super::layers::decompress;

/// Basename prefix marking a deleted path.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Marker that hides every lower-layer entry of its directory.
pub const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// Options controlling layer extraction.
#[derive(Debug, Clone)]
pub struct UnpackOptions {
    /// Restore uid/gid from tar headers
    pub preserve_ownership: bool,

    /// Draw per-layer progress bars on stderr
    pub show_progress: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            preserve_ownership: running_as_root(),
            show_progress: true,
        }
    }
}

/// Whether the effective user is root.
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Flattens image layers into a directory tree.
pub struct Unpacker {
    dest: PathBuf,
    options: UnpackOptions,
}

impl Unpacker {
    pub fn new(dest: impl Into<PathBuf>, options: UnpackOptions) -> Self {
        Self {
            dest: dest.into(),
            options,
        }
    }

    /// Apply every layer of `image` and return its runtime metadata.
    ///
    /// On error the destination is left as-is and should be discarded.
    pub fn unpack_image(&self, image: &ImageSource) -> Result<ImageMetadata> {
        fs::create_dir_all(&self.dest).map_err(|e| {
            BuildError::Other(format!(
                "Failed to create unpack destination {}: {}",
                self.dest.display(),
                e
            ))
        })?;

        let progress = if self.options.show_progress {
            MultiProgress::with_draw_target(ProgressDrawTarget::stderr())
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        for layer in &image.layers {
            self.apply_layer(layer, &progress)?;
        }

        let metadata = read_metadata(&image.config.path)?;

        tracing::info!(
            dest = %self.dest.display(),
            layers = image.layers.len(),
            "Unpacked image"
        );

        Ok(metadata)
    }

    /// Apply a single layer on top of the destination.
    pub fn apply_layer(&self, layer: &LayerDescriptor, progress: &MultiProgress) -> Result<()> {
        let digest = layer.digest().to_string();
        let wrap = |e: io::Error| BuildError::UnpackError {
            layer: digest.clone(),
            message: e.to_string(),
        };

        let file = fs::File::open(&layer.blob.path).map_err(wrap)?;

        let bar = progress.add(ProgressBar::new(layer.size()));
        bar.set_style(
            ProgressStyle::with_template("{prefix} [{bar:30}] {bytes}/{total_bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_prefix(layer.digest().short().to_string());

        let reader = decompress(bar.wrap_read(file), Some(layer.media_type()))?;
        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_permissions(true);
        archive.set_preserve_ownerships(self.options.preserve_ownership);
        archive.set_overwrite(true);

        let mut written = HashSet::new();
        for entry in archive.entries().map_err(wrap)? {
            let mut entry = entry.map_err(wrap)?;
            self.apply_entry(&mut entry, &mut written)
                .map_err(|e| BuildError::UnpackError {
                    layer: digest.clone(),
                    message: e.to_string(),
                })?;
        }

        bar.finish_and_clear();

        tracing::debug!(
            layer = %digest,
            index = layer.index,
            entries = written.len(),
            "Applied layer"
        );

        Ok(())
    }

    fn apply_entry<R: Read>(
        &self,
        entry: &mut tar::Entry<'_, R>,
        written: &mut HashSet<PathBuf>,
    ) -> io::Result<()> {
        let raw_path = entry.path()?.into_owned();
        let rel = match clean_entry_path(&raw_path) {
            Some(rel) => rel,
            None => {
                tracing::warn!(path = %raw_path.display(), "Skipping entry outside destination");
                return Ok(());
            }
        };
        if rel.as_os_str().is_empty() {
            return Ok(());
        }

        let target = self.dest.join(&rel);
        let name = rel
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if name == OPAQUE_WHITEOUT {
            let parent = rel.parent().unwrap_or_else(|| Path::new(""));
            tracing::debug!(dir = %parent.display(), "Opaque whiteout");
            clear_opaque_dir(&self.dest, parent, written);
            return Ok(());
        }

        if let Some(hidden) = name.strip_prefix(WHITEOUT_PREFIX) {
            let victim = target.with_file_name(hidden);
            match remove_path(&victim) {
                Ok(()) => tracing::debug!(path = %victim.display(), "Whiteout removed path"),
                Err(e) => tracing::debug!(
                    path = %victim.display(),
                    error = %e,
                    "Whiteout target not removed"
                ),
            }
            return Ok(());
        }

        let kind = entry.header().entry_type();
        match kind {
            tar::EntryType::Block | tar::EntryType::Char => {
                tracing::debug!(path = %rel.display(), "Skipping device entry");
                return Ok(());
            }
            tar::EntryType::Symlink | tar::EntryType::Link => {
                let link = entry
                    .link_name()?
                    .map(|l| l.display().to_string())
                    .unwrap_or_default();
                tracing::debug!(
                    path = %rel.display(),
                    target = %link,
                    hardlink = kind.is_hard_link(),
                    "Creating link"
                );
            }
            _ => {}
        }

        if let Ok(existing) = fs::symlink_metadata(&target) {
            if !(existing.is_dir() && kind.is_dir()) {
                remove_path(&target)?;
            }
        }

        entry.unpack_in(&self.dest)?;
        written.insert(rel);
        Ok(())
    }
}

/// Normalize a tar entry name to a path relative to the destination.
///
/// Returns `None` for names that climb out with `..`.
fn clean_entry_path(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(clean)
}

/// Remove a file, symlink or directory tree without following symlinks.
fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Delete the children of `dir` except those written by the current layer.
fn clear_opaque_dir(dest: &Path, dir: &Path, written: &HashSet<PathBuf>) {
    let entries = match fs::read_dir(dest.join(dir)) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let rel = dir.join(entry.file_name());
        if written.iter().any(|path| path.starts_with(&rel)) {
            continue;
        }
        if let Err(e) = remove_path(&entry.path()) {
            tracing::debug!(path = %rel.display(), error = %e, "Opaque whiteout removal failed");
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    config: Option<RuntimeConfig>,
    #[serde(default)]
    container_config: Option<RuntimeConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimeConfig {
    #[serde(rename = "Env", default)]
    env: Option<Vec<String>>,
    #[serde(rename = "User", default)]
    user: Option<String>,
}

/// Extract environment and user from an image config document.
///
/// Each field falls back to `container_config` when `config` leaves it empty.
pub fn metadata_from_config(bytes: &[u8]) -> Result<ImageMetadata> {
    let file: ConfigFile = serde_json::from_slice(bytes)
        .map_err(|e| BuildError::OciImageError(format!("Failed to parse image config: {}", e)))?;

    let primary = file.config.unwrap_or_default();
    let legacy = file.container_config.unwrap_or_default();

    let env = match primary.env {
        Some(env) if !env.is_empty() => env,
        _ => legacy.env.unwrap_or_default(),
    };
    let user = match primary.user {
        Some(user) if !user.is_empty() => user,
        _ => legacy.user.unwrap_or_default(),
    };

    Ok(ImageMetadata { env, user })
}

/// Read and parse the image config blob at `path`.
pub fn read_metadata(path: &Path) -> Result<ImageMetadata> {
    let bytes = fs::read(path).map_err(|e| {
        BuildError::OciImageError(format!(
            "Failed to read image config {}: {}",
            path.display(),
            e
        ))
    })?;
    metadata_from_config(&bytes)
}
