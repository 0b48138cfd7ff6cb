//! Root filesystem materialization for a built image.

use oci_build_core::config::UnpackConfig;
use oci_build_core::error::{BuildError, Result};
use oci_build_core::ImageMetadata;
use std::path::Path;

use super::artifact::{ImageSource, Platform};
use super::image::ImageArchive;
use super::unpack::{running_as_root, UnpackOptions, Unpacker};

/// Directory under the destination receiving the filesystem tree.
pub const ROOTFS_DIR: &str = "rootfs";

/// File under the destination receiving the metadata record.
pub const METADATA_FILE: &str = "manifest.json";

/// Pick the one image matching the host platform and `tag`.
///
/// Images without a declared platform match any host; images without
/// annotations match any tag. An annotated image without a ref name
/// never matches.
pub fn select_image<'a>(images: &'a [ImageSource], tag: &str) -> Result<&'a ImageSource> {
    let host = Platform::host();

    let candidates: Vec<&ImageSource> = images
        .iter()
        .filter(|image| image.platform.as_ref().map_or(true, |p| p.matches(&host)))
        .filter(|image| image.matches_tag(tag))
        .collect();

    match candidates.as_slice() {
        [image] => Ok(image),
        [] => Err(BuildError::OciImageError(format!(
            "could not determine image to unpack (tag {}, platform {}/{})",
            tag, host.os, host.architecture
        ))),
        many => Err(BuildError::OciImageError(format!(
            "found {} images matching tag {} and platform {}/{}, expected exactly one",
            many.len(),
            tag,
            host.os,
            host.architecture
        ))),
    }
}

/// Unpack the image in `archive` into `dest/rootfs` and write
/// `dest/manifest.json`.
pub fn unpack_rootfs(
    dest: &Path,
    archive: &Path,
    config: &UnpackConfig,
    debug: bool,
) -> Result<ImageMetadata> {
    let archive = ImageArchive::open(archive)?;
    let image = select_image(archive.artifact().images(), &config.tag)?;

    tracing::debug!(
        manifest = %image.manifest.digest,
        layers = image.layers.len(),
        "Selected image for unpack"
    );

    let options = UnpackOptions {
        preserve_ownership: running_as_root(),
        show_progress: config.progress && !debug,
    };
    let metadata = Unpacker::new(dest.join(ROOTFS_DIR), options).unpack_image(image)?;
    metadata.write_to(dest.join(METADATA_FILE))?;

    Ok(metadata)
}
