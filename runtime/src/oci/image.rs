//! Image archive loading.
//!
//! Handles OCI image layouts (directory or tarball) and docker-save
//! tarballs, producing an [`ImageArtifact`].

use oci_build_core::error::{BuildError, Result};
use oci_spec::image::{Descriptor, ImageIndex, ImageManifest};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::artifact::{
    BlobRef, ImageArtifact, ImageSource, IndexSource, LayerDescriptor, ManifestBlob, Platform,
};
use super::digest::Digest;
use super::docker_archive;
use super::layers::{decompress, is_index_media_type, media_types};

/// Annotation carrying the tag of an image inside an OCI layout.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// An image archive opened from disk.
///
/// Tarballs are extracted into a private temporary directory that lives
/// as long as the archive.
#[derive(Debug)]
pub struct ImageArchive {
    /// Path the archive was opened from
    source: PathBuf,

    /// Directory holding the layout or docker-save contents
    root: PathBuf,

    /// Extraction directory for tarballs
    _scratch: Option<TempDir>,

    artifact: ImageArtifact,
}

impl ImageArchive {
    /// Open an OCI layout directory, an OCI layout tarball or a docker-save tarball.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The path doesn't exist
    /// - A tarball cannot be extracted
    /// - The contents are neither an OCI layout nor a docker-save archive
    /// - Index, manifest or descriptors cannot be parsed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let source = path.as_ref().to_path_buf();

        let metadata = std::fs::metadata(&source).map_err(|e| {
            BuildError::OciImageError(format!(
                "Failed to open image archive {}: {}",
                source.display(),
                e
            ))
        })?;

        let (root, scratch) = if metadata.is_dir() {
            (source.clone(), None)
        } else {
            let scratch = Self::extract_tarball(&source)?;
            (scratch.path().to_path_buf(), Some(scratch))
        };

        let artifact = Self::load_root(&root)?;

        tracing::debug!(
            archive = %source.display(),
            digest = %artifact.manifest().digest,
            images = artifact.images().len(),
            "Loaded image archive"
        );

        Ok(Self {
            source,
            root,
            _scratch: scratch,
            artifact,
        })
    }

    pub fn artifact(&self) -> &ImageArtifact {
        &self.artifact
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Directory holding the archive contents.
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    fn extract_tarball(path: &Path) -> Result<TempDir> {
        let scratch = tempfile::Builder::new()
            .prefix("oci-archive-")
            .tempdir()
            .map_err(|e| BuildError::Other(format!("Failed to create temp directory: {}", e)))?;

        let file = std::fs::File::open(path).map_err(|e| {
            BuildError::OciImageError(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let mut archive = tar::Archive::new(decompress(file, None)?);
        archive.unpack(scratch.path()).map_err(|e| {
            BuildError::OciImageError(format!(
                "Failed to extract image archive {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(scratch)
    }

    fn load_root(root: &Path) -> Result<ImageArtifact> {
        if root.join("oci-layout").exists() {
            return load_oci_layout(root);
        }
        if root.join("manifest.json").exists() {
            return docker_archive::load(root).map(ImageArtifact::Image);
        }
        Err(BuildError::OciImageError(format!(
            "Not an image archive: no oci-layout or manifest.json in {}",
            root.display()
        )))
    }
}

/// Load an OCI image layout directory.
fn load_oci_layout(root: &Path) -> Result<ImageArtifact> {
    validate_oci_layout(root)?;

    let index_path = root.join("index.json");
    let index_bytes = std::fs::read(&index_path).map_err(|e| {
        BuildError::OciImageError(format!(
            "Failed to read index.json at {}: {}",
            index_path.display(),
            e
        ))
    })?;
    let index: ImageIndex = serde_json::from_slice(&index_bytes)
        .map_err(|e| BuildError::OciImageError(format!("Failed to parse index.json: {}", e)))?;

    match index.manifests().as_slice() {
        [] => Err(BuildError::OciImageError(
            "No manifests in index.json".to_string(),
        )),
        [single] if is_index_media_type(&single.media_type().to_string()) => {
            let digest = Digest::parse(single.digest())?;
            let nested_bytes = read_blob(root, &digest, "index")?;
            let nested: ImageIndex = serde_json::from_slice(&nested_bytes)
                .map_err(|e| BuildError::OciImageError(format!("Failed to parse index: {}", e)))?;

            let ref_name = ref_name_of(single);
            let images = load_index_images(root, nested.manifests(), Some(single))?;

            Ok(ImageArtifact::Index(IndexSource {
                manifest: ManifestBlob::new(nested_bytes, single.media_type().to_string()),
                images,
                ref_name,
            }))
        }
        [single] => Ok(ImageArtifact::Image(load_image(root, single, None)?)),
        many => {
            let media_type = index
                .media_type()
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| media_types::OCI_INDEX.to_string());
            let images = load_index_images(root, many, None)?;

            Ok(ImageArtifact::Index(IndexSource {
                manifest: ManifestBlob::new(index_bytes, media_type),
                images,
                ref_name: None,
            }))
        }
    }
}

/// Validate that the directory contains a valid OCI layout.
fn validate_oci_layout(root_dir: &Path) -> Result<()> {
    for required in ["oci-layout", "index.json", "blobs"] {
        if !root_dir.join(required).exists() {
            return Err(BuildError::OciImageError(format!(
                "Not a valid OCI layout: missing {} in {}",
                required,
                root_dir.display()
            )));
        }
    }
    Ok(())
}

fn load_index_images(
    root: &Path,
    descriptors: &[Descriptor],
    outer: Option<&Descriptor>,
) -> Result<Vec<ImageSource>> {
    let mut images = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        if is_index_media_type(&descriptor.media_type().to_string()) {
            tracing::debug!(
                digest = %descriptor.digest(),
                "Skipping nested index"
            );
            continue;
        }
        images.push(load_image(root, descriptor, outer)?);
    }

    if images.is_empty() {
        return Err(BuildError::OciImageError(
            "Index references no image manifests".to_string(),
        ));
    }
    Ok(images)
}

fn load_image(
    root: &Path,
    descriptor: &Descriptor,
    outer: Option<&Descriptor>,
) -> Result<ImageSource> {
    let digest = Digest::parse(descriptor.digest())?;
    let bytes = read_blob(root, &digest, "manifest")?;
    let manifest: ImageManifest = serde_json::from_slice(&bytes).map_err(|e| {
        BuildError::OciImageError(format!("Failed to parse manifest {}: {}", digest, e))
    })?;

    let media_type = manifest
        .media_type()
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| descriptor.media_type().to_string());

    let config = blob_ref(root, manifest.config())?;
    let layers = manifest
        .layers()
        .iter()
        .enumerate()
        .map(|(index, layer)| {
            Ok(LayerDescriptor {
                index,
                blob: blob_ref(root, layer)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ImageSource {
        manifest: ManifestBlob::new(bytes, media_type),
        config,
        layers,
        platform: descriptor.platform().as_ref().map(Platform::from),
        ref_name: ref_name_of(descriptor).or_else(|| outer.and_then(ref_name_of)),
        annotated: descriptor.annotations().is_some()
            || outer.map_or(false, |d| d.annotations().is_some()),
    })
}

fn ref_name_of(descriptor: &Descriptor) -> Option<String> {
    descriptor
        .annotations()
        .as_ref()
        .and_then(|annotations| annotations.get(REF_NAME_ANNOTATION))
        .cloned()
}

fn blob_ref(root: &Path, descriptor: &Descriptor) -> Result<BlobRef> {
    let digest = Digest::parse(descriptor.digest())?;
    let size = u64::try_from(descriptor.size()).map_err(|_| {
        BuildError::OciImageError(format!(
            "Negative size for blob {}: {}",
            digest,
            descriptor.size()
        ))
    })?;

    Ok(BlobRef {
        path: blob_path(root, &digest),
        media_type: descriptor.media_type().to_string(),
        size,
        digest,
    })
}

fn read_blob(root: &Path, digest: &Digest, what: &str) -> Result<Vec<u8>> {
    let path = blob_path(root, digest);
    std::fs::read(&path).map_err(|e| {
        BuildError::OciImageError(format!(
            "Failed to read {} at {}: {}",
            what,
            path.display(),
            e
        ))
    })
}

/// Get the path to a blob by digest.
fn blob_path(root_dir: &Path, digest: &Digest) -> PathBuf {
    root_dir
        .join("blobs")
        .join(digest.algorithm())
        .join(digest.hex())
}
