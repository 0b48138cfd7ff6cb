//! In-memory view of a loaded image: a single image or a multi-platform index.

use std::path::PathBuf;

use super::digest::Digest;

/// A blob stored on disk inside an image archive.
#[derive(Debug, Clone)]
pub struct BlobRef {
    pub digest: Digest,
    pub media_type: String,
    pub size: u64,
    pub path: PathBuf,
}

/// A filesystem layer and its position in application order (oldest first).
#[derive(Debug, Clone)]
pub struct LayerDescriptor {
    pub index: usize,
    pub blob: BlobRef,
}

impl LayerDescriptor {
    pub fn digest(&self) -> &Digest {
        &self.blob.digest
    }

    pub fn media_type(&self) -> &str {
        &self.blob.media_type
    }

    /// Compressed size as declared by the manifest.
    pub fn size(&self) -> u64 {
        self.blob.size
    }
}

/// Raw manifest (or index) bytes exactly as served, with their digest.
#[derive(Debug, Clone)]
pub struct ManifestBlob {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub digest: Digest,
}

impl ManifestBlob {
    /// Wrap canonical bytes, computing the digest from them.
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        let digest = Digest::sha256(&bytes);
        Self {
            bytes,
            media_type: media_type.into(),
            digest,
        }
    }
}

/// Target platform of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl Platform {
    /// The platform this process runs on, in OCI naming.
    pub fn host() -> Self {
        let architecture = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "arm" => "arm",
            "powerpc64" => "ppc64le",
            "s390x" => "s390x",
            "riscv64" => "riscv64",
            other => other,
        };
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: architecture.to_string(),
            variant: None,
        }
    }

    /// OS and architecture match; variants are not compared.
    pub fn matches(&self, other: &Platform) -> bool {
        self.os == other.os && self.architecture == other.architecture
    }
}

impl From<&oci_spec::image::Platform> for Platform {
    fn from(platform: &oci_spec::image::Platform) -> Self {
        Self {
            os: platform.os().to_string(),
            architecture: platform.architecture().to_string(),
            variant: platform.variant().clone(),
        }
    }
}

/// A single platform-specific image.
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub manifest: ManifestBlob,
    pub config: BlobRef,
    pub layers: Vec<LayerDescriptor>,
    pub platform: Option<Platform>,
    /// `org.opencontainers.image.ref.name` annotation, if any
    pub ref_name: Option<String>,
    /// Whether the descriptor carried an annotation map at all
    pub annotated: bool,
}

impl ImageSource {
    /// Unannotated images match any tag; annotated ones only their ref name.
    pub fn matches_tag(&self, tag: &str) -> bool {
        !self.annotated || self.ref_name.as_deref() == Some(tag)
    }

    /// Look up the config or a layer by digest.
    pub fn find_blob(&self, digest: &Digest) -> Option<&BlobRef> {
        if &self.config.digest == digest {
            return Some(&self.config);
        }
        self.layers
            .iter()
            .map(|layer| &layer.blob)
            .find(|blob| &blob.digest == digest)
    }
}

/// A multi-platform index and the images it references.
#[derive(Debug, Clone)]
pub struct IndexSource {
    pub manifest: ManifestBlob,
    pub images: Vec<ImageSource>,
    pub ref_name: Option<String>,
}

/// A loaded image artifact.
#[derive(Debug, Clone)]
pub enum ImageArtifact {
    Image(ImageSource),
    Index(IndexSource),
}

impl ImageArtifact {
    /// Top-level manifest: the image manifest or the index itself.
    pub fn manifest(&self) -> &ManifestBlob {
        match self {
            ImageArtifact::Image(image) => &image.manifest,
            ImageArtifact::Index(index) => &index.manifest,
        }
    }

    /// All platform images, in declaration order.
    pub fn images(&self) -> &[ImageSource] {
        match self {
            ImageArtifact::Image(image) => std::slice::from_ref(image),
            ImageArtifact::Index(index) => &index.images,
        }
    }

    /// Resolve a manifest request.
    ///
    /// A single image answers every reference with its own manifest. An
    /// index answers its own digest and any non-digest reference (a tag)
    /// with the index; other digests select a platform image.
    pub fn resolve_manifest(&self, reference: &str) -> Option<&ManifestBlob> {
        match self {
            ImageArtifact::Image(image) => Some(&image.manifest),
            ImageArtifact::Index(index) => {
                if reference == index.manifest.digest.to_string() {
                    return Some(&index.manifest);
                }
                let digest = match Digest::parse(reference) {
                    Ok(digest) => digest,
                    Err(_) => return Some(&index.manifest),
                };
                index
                    .images
                    .iter()
                    .map(|image| &image.manifest)
                    .find(|manifest| manifest.digest == digest)
            }
        }
    }

    /// Resolve a blob request against configs and layers of every image.
    pub fn resolve_blob(&self, digest: &Digest) -> Option<&BlobRef> {
        self.images().iter().find_map(|image| image.find_blob(digest))
    }
}
