//! OCI layer stream decoding.
//!
//! Layers arrive as tar streams that are gzip, zstd or not compressed at
//! all. The media type is trusted when it names a compression; otherwise
//! the leading magic bytes decide.

use oci_build_core::error::Result;
use std::io::{BufRead, BufReader, Read};

/// Layer and manifest media types used by this crate.
pub mod media_types {
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const OCI_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
    pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";
    pub const DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
}

/// Whether a descriptor media type denotes an index / manifest list.
pub fn is_index_media_type(media_type: &str) -> bool {
    media_type == media_types::OCI_INDEX || media_type == media_types::DOCKER_MANIFEST_LIST
}

/// Compression applied to a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Compression named by a media type, if it names one.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        if media_type.ends_with("+gzip") || media_type.ends_with(".gzip") {
            Some(Self::Gzip)
        } else if media_type.ends_with("+zstd") {
            Some(Self::Zstd)
        } else {
            None
        }
    }

    /// Detect compression from magic bytes.
    pub fn sniff(head: &[u8]) -> Self {
        if head.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }
}

/// Wrap `reader` in the decoder matching its compression.
///
/// `media_type` is a hint; streams without one (or with a plain tar media
/// type) are sniffed.
pub fn decompress<'a, R: Read + 'a>(
    reader: R,
    media_type: Option<&str>,
) -> Result<Box<dyn Read + 'a>> {
    let mut buffered = BufReader::new(reader);

    let compression = match media_type.and_then(Compression::from_media_type) {
        Some(compression) => compression,
        None => Compression::sniff(buffered.fill_buf()?),
    };

    Ok(match compression {
        Compression::Gzip => Box::new(flate2::bufread::GzDecoder::new(buffered)),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(buffered)?),
        Compression::None => Box::new(buffered),
    })
}
