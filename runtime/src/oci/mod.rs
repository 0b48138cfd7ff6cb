//! OCI image archive support.
//!
//! Loads image archives from disk and flattens images into root
//! filesystems. Three archive shapes are accepted:
//!
//! ```text
//! OCI layout (directory or tarball)     docker save tarball
//!
//! image/                                image.tar
//! ├── oci-layout                        ├── manifest.json
//! ├── index.json                        ├── <config>.json
//! └── blobs/                            └── <id>/layer.tar
//!     └── sha256/
//!         ├── <index or manifest>
//!         ├── <config>
//!         └── <layers>
//! ```

mod artifact;
mod digest;
mod docker_archive;
mod image;
pub mod layers;
mod rootfs;
mod unpack;

#[cfg(test)]
pub(crate) mod testutil;

pub use artifact::{
    BlobRef, ImageArtifact, ImageSource, IndexSource, LayerDescriptor, ManifestBlob, Platform,
};
pub use digest::Digest;
pub use image::{ImageArchive, REF_NAME_ANNOTATION};
pub use rootfs::{select_image, unpack_rootfs, METADATA_FILE, ROOTFS_DIR};
pub use unpack::{
    metadata_from_config, read_metadata, running_as_root, UnpackOptions, Unpacker,
    OPAQUE_WHITEOUT, WHITEOUT_PREFIX,
};
