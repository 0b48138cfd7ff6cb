//! Shared fixtures for runtime integration tests.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use oci_build_runtime::Digest;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Gzip tarball of regular files; names ending in `/` become directories.
pub fn gz_layer(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        if path.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
        }
        header.set_size(content.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, path, content.as_bytes()).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

pub struct Image {
    pub manifest_digest: Digest,
    pub manifest: Vec<u8>,
    pub config_digest: Digest,
    pub config: Vec<u8>,
    pub layer_digests: Vec<Digest>,
    pub layers: Vec<Vec<u8>>,
}

fn write_blob(root: &Path, content: &[u8]) -> Digest {
    let digest = Digest::sha256(content);
    let dir = root.join("blobs/sha256");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(digest.hex()), content).unwrap();
    digest
}

fn write_image(root: &Path, arch: &str, layers: Vec<Vec<u8>>) -> Image {
    let config = format!(
        r#"{{"architecture":"{}","os":"linux","config":{{"Env":["PATH=/bin"],"User":"builder"}},"rootfs":{{"type":"layers","diff_ids":[]}}}}"#,
        arch
    )
    .into_bytes();
    let config_digest = write_blob(root, &config);

    let layer_digests: Vec<Digest> = layers.iter().map(|l| write_blob(root, l)).collect();
    let layer_json: Vec<String> = layers
        .iter()
        .zip(&layer_digests)
        .map(|(l, d)| {
            format!(
                r#"{{"mediaType":"{}","digest":"{}","size":{}}}"#,
                OCI_LAYER_GZIP,
                d,
                l.len()
            )
        })
        .collect();

    let manifest = format!(
        r#"{{"schemaVersion":2,"mediaType":"{}","config":{{"mediaType":"{}","digest":"{}","size":{}}},"layers":[{}]}}"#,
        OCI_MANIFEST,
        OCI_CONFIG,
        config_digest,
        config.len(),
        layer_json.join(",")
    )
    .into_bytes();
    let manifest_digest = write_blob(root, &manifest);

    Image {
        manifest_digest,
        manifest,
        config_digest,
        config,
        layer_digests,
        layers,
    }
}

fn write_marker(root: &Path) {
    fs::create_dir_all(root.join("blobs/sha256")).unwrap();
    fs::write(root.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
}

/// Single-image OCI layout directory tagged `tag`.
pub fn single_image_layout(root: &Path, layers: Vec<Vec<u8>>, tag: &str) -> Image {
    write_marker(root);
    let image = write_image(root, "amd64", layers);
    let index = format!(
        r#"{{"schemaVersion":2,"manifests":[{{"mediaType":"{}","digest":"{}","size":{},"annotations":{{"org.opencontainers.image.ref.name":"{}"}}}}]}}"#,
        OCI_MANIFEST,
        image.manifest_digest,
        image.manifest.len(),
        tag
    );
    fs::write(root.join("index.json"), index).unwrap();
    image
}

/// Multi-platform layout whose `index.json` lists one image per arch.
///
/// Returns the raw `index.json` bytes and the platform images.
pub fn multi_platform_layout(root: &Path, arches: &[&str]) -> (Vec<u8>, Vec<Image>) {
    write_marker(root);

    let images: Vec<Image> = arches
        .iter()
        .map(|arch| write_image(root, arch, vec![gz_layer(&[("arch", arch)])]))
        .collect();
    let descriptors: Vec<String> = images
        .iter()
        .zip(arches)
        .map(|(image, arch)| {
            format!(
                r#"{{"mediaType":"{}","digest":"{}","size":{},"platform":{{"architecture":"{}","os":"linux"}}}}"#,
                OCI_MANIFEST,
                image.manifest_digest,
                image.manifest.len(),
                arch
            )
        })
        .collect();

    let index = format!(
        r#"{{"schemaVersion":2,"mediaType":"{}","manifests":[{}]}}"#,
        OCI_INDEX,
        descriptors.join(",")
    )
    .into_bytes();
    fs::write(root.join("index.json"), &index).unwrap();
    (index, images)
}

/// Pack the contents of `dir` into a tarball at `out`.
pub fn tar_dir(dir: &Path, out: &Path) {
    let mut builder = tar::Builder::new(fs::File::create(out).unwrap());
    builder.append_dir_all(".", dir).unwrap();
    builder.finish().unwrap();
}
