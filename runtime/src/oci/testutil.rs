//! Fixture builders for OCI layouts, docker-save archives and layer tarballs.

use flate2::write::GzEncoder;
use std::fs;
use std::path::Path;

use super::digest::Digest;

/// One entry of a test layer.
pub enum TarEntry {
    File(String, Vec<u8>),
    OwnedFile(String, Vec<u8>, u64, u64),
    Dir(String),
    Symlink(String, String),
    Hardlink(String, String),
    CharDevice(String),
}

impl TarEntry {
    pub fn file(path: &str, content: &[u8]) -> Self {
        TarEntry::File(path.to_string(), content.to_vec())
    }

    /// Regular file whose header records `uid`/`gid`.
    pub fn owned_file(path: &str, content: &[u8], uid: u64, gid: u64) -> Self {
        TarEntry::OwnedFile(path.to_string(), content.to_vec(), uid, gid)
    }

    pub fn dir(path: &str) -> Self {
        TarEntry::Dir(path.to_string())
    }

    pub fn symlink(path: &str, target: &str) -> Self {
        TarEntry::Symlink(path.to_string(), target.to_string())
    }

    pub fn hardlink(path: &str, target: &str) -> Self {
        TarEntry::Hardlink(path.to_string(), target.to_string())
    }

    pub fn char_device(path: &str) -> Self {
        TarEntry::CharDevice(path.to_string())
    }

    /// Whiteout marker deleting `name` inside `dir`.
    pub fn whiteout(dir: &str, name: &str) -> Self {
        let path = if dir.is_empty() {
            format!(".wh.{}", name)
        } else {
            format!("{}/.wh.{}", dir.trim_end_matches('/'), name)
        };
        TarEntry::File(path, Vec::new())
    }
}

/// Uncompressed tar stream containing `entries` in order.
pub fn layer_tar(entries: &[TarEntry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    for entry in entries {
        let mut header = tar::Header::new_gnu();
        match entry {
            TarEntry::File(path, content) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, content.as_slice())
                    .unwrap();
            }
            TarEntry::OwnedFile(path, content, uid, gid) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_uid(*uid);
                header.set_gid(*gid);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, content.as_slice())
                    .unwrap();
            }
            TarEntry::Dir(path) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, std::io::empty())
                    .unwrap();
            }
            TarEntry::Symlink(path, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder.append_link(&mut header, path, target).unwrap();
            }
            TarEntry::Hardlink(path, target) => {
                header.set_entry_type(tar::EntryType::Link);
                header.set_size(0);
                header.set_mode(0o644);
                builder.append_link(&mut header, path, target).unwrap();
            }
            TarEntry::CharDevice(path) => {
                header.set_entry_type(tar::EntryType::Char);
                header.set_size(0);
                header.set_mode(0o666);
                header.set_device_major(1).unwrap();
                header.set_device_minor(3).unwrap();
                header.set_cksum();
                builder
                    .append_data(&mut header, path, std::io::empty())
                    .unwrap();
            }
        }
    }

    builder.into_inner().unwrap()
}

/// Gzip-compressed tar stream containing `entries` in order.
pub fn layer_tar_gz(entries: &[TarEntry]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&layer_tar(entries)).unwrap();
    encoder.finish().unwrap()
}

/// Digests of a generated single-image layout.
pub struct LayoutFixture {
    pub manifest_digest: Digest,
    pub manifest_bytes: Vec<u8>,
    pub config_digest: Digest,
    pub layer_digests: Vec<Digest>,
}

/// Digests of a generated multi-platform layout.
pub struct IndexFixture {
    pub index_digest: Digest,
    pub manifest_digests: Vec<Digest>,
    pub layer_digests: Vec<Digest>,
}

fn write_blob(root: &Path, content: &[u8]) -> Digest {
    let digest = Digest::sha256(content);
    let dir = root.join("blobs").join("sha256");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(digest.hex()), content).unwrap();
    digest
}

fn write_layout_marker(root: &Path) {
    fs::create_dir_all(root.join("blobs").join("sha256")).unwrap();
    fs::write(root.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
}

/// Default image config used by fixtures.
pub fn default_config(arch: &str) -> String {
    format!(
        r#"{{"architecture":"{}","os":"linux","config":{{"Env":["PATH=/usr/bin:/bin"],"User":"app"}},"rootfs":{{"type":"layers","diff_ids":[]}}}}"#,
        arch
    )
}

/// Write image blobs (config, layers, manifest) and return the manifest descriptor JSON.
fn write_image(root: &Path, layers: &[Vec<u8>], config: &str) -> (Digest, Vec<u8>, Digest, Vec<Digest>) {
    let config_digest = write_blob(root, config.as_bytes());

    let mut layer_digests = Vec::new();
    let mut layer_descriptors = Vec::new();
    for layer in layers {
        let digest = write_blob(root, layer);
        layer_descriptors.push(format!(
            r#"{{"mediaType":"application/vnd.oci.image.layer.v1.tar+gzip","digest":"{}","size":{}}}"#,
            digest,
            layer.len()
        ));
        layer_digests.push(digest);
    }

    let manifest = format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{{"mediaType":"application/vnd.oci.image.config.v1+json","digest":"{}","size":{}}},"layers":[{}]}}"#,
        config_digest,
        config.len(),
        layer_descriptors.join(",")
    )
    .into_bytes();
    let manifest_digest = write_blob(root, &manifest);

    (manifest_digest, manifest, config_digest, layer_digests)
}

/// Single-image OCI layout with gzip layers and a ref-name annotation.
pub fn oci_layout(root: &Path, layers: &[Vec<u8>], tag: &str) -> LayoutFixture {
    oci_layout_with_config(root, layers, tag, &default_config("amd64"))
}

/// Single-image OCI layout with an explicit config document.
pub fn oci_layout_with_config(
    root: &Path,
    layers: &[Vec<u8>],
    tag: &str,
    config: &str,
) -> LayoutFixture {
    let annotations = format!(r#"{{"org.opencontainers.image.ref.name":"{}"}}"#, tag);
    write_single_layout(root, layers, config, Some(&annotations))
}

/// Single-image OCI layout whose index descriptor carries `annotations`
/// verbatim (a JSON object), or no annotation map at all.
pub fn oci_layout_annotated(
    root: &Path,
    layers: &[Vec<u8>],
    annotations: Option<&str>,
) -> LayoutFixture {
    write_single_layout(root, layers, &default_config("amd64"), annotations)
}

fn write_single_layout(
    root: &Path,
    layers: &[Vec<u8>],
    config: &str,
    annotations: Option<&str>,
) -> LayoutFixture {
    write_layout_marker(root);
    let (manifest_digest, manifest_bytes, config_digest, layer_digests) =
        write_image(root, layers, config);

    let annotations = annotations
        .map(|a| format!(r#","annotations":{}"#, a))
        .unwrap_or_default();
    let index = format!(
        r#"{{"schemaVersion":2,"manifests":[{{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"{}","size":{}{}}}]}}"#,
        manifest_digest,
        manifest_bytes.len(),
        annotations
    );
    fs::write(root.join("index.json"), index).unwrap();

    LayoutFixture {
        manifest_digest,
        manifest_bytes,
        config_digest,
        layer_digests,
    }
}

/// Multi-platform OCI layout: `index.json` points at one nested index.
///
/// Each platform image has a single layer containing `/arch` with the
/// architecture name.
pub fn oci_index_layout(root: &Path, arches: &[&str], tag: &str) -> IndexFixture {
    write_layout_marker(root);

    let mut manifest_digests = Vec::new();
    let mut layer_digests = Vec::new();
    let mut descriptors = Vec::new();
    for arch in arches {
        let layer = layer_tar_gz(&[TarEntry::file("arch", arch.as_bytes())]);
        let (digest, bytes, _, layers) = write_image(root, &[layer], &default_config(arch));
        descriptors.push(format!(
            r#"{{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"{}","size":{},"platform":{{"architecture":"{}","os":"linux"}}}}"#,
            digest,
            bytes.len(),
            arch
        ));
        manifest_digests.push(digest);
        layer_digests.extend(layers);
    }

    let nested = format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.index.v1+json","manifests":[{}]}}"#,
        descriptors.join(",")
    )
    .into_bytes();
    let index_digest = write_blob(root, &nested);

    let index = format!(
        r#"{{"schemaVersion":2,"manifests":[{{"mediaType":"application/vnd.oci.image.index.v1+json","digest":"{}","size":{},"annotations":{{"org.opencontainers.image.ref.name":"{}"}}}}]}}"#,
        index_digest,
        nested.len(),
        tag
    );
    fs::write(root.join("index.json"), index).unwrap();

    IndexFixture {
        index_digest,
        manifest_digests,
        layer_digests,
    }
}

/// docker-save style tarball with one uncompressed layer per entry list.
pub fn docker_archive_tarball(path: &Path, layers: &[&[TarEntry]]) {
    let staging = tempfile::TempDir::new().unwrap();
    let root = staging.path();

    let config = default_config("amd64");
    let config_name = format!("{}.json", Digest::sha256(config.as_bytes()).hex());
    fs::write(root.join(&config_name), &config).unwrap();

    let mut layer_names = Vec::new();
    for (i, entries) in layers.iter().enumerate() {
        let dir = format!("layer{}", i);
        fs::create_dir_all(root.join(&dir)).unwrap();
        let name = format!("{}/layer.tar", dir);
        fs::write(root.join(&name), layer_tar(entries)).unwrap();
        layer_names.push(format!("\"{}\"", name));
    }

    let manifest = format!(
        r#"[{{"Config":"{}","RepoTags":["example/app:latest"],"Layers":[{}]}}]"#,
        config_name,
        layer_names.join(",")
    );
    fs::write(root.join("manifest.json"), manifest).unwrap();

    tar_directory(root, path);
}

/// Archive the contents of `dir` (not the directory itself) into `out`.
pub fn tar_directory(dir: &Path, out: &Path) {
    let file = fs::File::create(out).unwrap();
    let mut builder = tar::Builder::new(file);
    builder.append_dir_all(".", dir).unwrap();
    builder.finish().unwrap();
}
