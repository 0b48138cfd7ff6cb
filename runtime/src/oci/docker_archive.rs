//! docker-save tarball support.
//!
//! A docker-save archive has no registry manifest of its own, only a
//! `manifest.json` listing the config file and layer tarballs. A Docker
//! schema-2 manifest is synthesized from it so the image can be served
//! and unpacked like any other.

use oci_build_core::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Component, Path};

use super::artifact::{BlobRef, ImageSource, LayerDescriptor, ManifestBlob};
use super::digest::Digest;
use super::layers::{media_types, Compression};

/// One entry of a docker-save `manifest.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SaveEntry {
    config: String,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
    layers: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SchemaDescriptor<'a> {
    media_type: &'a str,
    size: u64,
    digest: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SchemaManifest<'a> {
    schema_version: u32,
    media_type: &'a str,
    config: SchemaDescriptor<'a>,
    layers: Vec<SchemaDescriptor<'a>>,
}

/// Load the single image of an extracted docker-save archive.
pub(crate) fn load(root: &Path) -> Result<ImageSource> {
    let manifest_path = root.join("manifest.json");
    let raw = std::fs::read(&manifest_path).map_err(|e| {
        BuildError::OciImageError(format!(
            "Failed to read {}: {}",
            manifest_path.display(),
            e
        ))
    })?;
    let entries: Vec<SaveEntry> = serde_json::from_slice(&raw).map_err(|e| {
        BuildError::OciImageError(format!("Failed to parse docker manifest.json: {}", e))
    })?;

    let entry = match entries.as_slice() {
        [entry] => entry,
        [] => {
            return Err(BuildError::OciImageError(
                "docker manifest.json lists no images".to_string(),
            ))
        }
        many => {
            return Err(BuildError::OciImageError(format!(
                "docker archive contains {} images, expected exactly one",
                many.len()
            )))
        }
    };

    if let Some(tags) = &entry.repo_tags {
        tracing::debug!(tags = ?tags, "Loading docker-save archive");
    }

    let config = file_blob(root, &entry.config, media_types::DOCKER_CONFIG.to_string())?;
    let layers = entry
        .layers
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let media_type = layer_media_type(&root.join(checked_relative(name)?))?;
            Ok(LayerDescriptor {
                index,
                blob: file_blob(root, name, media_type.to_string())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let manifest = SchemaManifest {
        schema_version: 2,
        media_type: media_types::DOCKER_MANIFEST,
        config: descriptor(&config),
        layers: layers.iter().map(|layer| descriptor(&layer.blob)).collect(),
    };
    let bytes = serde_json::to_vec(&manifest)?;

    Ok(ImageSource {
        manifest: ManifestBlob::new(bytes, media_types::DOCKER_MANIFEST),
        config,
        layers,
        platform: None,
        ref_name: None,
        annotated: false,
    })
}

fn descriptor(blob: &BlobRef) -> SchemaDescriptor<'_> {
    SchemaDescriptor {
        media_type: &blob.media_type,
        size: blob.size,
        digest: blob.digest.to_string(),
    }
}

/// Reject absolute paths and parent traversal in archive-relative names.
fn checked_relative(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(BuildError::OciImageError(format!(
            "docker archive references path outside the archive: {}",
            name
        )));
    }
    Ok(path)
}

fn file_blob(root: &Path, name: &str, media_type: String) -> Result<BlobRef> {
    let path = root.join(checked_relative(name)?);
    let size = std::fs::metadata(&path)
        .map_err(|e| {
            BuildError::OciImageError(format!("Missing blob {} in docker archive: {}", name, e))
        })?
        .len();

    Ok(BlobRef {
        digest: Digest::sha256_file(&path)?,
        media_type,
        size,
        path,
    })
}

fn layer_media_type(path: &Path) -> Result<&'static str> {
    let mut head = [0u8; 4];
    let mut file = std::fs::File::open(path).map_err(|e| {
        BuildError::OciImageError(format!("Failed to open layer {}: {}", path.display(), e))
    })?;
    let n = file.read(&mut head)?;

    Ok(match Compression::sniff(&head[..n]) {
        Compression::None => media_types::DOCKER_LAYER,
        Compression::Gzip => media_types::DOCKER_LAYER_GZIP,
        Compression::Zstd => media_types::OCI_LAYER_ZSTD,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::testutil::{layer_tar, layer_tar_gz, TarEntry};
    use std::fs;
    use tempfile::TempDir;

    fn write_save(root: &Path, layers: &[(&str, Vec<u8>)]) {
        fs::write(root.join("config.json"), br#"{"config":{}}"#).unwrap();
        let mut names = Vec::new();
        for (name, bytes) in layers {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, bytes).unwrap();
            names.push(format!("\"{}\"", name));
        }
        fs::write(
            root.join("manifest.json"),
            format!(
                r#"[{{"Config":"config.json","RepoTags":null,"Layers":[{}]}}]"#,
                names.join(",")
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_synthesized_manifest_describes_blobs() {
        let temp_dir = TempDir::new().unwrap();
        let plain = layer_tar(&[TarEntry::file("a", b"1")]);
        let gz = layer_tar_gz(&[TarEntry::file("b", b"2")]);
        write_save(
            temp_dir.path(),
            &[("l1/layer.tar", plain.clone()), ("l2/layer.tar", gz.clone())],
        );

        let image = load(temp_dir.path()).unwrap();
        assert_eq!(image.layers.len(), 2);
        assert_eq!(image.layers[0].media_type(), media_types::DOCKER_LAYER);
        assert_eq!(image.layers[1].media_type(), media_types::DOCKER_LAYER_GZIP);
        assert_eq!(image.layers[0].digest(), &Digest::sha256(&plain));
        assert_eq!(image.layers[1].size(), gz.len() as u64);
        assert_eq!(image.config.media_type, media_types::DOCKER_CONFIG);

        let manifest: serde_json::Value = serde_json::from_slice(&image.manifest.bytes).unwrap();
        assert_eq!(manifest["schemaVersion"], 2);
        assert_eq!(manifest["mediaType"], media_types::DOCKER_MANIFEST);
        assert_eq!(
            manifest["config"]["digest"],
            image.config.digest.to_string()
        );
        assert_eq!(
            manifest["layers"][1]["digest"],
            Digest::sha256(&gz).to_string()
        );
        assert_eq!(image.manifest.digest, Digest::sha256(&image.manifest.bytes));
    }

    #[test]
    fn test_rejects_multiple_images() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("manifest.json"),
            r#"[{"Config":"a.json","Layers":[]},{"Config":"b.json","Layers":[]}]"#,
        )
        .unwrap();

        let err = load(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("expected exactly one"));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("manifest.json"),
            r#"[{"Config":"../outside.json","Layers":[]}]"#,
        )
        .unwrap();

        let err = load(temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("outside the archive"));
    }
}
