//! Read-only OCI distribution API handlers.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio_util::io::ReaderStream;

use super::store::LocalRegistry;
use crate::oci::Digest;

const API_VERSION_HEADER: &str = "docker-distribution-api-version";
const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";
const API_VERSION: &str = "registry/2.0";

/// Build the distribution API router over `registry`.
pub(crate) fn router(registry: LocalRegistry) -> Router {
    Router::new()
        .route("/v2", get(api_version))
        .route("/v2/", get(api_version))
        .route("/v2/{*path}", get(dispatch))
        .fallback(unknown_route)
        .with_state(registry)
}

/// Distribution API error, rendered as `{"errors":[{"code","message"}]}`.
#[derive(Debug)]
pub(crate) enum ApiError {
    NameUnknown(String),
    ManifestUnknown(String),
    BlobUnknown(String),
    DigestInvalid(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NameUnknown(_) | ApiError::ManifestUnknown(_) | ApiError::BlobUnknown(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::DigestInvalid(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NameUnknown(_) => "NAME_UNKNOWN",
            ApiError::ManifestUnknown(_) => "MANIFEST_UNKNOWN",
            ApiError::BlobUnknown(_) => "BLOB_UNKNOWN",
            ApiError::DigestInvalid(_) => "DIGEST_INVALID",
            ApiError::Internal(_) => "UNKNOWN",
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::NameUnknown(m)
            | ApiError::ManifestUnknown(m)
            | ApiError::BlobUnknown(m)
            | ApiError::DigestInvalid(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self.message(), "Registry request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self.message(), "Registry lookup missed");
        }

        let body = serde_json::json!({
            "errors": [{ "code": self.code(), "message": self.message() }]
        });
        (status, [(API_VERSION_HEADER, API_VERSION)], Json(body)).into_response()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Manifest { name: String, reference: String },
    Blob { name: String, digest: String },
}

/// Split `<name>/manifests/<ref>` or `<name>/blobs/<digest>`; names may contain `/`.
fn parse_route(path: &str) -> Option<Route> {
    let path = path.strip_prefix('/').unwrap_or(path);

    if let Some(idx) = path.rfind("/blobs/") {
        let name = &path[..idx];
        let digest = &path[idx + "/blobs/".len()..];
        if !name.is_empty() && !digest.is_empty() {
            return Some(Route::Blob {
                name: name.to_string(),
                digest: digest.to_string(),
            });
        }
    }

    if let Some(idx) = path.rfind("/manifests/") {
        let name = &path[..idx];
        let reference = &path[idx + "/manifests/".len()..];
        if !name.is_empty() && !reference.is_empty() {
            return Some(Route::Manifest {
                name: name.to_string(),
                reference: reference.to_string(),
            });
        }
    }

    None
}

async fn api_version() -> impl IntoResponse {
    (StatusCode::OK, [(API_VERSION_HEADER, API_VERSION)])
}

async fn unknown_route(method: Method, uri: Uri) -> StatusCode {
    tracing::warn!(method = %method, uri = %uri, "Unhandled registry request");
    StatusCode::NOT_FOUND
}

async fn dispatch(
    method: Method,
    uri: Uri,
    State(registry): State<LocalRegistry>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    match parse_route(&path) {
        Some(Route::Manifest { name, reference }) => {
            get_manifest(method, &registry, &name, &reference)
        }
        Some(Route::Blob { name, digest }) => get_blob(method, &registry, &name, &digest).await,
        None => Ok(unknown_route(method, uri).await.into_response()),
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| ApiError::Internal(format!("Invalid value for {}: {}", name, e)))?;
    headers.insert(name, value);
    Ok(())
}

fn get_manifest(
    method: Method,
    registry: &LocalRegistry,
    name: &str,
    reference: &str,
) -> Result<Response, ApiError> {
    let entry = registry
        .get(name)
        .ok_or_else(|| ApiError::NameUnknown(format!("unknown repository {}", name)))?;

    let manifest = entry
        .archive
        .artifact()
        .resolve_manifest(reference)
        .ok_or_else(|| ApiError::ManifestUnknown(format!("{}:{}", name, reference)))?;

    let mut headers = HeaderMap::new();
    insert_header(&mut headers, header::CONTENT_TYPE, &manifest.media_type)?;
    insert_header(
        &mut headers,
        HeaderName::from_static(CONTENT_DIGEST_HEADER),
        &manifest.digest.to_string(),
    )?;
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(manifest.bytes.len()));
    headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

    tracing::debug!(
        name = %name,
        reference = %reference,
        digest = %manifest.digest,
        "Serving manifest"
    );

    if method == Method::HEAD {
        return Ok((StatusCode::OK, headers, Body::empty()).into_response());
    }
    Ok((StatusCode::OK, headers, Body::from(manifest.bytes.clone())).into_response())
}

async fn get_blob(
    method: Method,
    registry: &LocalRegistry,
    name: &str,
    digest: &str,
) -> Result<Response, ApiError> {
    let entry = registry
        .get(name)
        .ok_or_else(|| ApiError::NameUnknown(format!("unknown repository {}", name)))?;

    let digest = Digest::parse(digest).map_err(|e| ApiError::DigestInvalid(e.to_string()))?;

    let blob = entry
        .archive
        .artifact()
        .resolve_blob(&digest)
        .ok_or_else(|| ApiError::BlobUnknown(format!("{}@{}", name, digest)))?;

    let file = tokio::fs::File::open(&blob.path).await.map_err(|e| {
        ApiError::Internal(format!("Failed to open blob {}: {}", blob.path.display(), e))
    })?;
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to stat blob {}: {}", digest, e)))?
        .len();

    let mut headers = HeaderMap::new();
    insert_header(&mut headers, header::CONTENT_TYPE, &blob.media_type)?;
    insert_header(
        &mut headers,
        HeaderName::from_static(CONTENT_DIGEST_HEADER),
        &digest.to_string(),
    )?;
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

    tracing::debug!(name = %name, digest = %digest, size, "Serving blob");

    if method == Method::HEAD {
        return Ok((StatusCode::OK, headers, Body::empty()).into_response());
    }
    Ok((StatusCode::OK, headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
