use axum::http::{HeaderMap, header};
use bytes::Bytes;
use uuid::Uuid;

use agora_db::{Database, storage::extension_for};
use agora_types::models::Bucket;

use crate::error::ApiError;

/// 10 MB limit for avatars and post images
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;
/// 50 MB limit for story media and book files
pub const MAX_MEDIA_SIZE: usize = 50 * 1024 * 1024;

const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/gif", "image/webp"];
const VIDEO_TYPES: &[&str] = &["video/mp4", "video/webm"];

/// What a route accepts in its raw request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Media,
    Document,
}

impl UploadKind {
    fn max_size(self) -> usize {
        match self {
            Self::Image => MAX_IMAGE_SIZE,
            Self::Media | Self::Document => MAX_MEDIA_SIZE,
        }
    }

    fn accepts(self, content_type: &str) -> bool {
        match self {
            Self::Image => IMAGE_TYPES.contains(&content_type),
            Self::Media => IMAGE_TYPES.contains(&content_type) || VIDEO_TYPES.contains(&content_type),
            Self::Document => content_type == "application/pdf" || IMAGE_TYPES.contains(&content_type),
        }
    }
}

/// Content type of the body, without parameters.
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
}

/// Check the body against the limits of `kind` and return its content type.
pub fn check(kind: UploadKind, headers: &HeaderMap, bytes: &Bytes) -> Result<String, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::bad_request("empty upload"));
    }
    if bytes.len() > kind.max_size() {
        return Err(ApiError::PayloadTooLarge);
    }
    let content_type = content_type(headers)
        .ok_or_else(|| ApiError::bad_request("missing content type"))?;
    if !kind.accepts(&content_type) {
        return Err(ApiError::bad_request(format!(
            "unsupported content type {}",
            content_type
        )));
    }
    Ok(content_type)
}

/// Store the body under `{owner}/{uuid}.{ext}` and return its public URL.
pub async fn store(
    db: &Database,
    bucket: Bucket,
    owner: Uuid,
    bytes: Bytes,
    content_type: &str,
) -> Result<String, ApiError> {
    let path = bucket.object_path(owner, extension_for(content_type));
    Ok(db.upload(bucket, &path, bytes, content_type).await?)
}
