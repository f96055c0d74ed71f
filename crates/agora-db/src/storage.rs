use bytes::Bytes;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};

use agora_types::models::Bucket;

use crate::{Database, Result, status_error};

impl Database {
    /// Public URL of an object in a public bucket.
    pub fn public_url(&self, bucket: Bucket, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url(),
            bucket.as_str(),
            path
        )
    }

    /// Store `bytes` at `bucket/path`, replacing any existing object, and
    /// return its public URL.
    pub async fn upload(
        &self,
        bucket: Bucket,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String> {
        let size = bytes.len();
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url(),
            bucket.as_str(),
            path
        );

        let resp = self
            .request(Method::POST, &url)
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await?;
            return Err(status_error(status, &body));
        }

        info!("Stored {} bytes at {}/{}", size, bucket.as_str(), path);
        Ok(self.public_url(bucket, path))
    }

    pub async fn remove(&self, bucket: Bucket, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let url = format!("{}/storage/v1/object/{}", self.base_url(), bucket.as_str());
        let resp = self
            .request(Method::DELETE, &url)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await?;
            return Err(status_error(status, &body));
        }

        debug!("Removed {} objects from {}", paths.len(), bucket.as_str());
        Ok(())
    }

    /// Object path of a public URL previously returned by [`Database::upload`].
    pub fn object_path_from_url(&self, bucket: Bucket, url: &str) -> Option<String> {
        let prefix = self.public_url(bucket, "");
        url.strip_prefix(&prefix).map(str::to_string)
    }
}

/// File extension for an uploaded content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}
