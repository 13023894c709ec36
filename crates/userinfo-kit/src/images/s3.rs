//! Remote tier of the image cache: a thin client over S3-compatible object
//! storage (MinIO locally, AWS in production).
//!
//! No retry policy lives here; a transient network failure is a single
//! `Transport` outcome and remediation belongs to the caller.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::{debug, info};

use crate::backend::RemoteImageStore;
use crate::config::Config;
use crate::errors::StoreError;
use crate::images::format::ImageFormat;

/// Fixed download cap. Anything larger fails with `SizeExceeded` so callers
/// can tell a too-big object apart from a network fault.
pub const MAX_DOWNLOAD_BYTES: u64 = 5 * 1024 * 1024;

pub struct S3ImageStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    endpoint: String,
}

impl S3ImageStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, endpoint: String) -> Self {
        Self {
            client,
            bucket,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Builds the client for MinIO (local) or AWS (production) from env
    /// config.
    pub async fn from_config(config: &Config) -> Self {
        let credentials = Credentials::new(
            &config.aws_access_key_id,
            &config.aws_secret_access_key,
            None,
            None,
            "userinfo-kit-static",
        );

        let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(&config.s3_endpoint)
            .load()
            .await;

        info!("S3 image store initialized (bucket: {})", config.s3_bucket);
        Self::new(
            aws_sdk_s3::Client::new(&s3_config),
            config.s3_bucket.clone(),
            config.s3_endpoint.clone(),
        )
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, path)
    }

    /// Reduces a durable URL back to the object path; bare paths pass
    /// through.
    fn path_from(&self, url_or_path: &str) -> String {
        let prefix = format!("{}/{}/", self.endpoint, self.bucket);
        url_or_path
            .strip_prefix(&prefix)
            .unwrap_or(url_or_path)
            .to_string()
    }
}

#[async_trait]
impl RemoteImageStore for S3ImageStore {
    async fn put(&self, bytes: Bytes, path: &str) -> Result<String, StoreError> {
        let content_type = ImageFormat::sniff(&bytes)
            .ok_or(StoreError::Encode)?
            .content_type();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("S3 upload failed: {e}")))?;

        // The upload and the URL resolution succeed together or the call
        // fails; a retry with the same path re-covers an orphaned blob.
        let url = self.url_for(path);
        debug!("uploaded image to {url}");
        Ok(url)
    }

    async fn get(&self, path: &str) -> Result<Bytes, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    StoreError::NotFound(path.to_string())
                } else {
                    StoreError::Transport(format!("S3 download failed: {service_err}"))
                }
            })?;

        // Enforce the cap before draining the stream when the service
        // reports a length, and again after in case it did not.
        if let Some(len) = output.content_length() {
            if len as u64 > MAX_DOWNLOAD_BYTES {
                return Err(StoreError::SizeExceeded {
                    actual: len as u64,
                    limit: MAX_DOWNLOAD_BYTES,
                });
            }
        }
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Transport(format!("S3 body read failed: {e}")))?
            .into_bytes();
        if data.len() as u64 > MAX_DOWNLOAD_BYTES {
            return Err(StoreError::SizeExceeded {
                actual: data.len() as u64,
                limit: MAX_DOWNLOAD_BYTES,
            });
        }
        Ok(data)
    }

    async fn delete(&self, url_or_path: &str) -> Result<(), StoreError> {
        let path = self.path_from(url_or_path);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&path)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("S3 delete failed: {e}")))?;
        debug!("deleted remote image {path}");
        Ok(())
    }
}
