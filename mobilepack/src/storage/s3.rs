//! Object-store storage backend.

use super::{Storage, StorageError};
use crate::config::StorageSettings;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use tracing::{error, info};

/// Uploads artifacts to an object-store bucket.
///
/// Keys are prefixed with the configured prefix when present; the effective
/// key is `{prefix}/{key}`. A custom endpoint switches the client to
/// path-style addressing for local emulators.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Storage {
    /// Build the backend from storage settings.
    ///
    /// # Panics
    ///
    /// Panics when called without a configured bucket; backend selection
    /// happens before construction.
    pub async fn from_settings(settings: &StorageSettings, region: Option<String>) -> Self {
        let bucket = settings
            .bucket
            .clone()
            .expect("S3Storage requires a configured bucket");

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        if let (Some(access_key), Some(secret_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "mobilepack-env",
            ));
        }
        let base = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&base);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket,
            prefix: settings.prefix.clone(),
        }
    }

    /// Effective object key: `{prefix}/{key}` or the bare key.
    pub fn effective_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_matches('/'), key),
            None => key.to_string(),
        }
    }

    fn content_type_for(key: &str) -> &'static str {
        if key.ends_with(".json") {
            "application/json"
        } else if key.ends_with(".zip") {
            "application/zip"
        } else {
            "application/octet-stream"
        }
    }
}

impl Storage for S3Storage {
    async fn store(&self, key: &str, src: &Path) -> Result<(), StorageError> {
        let effective = self.effective_key(key);
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StorageError::Upload {
                key: effective.clone(),
                message: format!("read {}: {e}", src.display()),
            })?;

        match self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&effective)
            .content_type(Self::content_type_for(key))
            .body(body)
            .send()
            .await
        {
            Ok(_) => {
                info!(key = %effective, bucket = %self.bucket, backend = "s3", "stored artifact");
                Ok(())
            }
            Err(e) => {
                error!(key = %effective, bucket = %self.bucket, error = %e, "upload failed");
                Err(StorageError::Upload {
                    key: effective,
                    message: e.to_string(),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
