// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AWS SDK implementation of the object-storage adapter.
//!
//! Credentials resolve through the standard AWS chain (environment,
//! profile, instance role). `endpoint_url` supports S3-compatible stores.

use crate::s3::{ObjectInfo, ObjectStore, StoreError};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use std::time::Duration;

/// Object-storage client bound to one bucket.
#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Build from the ambient AWS environment plus optional overrides.
    pub async fn connect(
        bucket: impl Into<String>,
        region: &str,
        endpoint_url: Option<&str>,
    ) -> Self {
        let region = aws_config::Region::new(region.to_string());
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&base);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn presign_put(&self, key: &str, expires_in: Duration) -> Result<String, StoreError> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| StoreError::Presign(err.to_string()))?;
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| StoreError::Presign(err.to_string()))?;
        Ok(presigned.uri().to_string())
    }

    async fn head_object(&self, key: &str) -> Result<ObjectInfo, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(ObjectInfo {
                size: output.content_length().unwrap_or(0).max(0) as u64,
            }),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Err(StoreError::NotFound(format!(
                        "s3://{}/{key}",
                        self.bucket
                    )))
                } else {
                    Err(StoreError::Other(service_err.to_string()))
                }
            }
        }
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
