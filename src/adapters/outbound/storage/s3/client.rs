use std::time::Duration;

use async_trait::async_trait;
use quick_xml::de::from_str;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::xml::{ListBucketResult, ListVersionsResult, VersioningConfiguration};
use crate::domain::{
    errors::{StorageError, StorageResult},
    models::{KeyListPage, VersionListPage},
};
use crate::ports::storage::{CopySource, VersionedObjectStore};

/// Connection settings for a path-style S3-compatible endpoint.
///
/// Credential material is forwarded as configured; discovery and request
/// signing belong to the deployment, not this client.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub secure: bool,
}

impl S3Config {
    fn base_url(&self, bucket: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}/{}", scheme, self.endpoint, bucket)
    }
}

/// Versioned store adapter speaking the S3 REST API over plain HTTP
pub struct S3VersionedStore {
    config: S3Config,
    http: Client,
    cancel: CancellationToken,
}

impl S3VersionedStore {
    pub fn new(config: S3Config) -> StorageResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| StorageError::StoreUnavailable {
                message: format!("failed to build http client: {err}"),
            })?;
        Ok(Self {
            config,
            http,
            cancel: CancellationToken::new(),
        })
    }

    /// Store calls abort when this token fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn send(&self, request: RequestBuilder) -> StorageResult<Response> {
        let response = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(StorageError::StoreUnavailable {
                    message: "operation cancelled".to_string(),
                });
            }
            sent = request.send() => sent.map_err(|err| StorageError::StoreUnavailable {
                message: err.to_string(),
            })?,
        };
        Ok(response)
    }

    async fn read_listing_body(&self, request: RequestBuilder) -> StorageResult<String> {
        let response = self.send(request).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::BucketNotFound {
                bucket: String::new(),
            });
        }
        if !status.is_success() {
            return Err(StorageError::StoreUnavailable {
                message: format!("listing failed with status {status}"),
            });
        }
        response
            .text()
            .await
            .map_err(|err| StorageError::StoreUnavailable {
                message: err.to_string(),
            })
    }
}

#[async_trait]
impl VersionedObjectStore for S3VersionedStore {
    async fn list_versions(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<&str>,
    ) -> StorageResult<VersionListPage> {
        let mut query: Vec<(&str, &str)> = vec![("versions", ""), ("prefix", prefix)];
        if let Some(marker) = key_marker {
            query.push(("key-marker", marker));
        }
        debug!(bucket, prefix, ?key_marker, "listing object versions");

        let request = self.http.get(self.config.base_url(bucket)).query(&query);
        let body = self
            .read_listing_body(request)
            .await
            .map_err(|err| err.for_bucket(bucket))?;

        let parsed: ListVersionsResult =
            from_str(&body).map_err(|err| StorageError::InvalidResponse {
                message: format!("bad version listing: {err}"),
            })?;

        let mut page = VersionListPage {
            truncated: parsed.is_truncated,
            next_key_marker: parsed.next_key_marker,
            ..VersionListPage::default()
        };
        for entry in parsed.versions {
            page.versions.push(entry.into_record()?);
        }
        for entry in parsed.delete_markers {
            page.delete_markers.push(entry.into_record()?);
        }
        Ok(page)
    }

    async fn list_keys(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> StorageResult<KeyListPage> {
        let mut query: Vec<(&str, &str)> = vec![("list-type", "2"), ("prefix", prefix)];
        if let Some(token) = token {
            query.push(("continuation-token", token));
        }
        debug!(bucket, prefix, "listing keys");

        let request = self.http.get(self.config.base_url(bucket)).query(&query);
        let body = self
            .read_listing_body(request)
            .await
            .map_err(|err| err.for_bucket(bucket))?;

        let parsed: ListBucketResult =
            from_str(&body).map_err(|err| StorageError::InvalidResponse {
                message: format!("bad key listing: {err}"),
            })?;

        Ok(KeyListPage {
            keys: parsed.contents.into_iter().map(|c| c.key).collect(),
            truncated: parsed.is_truncated,
            next_token: parsed.next_continuation_token,
        })
    }

    async fn copy_object(
        &self,
        dst_bucket: &str,
        dst_key: &str,
        source: &CopySource,
    ) -> StorageResult<()> {
        let url = format!("{}/{}", self.config.base_url(dst_bucket), dst_key);
        debug!(dst_bucket, dst_key, source = %source, "copying object");

        let request = self
            .http
            .put(url)
            .header("x-amz-copy-source", source.to_string());
        let response = self.send(request).await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::ObjectNotFound {
                key: source.key.clone(),
            }),
            status => Err(StorageError::MutationRejected {
                key: dst_key.to_string(),
                message: format!("copy failed with status {status}"),
            }),
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let url = format!("{}/{}", self.config.base_url(bucket), key);
        debug!(bucket, key, "writing delete marker");

        let response = self.send(self.http.delete(url)).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StorageError::MutationRejected {
                key: key.to_string(),
                message: format!("delete failed with status {status}"),
            })
        }
    }

    async fn bucket_versioning_enabled(&self, bucket: &str) -> StorageResult<bool> {
        let request = self
            .http
            .get(self.config.base_url(bucket))
            .query(&[("versioning", "")]);
        let body = self
            .read_listing_body(request)
            .await
            .map_err(|err| err.for_bucket(bucket))?;

        let parsed: VersioningConfiguration =
            from_str(&body).map_err(|err| StorageError::InvalidResponse {
                message: format!("bad versioning configuration: {err}"),
            })?;
        Ok(parsed.is_enabled())
    }
}

impl StorageError {
    fn for_bucket(self, bucket: &str) -> Self {
        match self {
            StorageError::BucketNotFound { .. } => StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            },
            other => other,
        }
    }
}
