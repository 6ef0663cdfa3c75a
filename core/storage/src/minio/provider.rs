//! S3-compatible store over `rust-s3`.

use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::bucket_ops::BucketConfiguration;
use s3::creds::Credentials;
use s3::Region;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

use objstore_common::{
    resolve_bucket, validate_bucket_name, Error, ObjectPath, Result, PATH_SEPARATOR,
};

use super::error::{check_response, is_success, map_s3_error, status_error};
use crate::config::{scheme, DriverConfig, DEFAULT_REGION};
use crate::store::{content_type_for, encode_key, BucketInfo, ObjectMetadata, Store};
use crate::stream::{probe_size, DataSource};

/// Driver name of the S3-compatible backend.
pub const DRIVER_NAME: &str = "minio";

fn default_true() -> bool {
    true
}

/// Configuration for a self-hosted S3-compatible service.
#[derive(Clone, Serialize, Deserialize)]
pub struct MinioConfig {
    /// Host and optional port, e.g. `localhost:9000`. A scheme prefix is
    /// accepted and overrides `use_ssl`.
    #[serde(default)]
    pub endpoint: String,
    /// Access key id.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
    /// Optional session token.
    #[serde(default)]
    pub token: Option<String>,
    /// Signing region. Blank means [`DEFAULT_REGION`].
    #[serde(default)]
    pub region: String,
    /// Use HTTPS.
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    /// Address buckets as path segments instead of subdomains.
    #[serde(default = "default_true")]
    pub use_path_style: bool,
}

impl MinioConfig {
    /// Create a config with the given endpoint and static credentials.
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            token: None,
            region: String::new(),
            use_ssl: true,
            use_path_style: true,
        }
    }

    /// Check that every required field is present.
    ///
    /// # Errors
    /// - `InvalidEndpoint`, `InvalidAccessKey` or `InvalidSecretKey` for the
    ///   first blank field
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::InvalidEndpoint);
        }
        if self.access_key.is_empty() {
            return Err(Error::InvalidAccessKey);
        }
        if self.secret_key.is_empty() {
            return Err(Error::InvalidSecretKey);
        }
        Ok(())
    }

    /// Full endpoint URL, scheme included.
    pub fn endpoint_url(&self) -> Result<String> {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        let raw = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("{}://{}", scheme(self.use_ssl), endpoint)
        };
        let url = Url::parse(&raw).map_err(|_| Error::InvalidEndpoint)?;
        if url.host_str().is_none() {
            return Err(Error::InvalidEndpoint);
        }
        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}

impl fmt::Debug for MinioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinioConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("region", &self.region)
            .field("use_ssl", &self.use_ssl)
            .field("use_path_style", &self.use_path_style)
            .finish()
    }
}

impl DriverConfig for MinioConfig {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn non_empty_region(region: &str) -> String {
    if region.is_empty() {
        warn!(default = DEFAULT_REGION, "No region configured, using default");
        DEFAULT_REGION.to_string()
    } else {
        region.to_string()
    }
}

/// Store backed by a self-hosted S3-compatible service.
///
/// Construction only validates configuration and builds signing state; the
/// first network round trip happens on the first operation.
pub struct MinioStore {
    config: MinioConfig,
    endpoint: String,
    region: Region,
    credentials: Credentials,
    bucket: Option<String>,
}

impl MinioStore {
    /// Create a store from configuration.
    ///
    /// # Errors
    /// - `InvalidEndpoint`, `InvalidAccessKey` or `InvalidSecretKey` for
    ///   missing settings
    /// - `InvalidEndpoint` if the endpoint is not a valid URL authority
    /// - `ClientInit` if the credentials cannot be built
    pub fn new(mut config: MinioConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint_url()?;
        if endpoint.starts_with("http://") {
            warn!(endpoint = %endpoint, "S3-compatible endpoint is not using TLS");
        }

        config.region = non_empty_region(&config.region);
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            config.token.as_deref(),
            None,
            None,
        )
        .map_err(|e| Error::ClientInit(e.to_string()))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: endpoint.clone(),
        };

        debug!(endpoint = %endpoint, region = %config.region, "Created S3-compatible store");

        Ok(Self {
            config,
            endpoint,
            region,
            credentials,
            bucket: None,
        })
    }

    /// The resolved endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The signing region.
    pub fn region(&self) -> &str {
        &self.config.region
    }

    fn client(&self, bucket: &str) -> Result<Box<Bucket>> {
        let client = Bucket::new(bucket, self.region.clone(), self.credentials.clone())
            .map_err(|e| map_s3_error(e, bucket, Error::BucketNotFound))?;
        Ok(if self.config.use_path_style {
            client.with_path_style()
        } else {
            client
        })
    }

    /// Resolve a name, rejecting keys the client would silently rewrite.
    ///
    /// `rust-s3` strips a leading separator from keys, so `/x` and `x` would
    /// address the same object.
    fn resolve(&self, name: &str) -> Result<ObjectPath> {
        let path = ObjectPath::split(self.bucket.as_deref(), name)?;
        if path.key().starts_with(PATH_SEPARATOR) {
            return Err(Error::InvalidObjectName(name.to_string()));
        }
        Ok(path)
    }

    async fn head(&self, path: &ObjectPath) -> Result<Option<ObjectMetadata>> {
        let client = self.client(path.bucket())?;
        let (head, status) = match client.head_object(path.key()).await {
            Ok(result) => result,
            Err(e) => {
                return match map_s3_error(e, &path.to_string(), Error::ObjectNotFound) {
                    Error::ObjectNotFound(_) => Ok(None),
                    other => Err(other),
                }
            }
        };

        if status == 404 {
            return Ok(None);
        }
        if !is_success(status) {
            return Err(status_error(status, "", &path.to_string(), Error::ObjectNotFound));
        }

        Ok(Some(ObjectMetadata {
            key: path.key().to_string(),
            size: head.content_length.unwrap_or(0).max(0) as u64,
            content_type: content_type_for(path.key(), head.content_type.as_deref().unwrap_or("")),
            etag: head.e_tag.unwrap_or_default().trim_matches('"').to_string(),
            last_modified: head.last_modified.unwrap_or_default(),
        }))
    }

    async fn get(&self, path: &ObjectPath) -> Result<Option<Vec<u8>>> {
        let client = self.client(path.bucket())?;
        let resource = path.to_string();
        let outcome = match client.get_object(path.key()).await {
            Ok(response) => check_response(response, &resource, Error::ObjectNotFound),
            Err(e) => Err(map_s3_error(e, &resource, Error::ObjectNotFound)),
        };
        match outcome {
            Ok(response) => Ok(Some(response.bytes().to_vec())),
            Err(Error::ObjectNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, path: &ObjectPath, data: DataSource, content_type: &str) -> Result<()> {
        let (mut data, size) = probe_size(data)
            .await
            .map_err(|e| Error::PreconditionFailed(format!("cannot determine size: {}", e)))?;
        let content_type = content_type_for(path.key(), content_type);
        let resource = path.to_string();

        let client = self.client(path.bucket())?;
        let response = client
            .put_object_stream_with_content_type(&mut data, path.key(), &content_type)
            .await
            .map_err(|e| map_s3_error(e, &resource, Error::BucketNotFound))?;
        let status = response.status_code();
        if !is_success(status) {
            return Err(status_error(status, "", &resource, Error::BucketNotFound));
        }

        debug!(object = %resource, size, content_type = %content_type, "Uploaded object");
        Ok(())
    }
}

#[async_trait]
impl Store for MinioStore {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn set_bucket(&mut self, name: &str) -> Result<bool> {
        if name.is_empty() {
            warn!("Clearing bound bucket");
            self.bucket = None;
            return Ok(false);
        }
        validate_bucket_name(name)?;

        let found = self
            .client(name)?
            .exists()
            .await
            .map_err(|e| map_s3_error(e, name, Error::BucketNotFound))?;
        if !found {
            return Err(Error::BucketNotFound(name.to_string()));
        }

        self.bucket = Some(name.to_string());
        debug!(bucket = %name, "Bound bucket");
        Ok(true)
    }

    async fn set_region(&mut self, region: &str) -> Result<()> {
        self.config.region = non_empty_region(region);
        self.region = Region::Custom {
            region: self.config.region.clone(),
            endpoint: self.endpoint.clone(),
        };
        debug!(region = %self.config.region, "Updated region");
        Ok(())
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        validate_bucket_name(name)?;

        let region = self.region.clone();
        let credentials = self.credentials.clone();
        let bucket_config = BucketConfiguration::default();
        let response = if self.config.use_path_style {
            Bucket::create_with_path_style(name, region, credentials, bucket_config).await
        } else {
            Bucket::create(name, region, credentials, bucket_config).await
        }
        .map_err(|e| map_s3_error(e, name, Error::BucketNotFound))?;

        if !response.success() {
            return Err(status_error(
                response.response_code,
                &response.response_text,
                name,
                Error::BucketNotFound,
            ));
        }

        info!(bucket = %name, "Created bucket");
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        validate_bucket_name(name)?;

        let outcome = match self.client(name)?.delete().await {
            Ok(status) if is_success(status) => Ok(()),
            Ok(status) => Err(status_error(status, "", name, Error::BucketNotFound)),
            Err(e) => Err(map_s3_error(e, name, Error::BucketNotFound)),
        };

        match outcome {
            Ok(()) => {
                info!(bucket = %name, "Deleted bucket");
                Ok(())
            }
            Err(Error::BucketNotFound(_)) => {
                debug!(bucket = %name, "Bucket already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let response = Bucket::list_buckets(self.region.clone(), self.credentials.clone())
            .await
            .map_err(|e| map_s3_error(e, &self.endpoint, Error::BucketNotFound))?;

        Ok(response
            .buckets
            .bucket
            .into_iter()
            .map(|bucket| BucketInfo {
                creation_date: bucket.creation_date.to_string(),
                name: bucket.name,
            })
            .collect())
    }

    async fn create_object(&self, name: &str, data: DataSource, content_type: &str) -> Result<()> {
        let path = self.resolve(name)?;
        self.put(&path, data, content_type).await
    }

    async fn read_object(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(name)?;
        self.get(&path).await
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        let resource = path.to_string();
        let outcome = match self.client(path.bucket())?.delete_object(path.key()).await {
            Ok(response) => check_response(response, &resource, Error::ObjectNotFound).map(|_| ()),
            Err(e) => Err(map_s3_error(e, &resource, Error::ObjectNotFound)),
        };

        match outcome {
            Ok(()) | Err(Error::ObjectNotFound(_)) => {
                debug!(object = %resource, "Deleted object");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectMetadata>> {
        let bucket = resolve_bucket(self.bucket.as_deref(), bucket)?;
        let pages = self
            .client(&bucket)?
            .list(String::new(), None)
            .await
            .map_err(|e| map_s3_error(e, &bucket, Error::BucketNotFound))?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| ObjectMetadata {
                content_type: content_type_for(&object.key, ""),
                size: object.size,
                etag: object.e_tag.unwrap_or_default().trim_matches('"').to_string(),
                last_modified: object.last_modified,
                key: object.key,
            })
            .collect())
    }

    async fn exists(&self, name: &str) -> Result<Option<ObjectMetadata>> {
        let path = self.resolve(name)?;
        self.head(&path).await
    }

    async fn copy_object(&self, src: &str, dest: &str) -> Result<()> {
        let src = self.resolve(src)?;
        let dest = self.resolve(dest)?;

        if src == dest {
            self.head(&src)
                .await?
                .ok_or_else(|| Error::ObjectNotFound(src.to_string()))?;
            return Ok(());
        }

        if src.bucket() == dest.bucket() {
            let status = self
                .client(dest.bucket())?
                .copy_object_internal(encode_key(src.key()), dest.key())
                .await
                .map_err(|e| map_s3_error(e, &src.to_string(), Error::ObjectNotFound))?;
            if !is_success(status) {
                return Err(status_error(status, "", &src.to_string(), Error::ObjectNotFound));
            }
        } else {
            let metadata = self
                .head(&src)
                .await?
                .ok_or_else(|| Error::ObjectNotFound(src.to_string()))?;
            let data = self
                .get(&src)
                .await?
                .ok_or_else(|| Error::ObjectNotFound(src.to_string()))?;
            self.put(&dest, DataSource::from(data), &metadata.content_type)
                .await?;
        }

        debug!(from = %src, to = %dest, "Copied object");
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        debug!(endpoint = %self.endpoint, "S3-compatible store released");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.config.validate()?;
        self.config.endpoint_url()?;
        Ok(())
    }
}
