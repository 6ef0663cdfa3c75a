//! Cloud S3 store over `aws-sdk-s3`.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::{ByteStream, DateTime, DateTimeFormat};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use tracing::{debug, info, warn};

use objstore_common::{resolve_bucket, validate_bucket_name, Error, ObjectPath, Result};

use super::error::map_sdk_error;
use crate::config::{scheme, DriverConfig, DEFAULT_REGION};
use crate::store::{content_type_for, encode_key, BucketInfo, ObjectMetadata, Store};
use crate::stream::{probe_size, DataSource};

/// Driver name of the cloud S3 backend.
pub const DRIVER_NAME: &str = "aws";

/// Provider name attached to the static credentials.
const CREDENTIALS_PROVIDER: &str = "objstore";

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_true() -> bool {
    true
}

/// Configuration for cloud S3.
#[derive(Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Service region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket bound at construction. Blank leaves the store unbound.
    #[serde(default)]
    pub bucket: String,
    /// Endpoint override (host and optional port) for S3-compatible gateways.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Access key id.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
    /// Optional session token.
    #[serde(default)]
    pub token: Option<String>,
    /// Use HTTPS for the endpoint override.
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    /// Address buckets as path segments instead of subdomains.
    #[serde(default)]
    pub use_path_style: bool,
}

impl AwsConfig {
    /// Create a config for `bucket` in `region` with static credentials.
    pub fn new(
        region: impl Into<String>,
        bucket: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
            endpoint: None,
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            token: None,
            use_ssl: true,
            use_path_style: false,
        }
    }

    /// Route requests to a custom endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Check that the credentials are present.
    ///
    /// # Errors
    /// - `InvalidAccessKey` or `InvalidSecretKey` for a blank key
    /// - `InvalidEndpoint` for a blank endpoint override
    pub fn validate(&self) -> Result<()> {
        if self.access_key.is_empty() {
            return Err(Error::InvalidAccessKey);
        }
        if self.secret_key.is_empty() {
            return Err(Error::InvalidSecretKey);
        }
        if matches!(&self.endpoint, Some(endpoint) if endpoint.trim().is_empty()) {
            return Err(Error::InvalidEndpoint);
        }
        Ok(())
    }

    /// Endpoint override URL, scheme included.
    pub fn endpoint_url(&self) -> Option<String> {
        self.endpoint.as_deref().map(|endpoint| {
            let endpoint = endpoint.trim().trim_end_matches('/');
            if endpoint.contains("://") {
                endpoint.to_string()
            } else {
                format!("{}://{}", scheme(self.use_ssl), endpoint)
            }
        })
    }
}

impl fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("use_ssl", &self.use_ssl)
            .field("use_path_style", &self.use_path_style)
            .finish()
    }
}

impl DriverConfig for AwsConfig {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn format_date(date: Option<&DateTime>) -> String {
    date.and_then(|date| date.fmt(DateTimeFormat::DateTime).ok())
        .unwrap_or_default()
}

fn trim_etag(etag: Option<&str>) -> String {
    etag.unwrap_or_default().trim_matches('"').to_string()
}

/// Store backed by cloud S3.
pub struct AwsStore {
    client: Client,
    region: String,
    bucket: Option<String>,
}

impl AwsStore {
    /// Create a store from configuration.
    ///
    /// No request is sent; reachability is checked by [`Store::health_check`].
    ///
    /// # Errors
    /// - `InvalidAccessKey`, `InvalidSecretKey` or `InvalidEndpoint` for
    ///   missing settings
    pub fn new(mut config: AwsConfig) -> Result<Self> {
        config.validate()?;
        if config.region.is_empty() {
            warn!(default = DEFAULT_REGION, "No region configured, using default");
            config.region = DEFAULT_REGION.to_string();
        }

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            config.token.clone(),
            None,
            CREDENTIALS_PROVIDER,
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(config.use_path_style);

        if let Some(endpoint) = config.endpoint_url() {
            if endpoint.starts_with("http://") {
                warn!(endpoint = %endpoint, "S3 endpoint override is not using TLS");
            }
            builder = builder.endpoint_url(endpoint);
        }

        let bucket = if config.bucket.is_empty() {
            None
        } else {
            validate_bucket_name(&config.bucket)?;
            Some(config.bucket.clone())
        };

        debug!(region = %config.region, bucket = ?bucket, "Created S3 store");

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region: config.region,
            bucket,
        })
    }

    /// The service region.
    pub fn region(&self) -> &str {
        &self.region
    }

    fn resolve(&self, name: &str) -> Result<ObjectPath> {
        ObjectPath::split(self.bucket.as_deref(), name)
    }

    async fn put(&self, path: &ObjectPath, data: DataSource, content_type: &str) -> Result<()> {
        let (data, size) = probe_size(data)
            .await
            .map_err(|e| Error::PreconditionFailed(format!("cannot determine size: {}", e)))?;
        let body = data.into_bytes(size).await?;
        let content_type = content_type_for(path.key(), content_type);
        let resource = path.to_string();

        self.client
            .put_object()
            .bucket(path.bucket())
            .key(path.key())
            .content_type(&content_type)
            .content_length(size as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &resource, Error::BucketNotFound))?;

        debug!(object = %resource, size, content_type = %content_type, "Uploaded object");
        Ok(())
    }
}

#[async_trait]
impl Store for AwsStore {
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

        self.client
            .head_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|e| match map_sdk_error(e, name, Error::BucketNotFound) {
                err if err.is_not_found() => Error::BucketNotFound(name.to_string()),
                err => err,
            })?;

        self.bucket = Some(name.to_string());
        debug!(bucket = %name, "Bound bucket");
        Ok(true)
    }

    async fn set_region(&mut self, region: &str) -> Result<()> {
        let region = if region.is_empty() {
            warn!(default = DEFAULT_REGION, "No region given, using default");
            DEFAULT_REGION
        } else {
            region
        };

        let config = self
            .client
            .config()
            .to_builder()
            .region(Region::new(region.to_string()))
            .build();
        self.client = Client::from_conf(config);
        self.region = region.to_string();
        debug!(region = %self.region, "Updated region");
        Ok(())
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        validate_bucket_name(name)?;

        let mut request = self.client.create_bucket().bucket(name);
        // us-east-1 rejects an explicit location constraint.
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| map_sdk_error(e, name, Error::BucketNotFound))?;

        info!(bucket = %name, region = %self.region, "Created bucket");
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        validate_bucket_name(name)?;

        match self.client.delete_bucket().bucket(name).send().await {
            Ok(_) => {
                info!(bucket = %name, "Deleted bucket");
                Ok(())
            }
            Err(e) => match map_sdk_error(e, name, Error::BucketNotFound) {
                Error::BucketNotFound(_) => {
                    debug!(bucket = %name, "Bucket already absent");
                    Ok(())
                }
                err => Err(err),
            },
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "", Error::BucketNotFound))?;

        Ok(response
            .buckets()
            .iter()
            .map(|bucket| BucketInfo {
                name: bucket.name().unwrap_or_default().to_string(),
                creation_date: format_date(bucket.creation_date()),
            })
            .collect())
    }

    async fn create_object(&self, name: &str, data: DataSource, content_type: &str) -> Result<()> {
        let path = self.resolve(name)?;
        self.put(&path, data, content_type).await
    }

    async fn read_object(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(name)?;
        let resource = path.to_string();

        let response = match self
            .client
            .get_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return match map_sdk_error(e, &resource, Error::ObjectNotFound) {
                    Error::ObjectNotFound(_) => Ok(None),
                    err => Err(err),
                }
            }
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Backend(format!("reading {}: {}", resource, e)))?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        let resource = path.to_string();

        self.client
            .delete_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &resource, Error::ObjectNotFound))?;

        debug!(object = %resource, "Deleted object");
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectMetadata>> {
        let bucket = resolve_bucket(self.bucket.as_deref(), bucket)?;
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&bucket)
                .set_continuation_token(continuation_token)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, &bucket, Error::BucketNotFound))?;

            for object in response.contents() {
                let key = object.key().unwrap_or_default();
                objects.push(ObjectMetadata {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    content_type: content_type_for(key, ""),
                    etag: trim_etag(object.e_tag()),
                    last_modified: format_date(object.last_modified()),
                });
            }

            continuation_token = response.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(objects)
    }

    async fn exists(&self, name: &str) -> Result<Option<ObjectMetadata>> {
        let path = self.resolve(name)?;
        let resource = path.to_string();

        let head = match self
            .client
            .head_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
        {
            Ok(head) => head,
            Err(e) => {
                return match map_sdk_error(e, &resource, Error::ObjectNotFound) {
                    err if err.is_not_found() => Ok(None),
                    err => Err(err),
                }
            }
        };

        Ok(Some(ObjectMetadata {
            key: path.key().to_string(),
            size: head.content_length().unwrap_or(0).max(0) as u64,
            content_type: content_type_for(path.key(), head.content_type().unwrap_or_default()),
            etag: trim_etag(head.e_tag()),
            last_modified: format_date(head.last_modified()),
        }))
    }

    async fn copy_object(&self, src: &str, dest: &str) -> Result<()> {
        let src = self.resolve(src)?;
        let dest = self.resolve(dest)?;

        self.client
            .copy_object()
            .copy_source(format!("{}/{}", src.bucket(), encode_key(src.key())))
            .bucket(dest.bucket())
            .key(dest.key())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &src.to_string(), Error::ObjectNotFound))?;

        debug!(from = %src, to = %dest, "Copied object");
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        debug!(region = %self.region, "S3 store released");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        match self.client.list_buckets().send().await {
            Ok(_) => Ok(()),
            Err(e) => match map_sdk_error(e, "", Error::BucketNotFound) {
                Error::Backend(message) => Err(Error::ClientInit(message)),
                err => Err(err),
            },
        }
    }
}
