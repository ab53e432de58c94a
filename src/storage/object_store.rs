//! S3-compatible object-store backend
//!
//! Objects are written at `<prefix>/<relative partition path>` in the configured bucket.
//! The store client is abstracted behind [`ObjectClient`] so the same backend runs against
//! `aws_sdk_s3::Client` in production and [`MemoryObjectClient`] in tests.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::{Storage, StorageBackend, StorageError, StorageResult};
use crate::ingest::config::ObjectStoreSettings;
use crate::ingest::ConfigError;

/// Minimal object-store client
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Store `body` at `bucket/key`, replacing any existing object
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), String>;
}

#[async_trait]
impl ObjectClient for aws_sdk_s3::Client {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), String> {
        self.put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| DisplayErrorContext(&e).to_string())
    }
}

/// Build an S3 client from explicit settings
///
/// # Errors
/// [`ConfigError::MissingCredentials`] when the access key id or secret is absent.
pub fn s3_client(settings: &ObjectStoreSettings) -> Result<aws_sdk_s3::Client, ConfigError> {
    let access_key_id = non_blank(settings.access_key_id.as_deref())
        .ok_or(ConfigError::MissingCredentials("AWS_ACCESS_KEY_ID"))?;
    let secret_access_key = non_blank(settings.secret_access_key.as_deref())
        .ok_or(ConfigError::MissingCredentials("AWS_SECRET_ACCESS_KEY"))?;

    let credentials = Credentials::new(
        access_key_id,
        secret_access_key,
        None,
        None,
        "openaq-bronze",
    );

    let mut builder = aws_sdk_s3::Config::builder()
        .region(Region::new(settings.region.clone()))
        .credentials_provider(credentials)
        .behavior_version(BehaviorVersion::latest());

    if let Some(endpoint) = non_blank(settings.endpoint_url.as_deref()) {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }

    Ok(aws_sdk_s3::Client::from_conf(builder.build()))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Writes partition paths as objects under `bucket/prefix`
pub struct ObjectStorage<C: ObjectClient = aws_sdk_s3::Client> {
    client: Arc<C>,
    bucket: String,
    prefix: String,
}

impl ObjectStorage<aws_sdk_s3::Client> {
    /// Object storage backed by S3, configured from `settings`
    ///
    /// # Errors
    /// [`ConfigError::MissingBucket`] or [`ConfigError::MissingCredentials`].
    pub fn from_settings(settings: &ObjectStoreSettings) -> Result<Self, ConfigError> {
        let bucket = settings.bucket().ok_or(ConfigError::MissingBucket)?;
        let client = s3_client(settings)?;
        Ok(Self::new(Arc::new(client), bucket, &settings.prefix))
    }
}

impl<C: ObjectClient> ObjectStorage<C> {
    /// Storage writing through `client`
    pub fn new(client: Arc<C>, bucket: impl Into<String>, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix without surrounding slashes
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object key of a relative partition path
    pub fn key(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        match (self.prefix.is_empty(), relative.is_empty()) {
            (true, _) => relative.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{}", self.prefix, relative),
        }
    }
}

#[async_trait]
impl<C: ObjectClient + 'static> Storage for ObjectStorage<C> {
    fn backend(&self) -> StorageBackend {
        StorageBackend::S3
    }

    fn location(&self, relative: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.key(relative))
    }

    async fn put(&self, relative: &str, body: Vec<u8>, content_type: &str) -> StorageResult<()> {
        let key = self.key(relative);
        let bytes = body.len();

        self.client
            .put(&self.bucket, &key, body, content_type)
            .await
            .map_err(|message| StorageError::ObjectPut {
                key: key.clone(),
                message,
            })?;

        debug!(bucket = %self.bucket, key = %key, bytes, "Put object");
        Ok(())
    }
}

/// Object stored by [`MemoryObjectClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object body
    pub body: Vec<u8>,
    /// Content type sent with the put
    pub content_type: String,
}

/// In-memory object store with failure injection
#[derive(Debug, Default)]
pub struct MemoryObjectClient {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    failing_keys: Mutex<Vec<String>>,
}

impl MemoryObjectClient {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every put whose key contains `fragment`
    pub fn fail_keys_containing(&self, fragment: impl Into<String>) {
        self.failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fragment.into());
    }

    /// Stored object, if any
    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), String> {
        let failing = self
            .failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|fragment| key.contains(fragment.as_str()));
        if failing {
            return Err(format!("injected failure for {key}"));
        }

        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    body,
                    content_type: content_type.to_string(),
                },
            );
        Ok(())
    }
}
