//! External object storage.
//!
//! A request may reference its payload as `scheme://bucket/key` instead of
//! carrying it inline. [`ObjectStoreRouter`] picks the [`ObjectStore`]
//! registered for the scheme and fetches the whole object into memory.

use crate::gateway::error::{InvocationError, RetrievalCause};
use crate::gateway::request::StorageUri;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Read access to an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Fetches the full object at `uri`.
    async fn get(&self, uri: &StorageUri) -> Result<Vec<u8>, InvocationError>;
}

/// Maps an HTTP-style status from a store to a retrieval cause.
pub fn cause_for_status(status: u16) -> RetrievalCause {
    match status {
        404 | 410 => RetrievalCause::NotFound,
        401 | 403 => RetrievalCause::PermissionDenied,
        _ => RetrievalCause::Unavailable,
    }
}

/// Amazon S3 (or any S3-compatible service configured through the
/// standard AWS environment).
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Wraps an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the default AWS configuration chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }

    fn classify(err: &SdkError<GetObjectError>) -> RetrievalCause {
        if err
            .as_service_error()
            .is_some_and(|service| service.is_no_such_key())
        {
            return RetrievalCause::NotFound;
        }
        match err.raw_response() {
            Some(response) => cause_for_status(response.status().as_u16()),
            None => RetrievalCause::Unavailable,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn get(&self, uri: &StorageUri) -> Result<Vec<u8>, InvocationError> {
        let response = self
            .client
            .get_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .send()
            .await
            .map_err(|e| {
                let cause = Self::classify(&e);
                InvocationError::retrieval(uri.to_string(), cause, Some(e))
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| {
                InvocationError::retrieval(uri.to_string(), RetrievalCause::Unavailable, Some(e))
            })?
            .into_bytes()
            .to_vec();
        Ok(data)
    }
}

/// Plain HTTP(S) downloads, where `bucket` is the host.
#[derive(Clone, Debug, Default)]
pub struct HttpObjectStore {
    client: reqwest::Client,
}

impl HttpObjectStore {
    /// Creates a store with a default client.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn get(&self, uri: &StorageUri) -> Result<Vec<u8>, InvocationError> {
        let url = uri.to_string();
        let response = self.client.get(&url).send().await.map_err(|e| {
            InvocationError::retrieval(url.clone(), RetrievalCause::Unavailable, Some(e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InvocationError::retrieval(
                url,
                cause_for_status(status.as_u16()),
                None::<reqwest::Error>,
            ));
        }

        let bytes = response.bytes().await.map_err(|e| {
            InvocationError::retrieval(url.clone(), RetrievalCause::Unavailable, Some(e))
        })?;
        Ok(bytes.to_vec())
    }
}

/// Dispatches fetches to the store registered for a URI scheme.
#[derive(Clone, Default)]
pub struct ObjectStoreRouter {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
}

impl std::fmt::Debug for ObjectStoreRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<&String> = self.stores.keys().collect();
        schemes.sort();
        f.debug_struct("ObjectStoreRouter")
            .field("schemes", &schemes)
            .finish()
    }
}

impl ObjectStoreRouter {
    /// Creates a router with no stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` for `scheme` (case-insensitive), replacing any
    /// previous registration.
    pub fn with_store(mut self, scheme: &str, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(scheme.to_ascii_lowercase(), store);
        self
    }

    /// Whether a store is registered for `scheme`.
    pub fn supports(&self, scheme: &str) -> bool {
        self.stores.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Fetches `uri` from the store registered for its scheme.
    pub async fn fetch(&self, uri: &StorageUri) -> Result<Vec<u8>, InvocationError> {
        let store = self.stores.get(&uri.scheme).ok_or_else(|| {
            InvocationError::validation(format!(
                "unsupported storage scheme '{}'",
                uri.scheme
            ))
        })?;

        let started = Instant::now();
        let data = store.get(uri).await?;
        debug!(
            store = store.name(),
            bytes = data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "object fetched"
        );
        Ok(data)
    }
}
