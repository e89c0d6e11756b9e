//! Client facade used by the UI layer
//!
//! Wires the stores, the transport and both pipelines together and exposes
//! the resource operations. Listing and media calls recover from disguised
//! failures through discovery; single-resource reads and mutations surface
//! every failure as an [`ApiError`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::credentials::CredentialStore;
use crate::discovery::{is_usable_json, EndpointCache, EndpointDiscovery, POSTS_LIST};
use crate::envelope::{JsonEnvelope, Page, ResponseEnvelope};
use crate::http::auth::AuthStage;
use crate::http::classifier::EndpointClassifier;
use crate::http::error::{ApiError, ErrorKind};
use crate::http::normalizer::{normalize_failure, normalize_reply, EnvelopeStage};
use crate::http::pipeline::Pipeline;
use crate::http::popup::PopupSuppressionStage;
use crate::http::request::{ApiRequest, Failure, Reply, ResponseMode};
use crate::http::retry::execute_with_retry;
use crate::http::transport::{ReqwestTransport, Transport};
use crate::identity::Resource;
use crate::media::{MediaHandle, MediaResolver};
use crate::store::{FileStore, KeyValueStore, MemoryStore};
use crate::Result;

/// Message on a listing that could not be served from any address
pub const NO_DATA_MESSAGE: &str = "No data available";

/// Resilient API client
pub struct ApiClient {
    config: TransportConfig,
    /// `[auth, popup-suppression, envelope]`
    pipeline: Pipeline,
    discovery: EndpointDiscovery,
    media: MediaResolver,
    credentials: CredentialStore,
}

impl ApiClient {
    /// Build from configuration with the `reqwest` transport
    pub fn new(config: TransportConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn KeyValueStore> = match &config.storage.path {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let transport = Arc::new(ReqwestTransport::new(config.timeout())?);
        Self::with_parts(config, transport, store)
    }

    /// Build over an existing transport and store
    pub fn with_parts(
        config: TransportConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let classifier = Arc::new(EndpointClassifier::from_config(&config.classifier)?);
        let credentials = CredentialStore::new(store.clone());

        // Probes skip the envelope stage so sniffing sees the raw body.
        let raw = Pipeline::new(transport, config.primary_base.clone())
            .with_stage(Arc::new(
                AuthStage::new(classifier, credentials.clone())
                    .with_trusted_bases(std::iter::once(&config.primary_base).chain(&config.direct_bases)),
            ))
            .with_stage(Arc::new(PopupSuppressionStage));
        let pipeline = raw.clone().with_stage(Arc::new(EnvelopeStage));

        let discovery =
            EndpointDiscovery::new(raw.clone(), EndpointCache::new(store), config.direct_bases.clone());
        let media = MediaResolver::new(raw, discovery.clone());

        debug!(
            primary_base = %config.primary_base,
            stages = ?pipeline.stage_names(),
            "API client ready"
        );

        Ok(Self {
            config,
            pipeline,
            discovery,
            media,
            credentials,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn endpoint_cache(&self) -> &EndpointCache {
        self.discovery.cache()
    }

    pub fn media(&self) -> &MediaResolver {
        &self.media
    }

    /// One page of resources; never fails
    ///
    /// Transient failures get one retry. A disguised failure triggers
    /// discovery, and if no address serves the listing an empty page comes
    /// back with `success == true`.
    pub async fn list_resources(&self, page: u32, size: u32) -> ResponseEnvelope<Page<Resource>> {
        let request = ApiRequest::get(self.config.collection_path.clone())
            .with_query("page", page)
            .with_query("size", size);

        let outcome = execute_with_retry(|| self.call(request.clone()), self.config.retry).await;
        match outcome {
            Ok(reply) if !reply.disguised_failure => return page_envelope(&reply, page, size),
            Ok(reply) => warn!(
                path = %request.path,
                status = reply.status,
                resource_class = POSTS_LIST,
                "Listing returned an error page, starting discovery"
            ),
            Err(err) if err.error_page => warn!(
                path = %request.path,
                status = ?err.status,
                resource_class = POSTS_LIST,
                "Listing failed with an error page, starting discovery"
            ),
            Err(err) => return err.to_envelope(),
        }

        let found = self
            .discovery
            .discover(POSTS_LIST, &request, |reply| {
                is_usable_json(&reply).then(|| normalize_reply(ResponseMode::Json, reply))
            })
            .await;

        match found {
            Some(found) => page_envelope(&found.value, page, size),
            None => {
                let empty = Page::empty(page, size);
                let pagination = empty.pagination();
                ResponseEnvelope::ok(NO_DATA_MESSAGE, empty).with_pagination(pagination)
            }
        }
    }

    /// Fetch one resource by id
    pub async fn get_resource(&self, id: &str) -> std::result::Result<Resource, ApiError> {
        let request = ApiRequest::get(self.item_path(id)?);
        let reply = self.call(request).await?;
        resource_from_reply(&reply)
    }

    /// Create a resource; never retried or re-targeted
    pub async fn create_resource(&self, body: Value) -> std::result::Result<Resource, ApiError> {
        let request = ApiRequest::post(self.config.collection_path.clone(), body);
        let reply = self.call(request).await?;
        resource_from_reply(&reply)
    }

    /// Replace a resource; never retried or re-targeted
    pub async fn update_resource(&self, id: &str, body: Value) -> std::result::Result<Resource, ApiError> {
        let request = ApiRequest::put(self.item_path(id)?, body);
        let reply = self.call(request).await?;
        resource_from_reply(&reply)
    }

    /// Delete a resource; never retried or re-targeted
    pub async fn delete_resource(&self, id: &str) -> std::result::Result<(), ApiError> {
        let request = ApiRequest::delete(self.item_path(id)?);
        let reply = self.call(request).await?;
        envelope_from_reply(&reply).map(|_| ())
    }

    /// Resolve a media URL to a local handle; failures give an empty handle
    pub async fn resolve_media(&self, url: &str) -> MediaHandle {
        self.media.resolve(url).await
    }

    pub fn release(&self, handle: MediaHandle) {
        self.media.release(handle);
    }

    async fn call(&self, request: ApiRequest) -> std::result::Result<Reply, ApiError> {
        self.pipeline.send(request).await.map_err(into_api_error)
    }

    fn item_path(&self, id: &str) -> std::result::Result<String, ApiError> {
        let id = id.trim();
        if id.is_empty() || id.contains('/') {
            let envelope = JsonEnvelope::failure(format!("Invalid resource id: {:?}", id), None).stamped();
            return Err(ApiError::new(ErrorKind::BadRequest, None, envelope));
        }
        Ok(format!(
            "{}/{}",
            self.config.collection_path.trim_end_matches('/'),
            id
        ))
    }
}

fn into_api_error(failure: Failure) -> ApiError {
    match normalize_failure(ResponseMode::Json, failure) {
        Failure::Api(err) => err,
        Failure::Status(reply) => ApiError::from_kind(ErrorKind::from_status(reply.status), Some(reply.status)),
        Failure::Network(_) => ApiError::from_kind(ErrorKind::NetworkUnreachable, Some(0)),
    }
}

/// Envelope of a normalized reply
fn reply_envelope(reply: &Reply) -> JsonEnvelope {
    reply
        .body
        .as_json()
        .and_then(JsonEnvelope::from_conformant)
        .unwrap_or_else(|| JsonEnvelope::wrap(reply.body.to_json()))
}

/// Successful envelope, or the failure it describes
fn envelope_from_reply(reply: &Reply) -> std::result::Result<JsonEnvelope, ApiError> {
    let envelope = reply_envelope(reply);
    if reply.disguised_failure {
        return Err(ApiError::error_page(reply.status, envelope.error.unwrap_or(Value::Null)));
    }
    if !envelope.success {
        let kind = envelope
            .status
            .map(ErrorKind::from_status)
            .unwrap_or(ErrorKind::Unknown);
        let status = envelope.status.or(Some(reply.status));
        return Err(ApiError::new(kind, status, envelope).with_headers(reply.headers.clone()));
    }
    Ok(envelope)
}

fn resource_from_reply(reply: &Reply) -> std::result::Result<Resource, ApiError> {
    let envelope = envelope_from_reply(reply)?;
    Ok(Resource::from_raw(envelope.data.unwrap_or(Value::Null)))
}

fn page_envelope(reply: &Reply, page: u32, size: u32) -> ResponseEnvelope<Page<Resource>> {
    let envelope = match envelope_from_reply(reply) {
        Ok(envelope) => envelope,
        Err(err) => return err.to_envelope(),
    };

    let envelope = JsonEnvelope {
        data: Some(envelope.data.unwrap_or(Value::Null)),
        ..envelope
    };
    let mut typed = envelope.map(|data| Page::from_listing(&data, page, size).map_items(Resource::from_raw));
    typed.pagination = typed.data.as_ref().map(Page::pagination);
    typed
}
