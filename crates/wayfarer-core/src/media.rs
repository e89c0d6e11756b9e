//! Binary media resolution
//!
//! [`MediaResolver::resolve`] downloads a media URL through the credentialed
//! pipeline, checks that the bytes are really media, falls back to endpoint
//! discovery on a disguised failure and registers the payload under a local
//! `blob:` URI. The returned [`MediaHandle`] owns that registration.
//! Failures yield an empty handle so callers can show a placeholder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::discovery::{is_usable_binary, EndpointDiscovery, MEDIA_FILE};
use crate::http::pipeline::Pipeline;
use crate::http::request::{ApiRequest, Body, Failure, Reply, ResponseMode};
use crate::http::sniff::{is_html_content_type, sniff, Sniffed};

/// Prefix of every locally minted handle URI
pub const BLOB_PREFIX: &str = "blob:wayfarer/";

/// Downloaded media bytes
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub bytes: Arc<Vec<u8>>,
    pub content_type: Option<String>,
}

impl Payload {
    fn from_reply(reply: Reply) -> Option<Self> {
        let content_type = reply.content_type().map(str::to_string);
        match reply.body {
            Body::Binary(bytes) if !bytes.is_empty() => Some(Self {
                bytes: Arc::new(bytes),
                content_type,
            }),
            _ => None,
        }
    }
}

type Registry = Mutex<HashMap<String, Payload>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Locally scoped reference to resolved media
///
/// Dropping the handle releases it; [`MediaHandle::release`] does the same
/// explicitly. An empty handle stands for a failed resolution.
#[derive(Debug)]
pub struct MediaHandle {
    uri: String,
    payload: Option<Payload>,
    registry: Weak<Registry>,
}

impl MediaHandle {
    pub fn empty() -> Self {
        Self {
            uri: String::new(),
            payload: None,
            registry: Weak::new(),
        }
    }

    fn register(payload: Payload, registry: &Arc<Registry>) -> Self {
        let uri = format!("{}{}", BLOB_PREFIX, Uuid::new_v4());
        lock(registry).insert(uri.clone(), payload.clone());
        Self {
            uri,
            payload: Some(payload),
            registry: Arc::downgrade(registry),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }

    /// The `blob:` URI, or `""` for an empty handle
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.payload.as_ref().map(|p| p.bytes.as_slice())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.content_type.as_deref())
    }

    /// Deregister now instead of at drop
    pub fn release(mut self) {
        self.deregister();
    }

    fn deregister(&mut self) {
        if self.payload.take().is_none() {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.uri);
            debug!(uri = %self.uri, "Media handle released");
        }
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        self.deregister();
    }
}

type InFlight = Arc<OnceCell<Option<Payload>>>;

/// Fetches media with coalescing and discovery fallback
pub struct MediaResolver {
    pipeline: Pipeline,
    discovery: EndpointDiscovery,
    registry: Arc<Registry>,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl MediaResolver {
    /// `pipeline` must not contain the envelope stage
    pub fn new(pipeline: Pipeline, discovery: EndpointDiscovery) -> Self {
        Self {
            pipeline,
            discovery,
            registry: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `url` to a handle; never fails
    ///
    /// Concurrent calls for the same URL share one download, each receiving
    /// its own handle.
    pub async fn resolve(&self, url: &str) -> MediaHandle {
        let url = url.trim();
        if url.is_empty() {
            return MediaHandle::empty();
        }

        let cell = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(url) {
                Some(cell) => {
                    debug!(url, "Joining in-flight media resolution");
                    cell.clone()
                }
                None => {
                    let cell: InFlight = Arc::new(OnceCell::new());
                    in_flight.insert(url.to_string(), cell.clone());
                    cell
                }
            }
        };

        let payload = cell.get_or_init(|| self.fetch(url)).await.clone();

        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.get(url).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                in_flight.remove(url);
            }
        }

        match payload {
            Some(payload) => MediaHandle::register(payload, &self.registry),
            None => MediaHandle::empty(),
        }
    }

    /// Release a handle obtained from [`resolve`](Self::resolve)
    pub fn release(&self, handle: MediaHandle) {
        handle.release();
    }

    /// Payload registered under a handle URI
    pub fn lookup(&self, uri: &str) -> Option<Payload> {
        lock(&self.registry).get(uri).cloned()
    }

    /// Number of handles not yet released
    pub fn live_handles(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Split into a base override and a rooted path
    fn target(&self, url: &str) -> (Option<String>, String) {
        let primary = self.pipeline.base().trim_end_matches('/');
        if let Some(rest) = url.strip_prefix(primary) {
            if rest.is_empty() || rest.starts_with('/') {
                return (None, rest.to_string());
            }
        }
        match url::Url::parse(url) {
            Ok(parsed) if parsed.has_host() => {
                let origin = parsed.origin().ascii_serialization();
                let mut path = parsed.path().to_string();
                if let Some(query) = parsed.query() {
                    path.push('?');
                    path.push_str(query);
                }
                (Some(origin), path)
            }
            _ => (None, url.to_string()),
        }
    }

    async fn fetch(&self, url: &str) -> Option<Payload> {
        let (base, path) = self.target(url);
        let probe = ApiRequest::get(path).with_mode(ResponseMode::Binary);
        let request = match base {
            Some(base) => probe.clone().with_base(base),
            None => probe.clone(),
        };

        match self.pipeline.send(request).await {
            Ok(reply) => {
                if is_usable_binary(&reply) {
                    info!(url, bytes = body_len(&reply.body), "Media resolved");
                    return Payload::from_reply(reply);
                }
                if !is_disguised(&reply) {
                    warn!(url, status = reply.status, "Media response was empty");
                    return None;
                }
                warn!(url, status = reply.status, "Media request returned an error page, probing alternates");
            }
            Err(Failure::Status(reply)) if is_error_page(&reply) => {
                warn!(url, status = reply.status, "Media request failed with an error page, probing alternates");
            }
            Err(failure) => {
                warn!(url, failure = ?failure_status(&failure), "Media request failed");
                return None;
            }
        }

        let found = self
            .discovery
            .discover(MEDIA_FILE, &probe, |reply| {
                if is_usable_binary(&reply) {
                    Payload::from_reply(reply)
                } else {
                    None
                }
            })
            .await;
        found.map(|found| found.value)
    }
}

/// 2xx reply whose body is not media
fn is_disguised(reply: &Reply) -> bool {
    reply.content_type().is_some_and(is_html_content_type)
        || matches!(
            sniff(&reply.body),
            Sniffed::Html | Sniffed::JsonImpostor | Sniffed::Json | Sniffed::Text
        )
}

/// Non-2xx reply served as an HTML page
fn is_error_page(reply: &Reply) -> bool {
    reply.content_type().is_some_and(is_html_content_type) || sniff(&reply.body) == Sniffed::Html
}

fn failure_status(failure: &Failure) -> Option<u16> {
    match failure {
        Failure::Status(reply) => Some(reply.status),
        Failure::Api(err) => err.status,
        Failure::Network(_) => None,
    }
}

fn body_len(body: &Body) -> usize {
    match body {
        Body::Binary(bytes) => bytes.len(),
        _ => 0,
    }
}
