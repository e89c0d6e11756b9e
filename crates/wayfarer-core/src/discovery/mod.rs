//! Endpoint discovery for disguised failures
//!
//! When the gateway answers a listing or media call with an HTML page, the
//! same call is replayed against an ordered list of alternate base
//! addresses until one of them returns real data:
//!
//! 1. the cached base for the resource class, if any
//! 2. for each direct base: the base itself, then the base with `/api`
//!
//! Candidates are de-duplicated in order and probed one at a time. The first
//! accepted reply is cached for the class. Mutations are refused.

pub mod cache;

pub use cache::{EndpointCache, CACHE_KEY_PREFIX};

use tracing::{error, info, warn};

use crate::http::pipeline::Pipeline;
use crate::http::request::{ApiRequest, Body, Failure, Reply};
use crate::http::sniff::{is_html_content_type, sniff, Sniffed};

/// Resource class of the post listing
pub const POSTS_LIST: &str = "posts-list";
/// Resource class of binary media downloads
pub const MEDIA_FILE: &str = "media-file";

/// An accepted probe and the base that served it
#[derive(Debug, Clone)]
pub struct Discovered<T> {
    pub base: String,
    pub value: T,
}

/// Sequential candidate prober
///
/// Probes go through a pipeline without the envelope stage so acceptance
/// sees the body exactly as the server sent it.
#[derive(Clone)]
pub struct EndpointDiscovery {
    pipeline: Pipeline,
    cache: EndpointCache,
    direct_bases: Vec<String>,
}

impl EndpointDiscovery {
    pub fn new(pipeline: Pipeline, cache: EndpointCache, direct_bases: Vec<String>) -> Self {
        Self {
            pipeline,
            cache,
            direct_bases,
        }
    }

    pub fn cache(&self) -> &EndpointCache {
        &self.cache
    }

    /// Ordered, de-duplicated candidate bases for `resource_class`
    pub fn candidates(&self, resource_class: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let mut push = |base: String| {
            let base = base.trim_end_matches('/').to_string();
            if !base.is_empty() && !candidates.contains(&base) {
                candidates.push(base);
            }
        };

        if let Some(cached) = self.cache.get(resource_class) {
            push(cached);
        }
        for direct in &self.direct_bases {
            let direct = direct.trim_end_matches('/');
            push(direct.to_string());
            push(format!("{}/api", direct));
        }
        candidates
    }

    /// Replay `request` against each candidate until `accept` takes a reply
    ///
    /// Returns `None` when every candidate fails; callers degrade to an
    /// empty result.
    pub async fn discover<T, F>(
        &self,
        resource_class: &str,
        request: &ApiRequest,
        accept: F,
    ) -> Option<Discovered<T>>
    where
        F: Fn(Reply) -> Option<T>,
    {
        if !request.is_read() {
            error!(resource_class, method = %request.method, path = %request.path, "Refusing to re-target a mutation");
            return None;
        }

        let candidates = self.candidates(resource_class);
        if candidates.is_empty() {
            error!(resource_class, path = %request.path, "No discovery candidates configured");
            return None;
        }

        for (index, candidate) in candidates.iter().enumerate() {
            let probe = request.clone().with_base(candidate.as_str());
            let reply = match self.pipeline.send(probe).await {
                Ok(reply) => reply,
                Err(failure) => {
                    let status = match &failure {
                        Failure::Status(reply) => Some(reply.status),
                        Failure::Api(err) => err.status,
                        Failure::Network(_) => None,
                    };
                    warn!(
                        resource_class,
                        candidate = %candidate,
                        attempt = index + 1,
                        path = %request.path,
                        status = ?status,
                        "Discovery candidate failed"
                    );
                    continue;
                }
            };

            let status = reply.status;
            match accept(reply) {
                Some(value) => {
                    info!(resource_class, candidate = %candidate, attempt = index + 1, "Discovery candidate accepted");
                    if let Err(err) = self.cache.record(resource_class, candidate) {
                        warn!(resource_class, candidate = %candidate, error = %err, "Failed to persist endpoint cache");
                    }
                    return Some(Discovered {
                        base: candidate.clone(),
                        value,
                    });
                }
                None => warn!(
                    resource_class,
                    candidate = %candidate,
                    attempt = index + 1,
                    path = %request.path,
                    status,
                    "Discovery candidate returned an unusable body"
                ),
            }
        }

        error!(
            resource_class,
            path = %request.path,
            tried = candidates.len(),
            "Endpoint discovery exhausted every candidate"
        );
        None
    }
}

/// A probe reply carrying real JSON rather than an HTML page
pub fn is_usable_json(reply: &Reply) -> bool {
    !reply.content_type().is_some_and(is_html_content_type) && matches!(reply.body, Body::Json(_))
}

/// A probe reply carrying real binary content
pub fn is_usable_binary(reply: &Reply) -> bool {
    !reply.content_type().is_some_and(is_html_content_type) && sniff(&reply.body) == Sniffed::Binary
}
