//! Credential attachment stage
//!
//! Protected calls get a Basic `Authorization` header built from the stored
//! credentials. A missing credential never blocks a call: it goes out
//! unauthenticated and the server's rejection is normalized downstream. The
//! one exception is the cart/session resource, which answers an empty result
//! locally because an anonymous cart probe is routine.
//!
//! Requests re-targeted at an origin outside the trusted bases (a CDN
//! media URL, say) always leave without credentials.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde_json::json;
use tracing::{debug, warn};

use crate::credentials::CredentialStore;
use crate::http::classifier::EndpointClassifier;
use crate::http::pipeline::{Next, Stage};
use crate::http::request::{ApiRequest, Outcome, Reply};

/// Message on the locally answered anonymous cart probe
pub const NO_SESSION_MESSAGE: &str = "No active session";

/// What the stage decided for one request
#[derive(Debug)]
pub enum Prepared {
    /// Send on, possibly with credentials attached
    Forward(ApiRequest),
    /// Answered locally without touching the network
    Answered(Reply),
}

/// Attaches credentials to protected calls
pub struct AuthStage {
    classifier: Arc<EndpointClassifier>,
    credentials: CredentialStore,
    /// Origins allowed to receive credentials; empty trusts every origin
    trusted_origins: Vec<String>,
}

impl AuthStage {
    pub fn new(classifier: Arc<EndpointClassifier>, credentials: CredentialStore) -> Self {
        Self {
            classifier,
            credentials,
            trusted_origins: Vec::new(),
        }
    }

    /// Restrict credentials to the origins of `bases`
    pub fn with_trusted_bases<I, S>(mut self, bases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for base in bases {
            match origin_of(base.as_ref()) {
                Some(origin) if !self.trusted_origins.contains(&origin) => self.trusted_origins.push(origin),
                Some(_) => {}
                None => warn!(base = base.as_ref(), "Ignoring unparsable trusted base"),
            }
        }
        self
    }

    /// Requests on the pipeline's own base are always trusted
    fn is_trusted(&self, base: Option<&str>) -> bool {
        match base {
            None => true,
            Some(_) if self.trusted_origins.is_empty() => true,
            Some(base) => origin_of(base).is_some_and(|origin| self.trusted_origins.contains(&origin)),
        }
    }

    /// The request as it should leave, or a local reply that ends the call
    pub fn prepare(&self, mut request: ApiRequest) -> Prepared {
        if request.headers.contains_key(AUTHORIZATION) {
            return Prepared::Forward(request);
        }

        if !self.is_trusted(request.base.as_deref()) {
            debug!(base = ?request.base, path = %request.path, "Foreign origin, no credentials");
            return Prepared::Forward(request);
        }

        if self.classifier.is_public(&request.method, &request.path) {
            debug!(method = %request.method, path = %request.path, "Public endpoint, no credentials");
            return Prepared::Forward(request);
        }

        match self.credentials.get() {
            Some(credentials) => match HeaderValue::from_str(&credentials.basic_header_value()) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.headers.insert(AUTHORIZATION, value);
                    Prepared::Forward(request)
                }
                Err(_) => {
                    warn!(path = %request.path, "Stored credentials are not header-safe, sending unauthenticated");
                    Prepared::Forward(request)
                }
            },
            None if self.classifier.is_session_resource(&request.path) => {
                debug!(path = %request.path, "Anonymous cart probe answered locally");
                Prepared::Answered(Reply::json(json!({
                    "success": true,
                    "message": NO_SESSION_MESSAGE,
                    "data": [],
                })))
            }
            None => {
                debug!(method = %request.method, path = %request.path, "No credentials, sending unauthenticated");
                Prepared::Forward(request)
            }
        }
    }
}

fn origin_of(base: &str) -> Option<String> {
    url::Url::parse(base)
        .ok()
        .filter(|url| url.has_host())
        .map(|url| url.origin().ascii_serialization())
}

#[async_trait]
impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Outcome {
        match self.prepare(request) {
            Prepared::Forward(request) => next.run(request).await,
            Prepared::Answered(reply) => Ok(reply),
        }
    }
}
