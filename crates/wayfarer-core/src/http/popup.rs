//! Browser credential prompt suppression
//!
//! A `401` carrying `WWW-Authenticate` makes embedded web views and some
//! HTTP stacks pop a native login dialog. The header is dropped so the
//! application can handle the rejection itself.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use tracing::debug;

use crate::http::pipeline::{Next, Stage};
use crate::http::request::{ApiRequest, Failure, Outcome};

/// Strips `WWW-Authenticate` from `401` failures
#[derive(Debug, Default, Clone, Copy)]
pub struct PopupSuppressionStage;

fn strip(status: Option<u16>, headers: &mut HeaderMap) {
    if status == Some(401) && headers.remove(WWW_AUTHENTICATE).is_some() {
        debug!("Removed WWW-Authenticate from 401 response");
    }
}

/// Remove the challenge header from a failure in place
pub fn suppress_challenge(failure: &mut Failure) {
    match failure {
        Failure::Status(reply) => strip(Some(reply.status), &mut reply.headers),
        Failure::Api(error) => strip(error.status, &mut error.headers),
        Failure::Network(_) => {}
    }
}

#[async_trait]
impl Stage for PopupSuppressionStage {
    fn name(&self) -> &'static str {
        "popup-suppression"
    }

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Outcome {
        next.run(request).await.map_err(|mut failure| {
            suppress_challenge(&mut failure);
            failure
        })
    }
}
