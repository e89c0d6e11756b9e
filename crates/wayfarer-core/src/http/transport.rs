//! The only I/O primitive: send a request, get a reply

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as ReqwestClient;
use tracing::{debug, trace};

use crate::http::request::{ApiRequest, Body, NetworkFailure, Reply};
use crate::logging::redaction::redact_headers;
use crate::{Error, Result};

/// Issues one HTTP exchange against `base` + `request.path`
///
/// Any status code is a reply; only the absence of a reply is a failure.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, base: &str, request: &ApiRequest) -> std::result::Result<Reply, NetworkFailure>;
}

/// Join a base address and a rooted path
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() || path == "/" {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    /// Build with a total request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::HttpClient {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, base: &str, request: &ApiRequest) -> std::result::Result<Reply, NetworkFailure> {
        let raw_url = join_url(base, &request.path);
        let url = url::Url::parse(&raw_url).map_err(|e| NetworkFailure {
            message: format!("Invalid request URL {}: {}", raw_url, e),
            timed_out: false,
        })?;

        debug!(method = %request.method, url = %url, "Sending request");
        trace!(headers = ?redact_headers(&request.headers), "Request headers");

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| NetworkFailure {
            message: e.to_string(),
            timed_out: e.is_timeout(),
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(|e| NetworkFailure {
            message: format!("Failed to read response body: {}", e),
            timed_out: e.is_timeout(),
        })?;

        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let body = Body::decode(request.mode, content_type, bytes.to_vec());
        debug!(status, url = %raw_url, "Received response");

        Ok(Reply::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://a.test/", "/posts"), "http://a.test/posts");
        assert_eq!(join_url("http://a.test", "posts"), "http://a.test/posts");
        assert_eq!(join_url("http://a.test/api//", "/posts/1"), "http://a.test/api/posts/1");
        assert_eq!(join_url("http://a.test/api", "/"), "http://a.test/api");
    }

    #[tokio::test]
    async fn test_invalid_url_is_network_failure() {
        let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();
        let failure = transport
            .send("not a url", &ApiRequest::get("/posts"))
            .await
            .unwrap_err();
        assert!(failure.message.contains("Invalid request URL"));
        assert!(!failure.timed_out);
    }
}
