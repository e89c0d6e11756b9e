//! Scripted transport shared by unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;

use crate::http::request::{ApiRequest, Body, NetworkFailure, Reply};
use crate::http::transport::{join_url, Transport};

/// Answers by full URL; unknown URLs fail as unreachable
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, reply: Reply) {
        self.routes.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, base: &str, request: &ApiRequest) -> Result<Reply, NetworkFailure> {
        let url = join_url(base, &request.path);
        self.calls.lock().unwrap().push(url.clone());
        // Let concurrent callers interleave before the reply lands.
        tokio::task::yield_now().await;

        let reply = self.routes.lock().unwrap().get(&url).cloned();
        let mut reply = reply.ok_or_else(|| NetworkFailure {
            message: format!("connection refused: {}", url),
            timed_out: false,
        })?;
        if request.is_binary() {
            let bytes = match &reply.body {
                Body::Text(text) => Some(text.clone().into_bytes()),
                Body::Json(value) => Some(value.to_string().into_bytes()),
                _ => None,
            };
            if let Some(bytes) = bytes {
                reply.body = Body::Binary(bytes);
            }
        }
        Ok(reply)
    }
}

fn with_type(status: u16, content_type: &'static str, body: Body) -> Reply {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    Reply::new(status, headers, body)
}

pub fn json_reply(status: u16, body: Value) -> Reply {
    with_type(status, "application/json", Body::Json(body))
}

/// Reverse-proxy style error page
pub fn html_reply(status: u16) -> Reply {
    with_type(
        status,
        "text/html; charset=utf-8",
        Body::Text("<!DOCTYPE html><html><head><title>Error</title></head><body>Gateway</body></html>".into()),
    )
}

pub fn binary_reply(content_type: &'static str, bytes: &[u8]) -> Reply {
    with_type(200, content_type, Body::Binary(bytes.to_vec()))
}
