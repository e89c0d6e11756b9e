//! Request and reply descriptors passed through the pipeline

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;

use crate::http::ApiError;

/// How the caller wants the reply body treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// JSON API call; bodies are normalized into the envelope
    #[default]
    Json,
    /// Binary payload; bodies are never touched
    Binary,
}

/// Outgoing call as seen by the pipeline stages
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base address, always starting with `/`
    pub path: String,
    /// Base address overriding the pipeline default (set by discovery)
    pub base: Option<String>,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub mode: ResponseMode,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self {
            method,
            path,
            base: None,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            mode: ResponseMode::Json,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header; invalid names or values are skipped
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn is_binary(&self) -> bool {
        self.mode == ResponseMode::Binary
    }

    /// Safe methods are the only ones ever retried or re-targeted
    pub fn is_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

/// Decoded reply body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl Body {
    /// Decode raw bytes according to the request mode and content type
    pub fn decode(mode: ResponseMode, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        if mode == ResponseMode::Binary || content_type.is_some_and(is_binary_content_type) {
            return Body::Binary(bytes);
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Body::Empty;
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Text(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    /// Body rendered as JSON for embedding into an envelope `error` field
    pub fn to_json(&self) -> Value {
        match self {
            Body::Empty => Value::Null,
            Body::Json(value) => value.clone(),
            Body::Text(text) => Value::String(text.clone()),
            Body::Binary(bytes) => Value::String(format!("<{} bytes of binary data>", bytes.len())),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Content types that are never parsed as text
pub fn is_binary_content_type(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    ct.starts_with("image/")
        || ct.starts_with("video/")
        || ct.starts_with("audio/")
        || ct.starts_with("application/octet-stream")
        || ct.starts_with("application/pdf")
}

/// Reply received from the transport
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Body,
    /// Set when the body was an HTML error page in place of API data
    pub disguised_failure: bool,
}

impl Reply {
    pub fn new(status: u16, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            headers,
            body,
            disguised_failure: false,
        }
    }

    /// Synthetic 200 reply with a JSON body
    pub fn json(body: Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::new(200, headers, Body::Json(body))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The transport could not produce any reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFailure {
    pub message: String,
    pub timed_out: bool,
}

/// Why a call did not produce a usable reply
#[derive(Debug, Clone)]
pub enum Failure {
    /// Non-2xx reply, still untouched
    Status(Reply),
    /// No reply at all
    Network(NetworkFailure),
    /// Already normalized into the error taxonomy
    Api(ApiError),
}

/// Result of running a request through the pipeline
pub type Outcome = std::result::Result<Reply, Failure>;
