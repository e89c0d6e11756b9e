//! Error taxonomy for API calls
//!
//! Transport status codes collapse into a closed set of [`ErrorKind`]s that
//! callers branch on; the full failed envelope travels along in [`ApiError`].

use std::fmt;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{JsonEnvelope, ResponseEnvelope};

/// Generic text for HTML error pages served in place of API data
pub const ERROR_PAGE_MESSAGE: &str =
    "Server returned an error page instead of API data. The API gateway may be misconfigured; please try again later.";

/// Abstract error categories, independent of transport status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ValidationFailed,
    RateLimited,
    ServerError,
    BadGateway,
    ServiceUnavailable,
    NetworkUnreachable,
    Unknown,
}

impl ErrorKind {
    /// Total mapping from a transport status; `0` means no reply at all
    pub fn from_status(status: u16) -> Self {
        match status {
            0 => ErrorKind::NetworkUnreachable,
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            422 => ErrorKind::ValidationFailed,
            429 => ErrorKind::RateLimited,
            500 => ErrorKind::ServerError,
            502 => ErrorKind::BadGateway,
            503 => ErrorKind::ServiceUnavailable,
            _ => ErrorKind::Unknown,
        }
    }

    /// User-facing message for this kind
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "The request was invalid.",
            ErrorKind::Unauthorized => "Authentication required. Please sign in and try again.",
            ErrorKind::Forbidden => "You do not have permission to perform this action.",
            ErrorKind::NotFound => "The requested resource was not found.",
            ErrorKind::Conflict => "The request conflicts with the current state of the resource.",
            ErrorKind::ValidationFailed => "The submitted data failed validation.",
            ErrorKind::RateLimited => "Too many requests. Please slow down and try again shortly.",
            ErrorKind::ServerError => "The server encountered an internal error.",
            ErrorKind::BadGateway => "The API gateway received an invalid response from the server.",
            ErrorKind::ServiceUnavailable => "The service is temporarily unavailable.",
            ErrorKind::NetworkUnreachable => "Unable to reach the server. Check your connection.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }

    /// Kinds worth one bounded retry on read calls
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkUnreachable | ErrorKind::BadGateway | ErrorKind::ServiceUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Normalized failure surfaced to callers
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    /// Transport status; `Some(0)` for network failures
    pub status: Option<u16>,
    /// The failed envelope (`success == false`)
    pub envelope: JsonEnvelope,
    /// Reply headers, kept so later stages can still rewrite them
    pub headers: HeaderMap,
    /// The server sent an HTML page instead of API data
    pub error_page: bool,
}

impl ApiError {
    pub fn new(kind: ErrorKind, status: Option<u16>, envelope: JsonEnvelope) -> Self {
        Self {
            kind,
            status,
            envelope,
            headers: HeaderMap::new(),
            error_page: false,
        }
    }

    /// Failure built from scratch with the kind's default message
    pub fn from_kind(kind: ErrorKind, status: Option<u16>) -> Self {
        let mut envelope = JsonEnvelope::failure(kind.default_message(), None).stamped();
        envelope.status = status;
        Self::new(kind, status, envelope)
    }

    /// HTML page served where JSON was expected
    pub fn error_page(status: u16, body: Value) -> Self {
        let envelope = JsonEnvelope::failure(ERROR_PAGE_MESSAGE, Some(body))
            .with_status(status)
            .stamped();
        let mut error = Self::new(ErrorKind::ServerError, Some(status), envelope);
        error.error_page = true;
        error
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn message(&self) -> &str {
        &self.envelope.message
    }

    /// The failed envelope retyped for a caller expecting `T`
    pub fn to_envelope<T>(&self) -> ResponseEnvelope<T> {
        let mut envelope = ResponseEnvelope::failure(self.message(), self.envelope.error.clone());
        envelope.status = self.envelope.status.or(self.status);
        envelope.timestamp = self.envelope.timestamp.clone();
        envelope
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.kind,
            self.status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            self.message()
        )
    }
}

impl std::error::Error for ApiError {}
