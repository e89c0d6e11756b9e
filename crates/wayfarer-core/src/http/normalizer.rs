//! Envelope normalization stage
//!
//! Every JSON reply leaves this stage as a [`ResponseEnvelope`](crate::envelope::ResponseEnvelope):
//!
//! 1. binary replies (binary mode, binary body, or binary content type) pass untouched
//! 2. HTML documents become a failed envelope flagged as a disguised failure
//! 3. bodies that already carry `success` pass unchanged
//! 4. anything else is wrapped as `{success: true, data: <body>}`
//!
//! Failed calls become [`ApiError`]s with a stamped envelope, except for
//! binary requests whose callers run their own fallback.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::envelope::JsonEnvelope;
use crate::http::error::{ApiError, ErrorKind};
use crate::http::pipeline::{Next, Stage};
use crate::http::request::{is_binary_content_type, ApiRequest, Body, Failure, NetworkFailure, Outcome, Reply, ResponseMode};
use crate::http::sniff::{is_html_content_type, is_html_text};
use crate::logging::redaction::redact_json_value;

/// Message on HTML pages received with a success status
pub const DISGUISED_FAILURE_MESSAGE: &str = "Server returned an error page";

/// Normalizes replies and failures into the envelope
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeStage;

#[async_trait]
impl Stage for EnvelopeStage {
    fn name(&self) -> &'static str {
        "envelope"
    }

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Outcome {
        let mode = request.mode;
        let path = request.path.clone();
        match next.run(request).await {
            Ok(reply) => {
                let reply = normalize_reply(mode, reply);
                if reply.disguised_failure {
                    warn!(path = %path, status = reply.status, "HTML error page received in place of API data");
                }
                Ok(reply)
            }
            Err(failure) => {
                let failure = normalize_failure(mode, failure);
                if let Failure::Api(error) = &failure {
                    warn!(path = %path, status = ?error.status, kind = %error.kind, "Request failed");
                    debug!(path = %path, detail = %log_detail(error), "Failure detail");
                }
                Err(failure)
            }
        }
    }
}

/// Error body of a failure, with credentials masked for logging
pub(crate) fn log_detail(error: &ApiError) -> Value {
    let mut detail = error.envelope.error.clone().unwrap_or(Value::Null);
    redact_json_value(&mut detail);
    detail
}

/// Whether a reply must never be inspected or rewritten
pub fn is_binary_reply(mode: ResponseMode, reply: &Reply) -> bool {
    mode == ResponseMode::Binary
        || matches!(reply.body, Body::Binary(_))
        || reply.content_type().is_some_and(is_binary_content_type)
}

/// Whether a reply is an HTML page, by content type or by its first bytes
pub fn is_html_reply(reply: &Reply) -> bool {
    reply.content_type().is_some_and(is_html_content_type)
        || matches!(&reply.body, Body::Text(text) if is_html_text(text))
}

/// Success-path state machine
pub fn normalize_reply(mode: ResponseMode, mut reply: Reply) -> Reply {
    if is_binary_reply(mode, &reply) {
        return reply;
    }

    if is_html_reply(&reply) {
        let envelope = JsonEnvelope::failure(DISGUISED_FAILURE_MESSAGE, Some(reply.body.to_json()));
        reply.body = Body::Json(envelope.to_value());
        reply.disguised_failure = true;
        return reply;
    }

    match &reply.body {
        Body::Json(value) if JsonEnvelope::is_conformant(value) => reply,
        body => {
            debug!(status = reply.status, "Wrapping raw response data");
            let wrapped = JsonEnvelope::wrap(body.to_json()).to_value();
            reply.body = Body::Json(wrapped);
            reply
        }
    }
}

/// Failure-path mapping into the error taxonomy
pub fn normalize_failure(mode: ResponseMode, failure: Failure) -> Failure {
    if mode == ResponseMode::Binary {
        return failure;
    }
    match failure {
        Failure::Api(error) => Failure::Api(error),
        Failure::Network(network) => Failure::Api(network_error(&network)),
        Failure::Status(reply) if is_binary_reply(mode, &reply) => Failure::Status(reply),
        Failure::Status(reply) => Failure::Api(status_error(reply)),
    }
}

fn network_error(network: &NetworkFailure) -> ApiError {
    let kind = ErrorKind::NetworkUnreachable;
    let message = if network.timed_out {
        "The request timed out. Check your connection and try again."
    } else {
        kind.default_message()
    };
    let envelope = JsonEnvelope::failure(message, Some(Value::String(network.message.clone())))
        .with_status(0)
        .stamped();
    ApiError::new(kind, Some(0), envelope)
}

fn status_error(reply: Reply) -> ApiError {
    let status = reply.status;
    let kind = ErrorKind::from_status(status);

    if let Some(envelope) = reply.body.as_json().and_then(JsonEnvelope::from_conformant) {
        return ApiError::new(kind, Some(status), envelope).with_headers(reply.headers);
    }

    if is_html_reply(&reply) {
        let mut error = ApiError::error_page(status, reply.body.to_json());
        error.kind = kind;
        return error.with_headers(reply.headers);
    }

    let message = match (kind, reply.body.as_json()) {
        (ErrorKind::BadRequest | ErrorKind::ValidationFailed, Some(body)) => {
            extract_validation_message(body).unwrap_or_else(|| kind.default_message().to_string())
        }
        _ => kind.default_message().to_string(),
    };

    let error_body = match &reply.body {
        Body::Empty => None,
        body => Some(body.to_json()),
    };
    let envelope = JsonEnvelope::failure(message, error_body)
        .with_status(status)
        .stamped();
    ApiError::new(kind, Some(status), envelope).with_headers(reply.headers)
}

/// Server-provided explanation of a rejected request
///
/// Looks at `message`, then `errors`, then a nested `error.message`.
pub fn extract_validation_message(body: &Value) -> Option<String> {
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        if !message.trim().is_empty() {
            return Some(message.to_string());
        }
    }

    if let Some(errors) = body.get("errors") {
        if let Some(text) = describe_errors(errors) {
            return Some(text);
        }
    }

    body.get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn describe_errors(errors: &Value) -> Option<String> {
    let parts: Vec<String> = match errors {
        Value::String(text) => vec![text.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.clone()),
                Value::Object(object) => ["message", "defaultMessage", "msg"]
                    .iter()
                    .find_map(|key| object.get(*key).and_then(Value::as_str))
                    .map(|message| match object.get("field").and_then(Value::as_str) {
                        Some(field) => format!("{}: {}", field, message),
                        None => message.to_string(),
                    }),
                _ => None,
            })
            .collect(),
        Value::Object(object) => object
            .iter()
            .filter_map(|(field, value)| {
                let message = match value {
                    Value::String(text) => text.clone(),
                    Value::Array(items) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                    _ => return None,
                };
                Some(format!("{}: {}", field, message))
            })
            .collect(),
        _ => Vec::new(),
    };

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ERROR_PAGE_MESSAGE;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use serde_json::json;

    fn reply(status: u16, content_type: &str, body: Body) -> Reply {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        Reply::new(status, headers, body)
    }

    fn api_error(failure: Failure) -> ApiError {
        match failure {
            Failure::Api(error) => error,
            other => panic!("expected normalized error, got {other:?}"),
        }
    }

    #[test]
    fn test_conformant_body_unchanged() {
        let body = json!({"success": false, "message": "exists", "data": null, "extra": 1});
        let out = normalize_reply(ResponseMode::Json, reply(200, "application/json", Body::Json(body.clone())));
        assert_eq!(out.body, Body::Json(body));
        assert!(!out.disguised_failure);
    }

    #[test]
    fn test_raw_body_wrapped() {
        let out = normalize_reply(
            ResponseMode::Json,
            reply(200, "application/json", Body::Json(json!([{"id": 1}]))),
        );
        let body = out.body.as_json().unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Request successful");
        assert_eq!(body["data"], json!([{"id": 1}]));
    }

    #[test]
    fn test_html_content_type_is_disguised_failure() {
        let page = "<!DOCTYPE html><html><body>Bad gateway</body></html>";
        let out = normalize_reply(ResponseMode::Json, reply(200, "text/html", Body::Text(page.into())));
        assert!(out.disguised_failure);
        let body = out.body.as_json().unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], DISGUISED_FAILURE_MESSAGE);
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["error"], page);
    }

    #[test]
    fn test_html_body_under_json_type_is_disguised_failure() {
        let out = normalize_reply(
            ResponseMode::Json,
            reply(200, "application/json", Body::Text("\n  <html><body>oops</body></html>".into())),
        );
        assert!(out.disguised_failure);
    }

    #[test]
    fn test_binary_passthrough_any_status() {
        let bytes = Body::Binary(vec![0xff, 0xd8, 0xff]);
        let out = normalize_reply(ResponseMode::Json, reply(200, "image/jpeg", bytes.clone()));
        assert_eq!(out.body, bytes);

        let html_bytes = Body::Binary(b"<html></html>".to_vec());
        let out = normalize_reply(ResponseMode::Binary, reply(200, "text/html", html_bytes.clone()));
        assert_eq!(out.body, html_bytes);
        assert!(!out.disguised_failure);

        let failure = normalize_failure(
            ResponseMode::Binary,
            Failure::Status(reply(404, "image/png", bytes.clone())),
        );
        match failure {
            Failure::Status(r) => assert_eq!(r.body, bytes),
            other => panic!("binary failure must be re-raised unchanged: {other:?}"),
        }
    }

    #[test]
    fn test_binary_typed_failure_untouched_in_json_mode() {
        let png = Body::Binary(vec![0x89, b'P', b'N', b'G']);
        let failure = normalize_failure(
            ResponseMode::Json,
            Failure::Status(reply(404, "image/png", png.clone())),
        );
        match failure {
            Failure::Status(r) => {
                assert_eq!(r.status, 404);
                assert_eq!(r.body, png);
            }
            other => panic!("binary-typed failure was rewritten: {other:?}"),
        }
    }

    #[test]
    fn test_status_failure_maps_kind_and_stamps() {
        let error = api_error(normalize_failure(
            ResponseMode::Json,
            Failure::Status(reply(503, "application/json", Body::Json(json!({"detail": "down"})))),
        ));
        assert_eq!(error.kind, ErrorKind::ServiceUnavailable);
        assert_eq!(error.status, Some(503));
        assert_eq!(error.envelope.status, Some(503));
        assert!(error.envelope.timestamp.is_some());
        assert_eq!(error.message(), ErrorKind::ServiceUnavailable.default_message());
    }

    #[test]
    fn test_conformant_error_body_kept() {
        let body = json!({"success": false, "message": "Post not found", "data": null});
        let error = api_error(normalize_failure(
            ResponseMode::Json,
            Failure::Status(reply(404, "application/json", Body::Json(body))),
        ));
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert_eq!(error.message(), "Post not found");
        assert!(error.envelope.timestamp.is_none());
    }

    #[test]
    fn test_html_error_page_failure() {
        let error = api_error(normalize_failure(
            ResponseMode::Json,
            Failure::Status(reply(502, "text/html", Body::Text("<html>502</html>".into()))),
        ));
        assert_eq!(error.kind, ErrorKind::BadGateway);
        assert_eq!(error.message(), ERROR_PAGE_MESSAGE);
        assert_eq!(error.envelope.status, Some(502));
    }

    #[test]
    fn test_validation_messages_surface_verbatim() {
        let error = api_error(normalize_failure(
            ResponseMode::Json,
            Failure::Status(reply(400, "application/json", Body::Json(json!({"message": "Title is required"})))),
        ));
        assert_eq!(error.kind, ErrorKind::BadRequest);
        assert_eq!(error.message(), "Title is required");

        let error = api_error(normalize_failure(
            ResponseMode::Json,
            Failure::Status(reply(
                422,
                "application/json",
                Body::Json(json!({"errors": [{"field": "price", "defaultMessage": "must be positive"}]})),
            )),
        ));
        assert_eq!(error.kind, ErrorKind::ValidationFailed);
        assert_eq!(error.message(), "price: must be positive");
    }

    #[test]
    fn test_describe_error_shapes() {
        assert_eq!(describe_errors(&json!("bad")), Some("bad".to_string()));
        assert_eq!(describe_errors(&json!(["a", "b"])), Some("a; b".to_string()));
        assert_eq!(
            describe_errors(&json!({"title": ["too short", "invalid"]})),
            Some("title: too short, invalid".to_string())
        );
        assert_eq!(describe_errors(&json!([])), None);
        assert_eq!(
            extract_validation_message(&json!({"error": {"message": "nested"}})),
            Some("nested".to_string())
        );
    }

    #[test]
    fn test_failure_detail_is_redacted() {
        let body = json!({"message": "rejected", "token": "abc123", "hint": "Basic YW5hOnMzY3JldA=="});
        let error = api_error(normalize_failure(
            ResponseMode::Json,
            Failure::Status(reply(500, "application/json", Body::Json(json!({"detail": body})))),
        ));
        let detail = log_detail(&error).to_string();
        assert!(!detail.contains("YW5hOnMzY3JldA=="));
        assert!(!detail.contains("abc123"));
    }

    #[test]
    fn test_network_failure() {
        let error = api_error(normalize_failure(
            ResponseMode::Json,
            Failure::Network(NetworkFailure {
                message: "operation timed out".into(),
                timed_out: true,
            }),
        ));
        assert_eq!(error.kind, ErrorKind::NetworkUnreachable);
        assert_eq!(error.status, Some(0));
        assert!(error.message().contains("timed out"));
    }
}
