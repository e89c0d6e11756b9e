//! Content sniffing for disguised failures
//!
//! A misconfigured proxy answers with its own HTML error page, often under a
//! 200 status and sometimes under a binary content type. These helpers look
//! at the body itself.

use serde_json::Value;

use crate::http::request::Body;

/// Binary bodies up to this size are checked for text impostors
pub const SNIFF_LIMIT: usize = 4096;

const HTML_MARKERS: &[&[u8]] = &[b"<!doctype html", b"<html"];

/// What a body turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniffed {
    Empty,
    Html,
    Json,
    /// A JSON object served where binary data was expected
    JsonImpostor,
    Binary,
    Text,
}

/// True when `bytes`, after leading whitespace, open an HTML document
pub fn starts_with_html(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let trimmed = &bytes[start..];
    HTML_MARKERS.iter().any(|marker| {
        trimmed.len() >= marker.len() && trimmed[..marker.len()].eq_ignore_ascii_case(marker)
    })
}

/// Text counterpart of [`starts_with_html`]
pub fn is_html_text(text: &str) -> bool {
    starts_with_html(text.as_bytes())
}

/// Whether a content type header names an HTML document
pub fn is_html_content_type(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    ct.starts_with("text/html") || ct.starts_with("application/xhtml")
}

/// Classify a decoded body
pub fn sniff(body: &Body) -> Sniffed {
    match body {
        Body::Empty => Sniffed::Empty,
        Body::Json(_) => Sniffed::Json,
        Body::Text(text) if is_html_text(text) => Sniffed::Html,
        Body::Text(_) => Sniffed::Text,
        Body::Binary(bytes) => sniff_bytes(bytes),
    }
}

/// Classify bytes that claim to be binary
pub fn sniff_bytes(bytes: &[u8]) -> Sniffed {
    if bytes.is_empty() {
        return Sniffed::Empty;
    }
    if starts_with_html(bytes) {
        return Sniffed::Html;
    }
    if bytes.len() <= SNIFF_LIMIT {
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
        if first == Some(&b'{')
            && serde_json::from_slice::<Value>(bytes).is_ok_and(|value| value.is_object())
        {
            return Sniffed::JsonImpostor;
        }
    }
    Sniffed::Binary
}
