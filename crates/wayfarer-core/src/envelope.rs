//! The response envelope every caller above the transport depends on

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Uniform response shape
///
/// `success == true` means `data` is the meaningful payload; `success ==
/// false` means `data` is `None` and `message` is human-readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
}

impl<T> ResponseEnvelope<T> {
    /// Successful envelope carrying `data`
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            status: None,
            timestamp: None,
            pagination: None,
        }
    }

    /// Failed envelope; `data` is always empty
    pub fn failure(message: impl Into<String>, error: Option<Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error,
            status: None,
            timestamp: None,
            pagination: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Stamp with the current time in RFC 3339
    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationInfo) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Transform the payload, keeping the rest of the envelope
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResponseEnvelope<U> {
        ResponseEnvelope {
            success: self.success,
            message: self.message,
            data: self.data.map(f),
            error: self.error,
            status: self.status,
            timestamp: self.timestamp,
            pagination: self.pagination,
        }
    }
}

impl ResponseEnvelope<Value> {
    /// Whether a raw JSON body already has the envelope shape
    pub fn is_conformant(body: &Value) -> bool {
        body.as_object()
            .map(|object| object.get("success").is_some_and(Value::is_boolean))
            .unwrap_or(false)
    }

    /// Parse a conformant body; anything else yields `None`
    pub fn from_conformant(body: &Value) -> Option<Self> {
        if !Self::is_conformant(body) {
            return None;
        }
        serde_json::from_value(body.clone()).ok()
    }

    /// Wrap a legacy raw-data body
    pub fn wrap(body: Value) -> Self {
        Self::ok("Request successful", body)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            json!({ "success": self.success, "message": self.message, "data": Value::Null })
        })
    }
}

/// Envelope over an untyped JSON payload
pub type JsonEnvelope = ResponseEnvelope<Value>;

/// Paging metadata attached to listing envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
    pub total_pages: u32,
    pub page: u32,
    pub size: u32,
}

impl<T> Page<T> {
    /// Empty page used when a listing cannot be served at all
    pub fn empty(page: u32, size: u32) -> Self {
        Self {
            content: Vec::new(),
            total_elements: 0,
            total_pages: 0,
            page,
            size,
        }
    }

    /// Convert every item, keeping the paging numbers
    pub fn map_items<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            page: self.page,
            size: self.size,
        }
    }

    pub fn pagination(&self) -> PaginationInfo {
        PaginationInfo {
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}

impl Page<Value> {
    /// Pull a page out of the many listing shapes the backend returns
    ///
    /// Accepts Spring-style `{content, totalElements, totalPages}`, objects
    /// holding an `items`/`data`/`results` array, or a bare array.
    pub fn from_listing(data: &Value, page: u32, size: u32) -> Self {
        let (items, container) = match data {
            Value::Array(items) => (items.clone(), None),
            Value::Object(object) => {
                let items = ["content", "items", "data", "results"]
                    .iter()
                    .find_map(|key| object.get(*key).and_then(Value::as_array))
                    .cloned()
                    .unwrap_or_default();
                (items, Some(object))
            }
            _ => (Vec::new(), None),
        };

        let read_u64 = |keys: &[&str]| {
            container.and_then(|object| {
                keys.iter()
                    .find_map(|key| object.get(*key).and_then(Value::as_u64))
            })
        };

        let total_elements = read_u64(&["totalElements", "total", "totalItems", "count"])
            .unwrap_or(items.len() as u64);
        let page = read_u64(&["number", "page"]).map(|p| p as u32).unwrap_or(page);
        let size = read_u64(&["size", "pageSize"]).map(|s| s as u32).unwrap_or(size);
        let total_pages = read_u64(&["totalPages"])
            .map(|t| t as u32)
            .unwrap_or_else(|| {
                if size == 0 {
                    u32::from(total_elements > 0)
                } else {
                    total_elements.div_ceil(u64::from(size)) as u32
                }
            });

        Self {
            content: items,
            total_elements,
            total_pages,
            page,
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conformance_check() {
        assert!(JsonEnvelope::is_conformant(&json!({"success": true, "data": 1})));
        assert!(JsonEnvelope::is_conformant(&json!({"success": false})));
        assert!(!JsonEnvelope::is_conformant(&json!({"success": "yes"})));
        assert!(!JsonEnvelope::is_conformant(&json!([1, 2])));
        assert!(!JsonEnvelope::is_conformant(&json!({"content": []})));
    }

    #[test]
    fn test_wrap_raw_body() {
        let env = JsonEnvelope::wrap(json!([{"id": 1}]));
        assert!(env.success);
        assert_eq!(env.message, "Request successful");
        assert_eq!(env.data, Some(json!([{"id": 1}])));
    }

    #[test]
    fn test_failure_serializes_null_data() {
        let env: JsonEnvelope =
            ResponseEnvelope::failure("nope", None).with_status(404).stamped();
        let value = env.to_value();
        assert_eq!(value["success"], false);
        assert_eq!(value["data"], Value::Null);
        assert_eq!(value["status"], 404);
        assert!(value["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_page_from_spring_shape() {
        let data = json!({
            "content": [{"id": "a"}, {"id": "b"}],
            "totalElements": 12,
            "totalPages": 6,
            "number": 1,
            "size": 2
        });
        let page = Page::from_listing(&data, 0, 10);
        assert_eq!(page.content.len(), 2);
        assert_eq!(page.total_elements, 12);
        assert_eq!(page.total_pages, 6);
        assert_eq!(page.page, 1);
        assert_eq!(page.size, 2);
    }

    #[test]
    fn test_page_from_bare_array() {
        let page = Page::from_listing(&json!([{"id": 1}, {"id": 2}, {"id": 3}]), 0, 2);
        assert_eq!(page.total_elements, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.size, 2);
    }

    #[test]
    fn test_page_from_unexpected_shape_is_empty() {
        let page = Page::from_listing(&json!("oops"), 3, 10);
        assert!(page.content.is_empty());
        assert_eq!(page.total_elements, 0);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.page, 3);
    }
}
