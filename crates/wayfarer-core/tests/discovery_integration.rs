//! End-to-end listing recovery through endpoint discovery


use std::sync::Arc;

use serde_json::json;
use test_support::{bytes, config, html, json, ProxyTransport};
use wayfarer_core::discovery::{MEDIA_FILE, POSTS_LIST};
use wayfarer_core::{ApiClient, Credentials, KeyValueStore, MemoryStore};

const GATEWAY: &str = "http://gateway.test/api";
const BACKEND: &str = "http://backend.test:8080";

fn client(transport: Arc<ProxyTransport>, store: Arc<MemoryStore>) -> ApiClient {
    ApiClient::with_parts(config(GATEWAY, BACKEND), transport, store).unwrap()
}

fn listing_body() -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "content": [{"id": "p1", "title": "Three days in Lisbon", "author": {"userId": "u9"}}],
            "totalElements": 1,
            "totalPages": 1
        }
    })
}

#[tokio::test]
async fn test_html_gateway_recovers_from_second_candidate() {
    let transport = ProxyTransport::new();
    transport.route("http://gateway.test/api/posts", html(200));
    transport.route("http://backend.test:8080/posts", html(404));
    transport.route("http://backend.test:8080/api/posts", json(200, listing_body()));
    let store = Arc::new(MemoryStore::new());
    let client = client(transport.clone(), store.clone());

    let envelope = client.list_resources(0, 10).await;

    assert!(envelope.success);
    let page = envelope.data.expect("listing data");
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.content[0].id.as_deref(), Some("p1"));
    assert_eq!(page.content[0].author_id.as_deref(), Some("u9"));
    assert_eq!(page.content[0].to_value()["authorId"], "u9");

    assert_eq!(
        transport.urls(),
        vec![
            "http://gateway.test/api/posts",
            "http://backend.test:8080/posts",
            "http://backend.test:8080/api/posts",
        ]
    );
    assert_eq!(
        client.endpoint_cache().get(POSTS_LIST).as_deref(),
        Some("http://backend.test:8080/api")
    );
    assert_eq!(
        store.get("wayfarer.endpoint.posts-list").as_deref(),
        Some("http://backend.test:8080/api")
    );
}

#[tokio::test]
async fn test_cached_candidate_is_tried_first_on_next_listing() {
    let transport = ProxyTransport::new();
    transport.route("http://gateway.test/api/posts", html(200));
    transport.route("http://backend.test:8080/api/posts", json(200, listing_body()));
    let store = Arc::new(MemoryStore::new());
    store
        .set("wayfarer.endpoint.posts-list", "http://backend.test:8080/api")
        .unwrap();
    let client = client(transport.clone(), store);

    let envelope = client.list_resources(0, 10).await;
    assert_eq!(envelope.data.unwrap().total_elements, 1);
    assert_eq!(
        transport.urls(),
        vec!["http://gateway.test/api/posts", "http://backend.test:8080/api/posts"]
    );
}

#[tokio::test]
async fn test_every_candidate_failing_degrades_to_empty_page() {
    let transport = ProxyTransport::new();
    transport.route("http://gateway.test/api/posts", html(502));
    transport.route("http://backend.test:8080/posts", html(200));
    let client = client(transport.clone(), Arc::new(MemoryStore::new()));

    let envelope = client.list_resources(1, 20).await;

    assert!(envelope.success);
    let page = envelope.data.unwrap();
    assert!(page.content.is_empty());
    assert_eq!(page.total_elements, 0);
    assert_eq!(page.page, 1);
    assert_eq!(page.size, 20);
    // 502 is transient: primary twice, then both candidates
    assert_eq!(transport.urls().len(), 4);
    assert!(client.endpoint_cache().get(POSTS_LIST).is_none());
}

#[tokio::test]
async fn test_mutations_never_rediscover() {
    let transport = ProxyTransport::new();
    transport.route("http://gateway.test/api/posts/p1", html(200));
    transport.route("http://backend.test:8080/posts/p1", json(200, json!({"id": "p1"})));
    let client = client(transport.clone(), Arc::new(MemoryStore::new()));

    assert!(client.update_resource("p1", json!({"title": "x"})).await.is_err());
    assert!(client.delete_resource("p1").await.is_err());
    assert_eq!(
        transport.urls(),
        vec!["http://gateway.test/api/posts/p1", "http://gateway.test/api/posts/p1"]
    );
}

#[tokio::test]
async fn test_discovery_probes_carry_credentials() {
    let transport = ProxyTransport::new();
    transport.route("http://gateway.test/api/files/cover.jpg", html(200));
    transport.route(
        "http://backend.test:8080/files/cover.jpg",
        bytes("image/jpeg", &[0xff, 0xd8, 0xff, 0xdb]),
    );
    let client = client(transport.clone(), Arc::new(MemoryStore::new()));
    client
        .credentials()
        .set(&Credentials::new("ana", "s3cret"))
        .unwrap();

    let handle = client.resolve_media("/files/cover.jpg").await;
    assert!(!handle.is_empty());
    assert_eq!(client.media().live_handles(), 1);
    assert!(transport
        .auth_headers()
        .iter()
        .all(|auth| auth.as_deref() == Some("Basic YW5hOnMzY3JldA==")));
    assert_eq!(
        client.endpoint_cache().get(MEDIA_FILE).as_deref(),
        Some("http://backend.test:8080")
    );

    client.release(handle);
    assert_eq!(client.media().live_handles(), 0);
}

#[tokio::test]
async fn test_foreign_media_origin_gets_no_credentials() {
    let transport = ProxyTransport::new();
    transport.route(
        "https://cdn.example.com/files/cover.jpg",
        bytes("image/jpeg", &[0xff, 0xd8, 0xff, 0xdb]),
    );
    let client = client(transport.clone(), Arc::new(MemoryStore::new()));
    client
        .credentials()
        .set(&Credentials::new("ana", "s3cret"))
        .unwrap();

    let handle = client.resolve_media("https://cdn.example.com/files/cover.jpg").await;
    assert!(!handle.is_empty());
    assert_eq!(transport.urls(), vec!["https://cdn.example.com/files/cover.jpg"]);
    assert_eq!(transport.auth_headers(), vec![None]);
}
