//! End-to-end API tests driven through the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use linkwatch::db::{CheckResult, Store};
use linkwatch::web::router;

fn test_app() -> (Router, Arc<Store>, NamedTempFile) {
    let tmp = NamedTempFile::new().unwrap();
    let store = Arc::new(Store::new(tmp.path()).unwrap());
    (router(store.clone()), store, tmp)
}

async fn read_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post_target(
    router: &Router,
    body: &str,
    idempotency_key: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/targets")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, read_json(resp).await)
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, read_json(resp).await)
}

#[tokio::test]
async fn healthz_returns_plain_ok() {
    let (router, _store, _tmp) = test_app();

    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn duplicate_registration_returns_existing_target() {
    let (router, _store, _tmp) = test_app();

    let (status, first) =
        post_target(&router, r#"{"url":"https://Example.Com/path/"}"#, None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["url"], "https://Example.Com/path/");
    let id = first["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("t_"));
    assert!(first["created_at"].is_string());

    // Same canonical form: existing target, 200.
    let (status, second) =
        post_target(&router, r#"{"url":"HTTPS://example.com:443/path"}"#, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["id"].as_str().unwrap(), id);
}

#[tokio::test]
async fn idempotency_key_pins_the_first_target() {
    let (router, _store, _tmp) = test_app();

    let (status, first) = post_target(&router, r#"{"url":"https://a.com"}"#, Some("k1")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = post_target(&router, r#"{"url":"https://b.com"}"#, Some("k1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["url"], "https://a.com");
}

#[tokio::test]
async fn listing_paginates_in_creation_order() {
    let (router, _store, _tmp) = test_app();

    for url in ["https://example.com", "https://test.com", "https://example.org"] {
        let (status, _) = post_target(&router, &format!(r#"{{"url":"{url}"}}"#), None).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = get_json(&router, "/v1/targets?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["url"], "https://example.com");
    assert_eq!(items[1]["url"], "https://test.com");
    let token = page["next_page_token"].as_str().unwrap().to_string();

    let (status, page) = get_json(&router, &format!("/v1/targets?limit=2&page_token={token}")).await;
    assert_eq!(status, StatusCode::OK);
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["url"], "https://example.org");
    assert!(page.get("next_page_token").is_none());
}

#[tokio::test]
async fn listing_filters_by_host() {
    let (router, _store, _tmp) = test_app();

    for url in ["https://example.com", "https://test.com", "https://example.org"] {
        post_target(&router, &format!(r#"{{"url":"{url}"}}"#), None).await;
    }

    let (status, page) = get_json(&router, "/v1/targets?host=example.com").await;
    assert_eq!(status, StatusCode::OK);
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["url"], "https://example.com");
}

#[tokio::test]
async fn non_http_schemes_are_rejected() {
    let (router, _store, _tmp) = test_app();

    let (status, body) = post_target(&router, r#"{"url":"ftp://example.com"}"#, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn invalid_creation_requests_get_json_errors() {
    let (router, _store, _tmp) = test_app();

    let (status, body) = post_target(&router, "{not json", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid JSON");

    let (status, body) = post_target(&router, r#"{}"#, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "url is required");

    let (status, body) = post_target(&router, r#"{"url":"example.com"}"#, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid URL"));
}

#[tokio::test]
async fn invalid_listing_parameters_get_json_errors() {
    let (router, _store, _tmp) = test_app();

    let (status, body) = get_json(&router, "/v1/targets?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = get_json(&router, "/v1/targets?limit=101").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&router, "/v1/targets?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get_json(&router, "/v1/targets?page_token=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid page_token");
}

#[tokio::test]
async fn results_endpoint_returns_history_most_recent_first() {
    let (router, store, _tmp) = test_app();

    let (_, created) = post_target(&router, r#"{"url":"https://example.com"}"#, None).await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = get_json(&router, &format!("/v1/targets/{id}/results")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["items"].as_array().unwrap().is_empty());

    let base = chrono::Utc::now();
    for i in 0..3 {
        store
            .save_check_result(
                &id,
                &CheckResult {
                    checked_at: base + chrono::Duration::seconds(i),
                    status_code: Some(200),
                    latency_ms: 40 + i,
                    error: None,
                },
            )
            .unwrap();
    }

    let (status, body) = get_json(&router, &format!("/v1/targets/{id}/results")).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["latency_ms"], 42);
    assert_eq!(items[2]["latency_ms"], 40);
    assert!(items[0]["error"].is_null());

    let (status, body) = get_json(&router, &format!("/v1/targets/{id}/results?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let since = (base + chrono::Duration::seconds(1)).to_rfc3339();
    let since = since.replace('+', "%2B");
    let (status, body) =
        get_json(&router, &format!("/v1/targets/{id}/results?since={since}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let (status, body) =
        get_json(&router, &format!("/v1/targets/{id}/results?since=yesterday")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid since parameter, expected RFC3339 format");
}
