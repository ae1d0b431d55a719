//! Integration tests for `ShopifyClient` against a mock GraphQL endpoint.
//!
//! Uses `wiremock` to stand up a local HTTP server for each test so no
//! real network traffic is made. The limiter runs unthrottled and backoff
//! bases are kept in the tens of milliseconds.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use shopsync_core::RateLimitMode;
use shopsync_shopify::queries::{COLLECTION_PRODUCTS_QUERY, PRODUCTS_QUERY};
use shopsync_shopify::types::IdNode;
use shopsync_shopify::{ClientSettings, ProductNode, ShopifyClient, ShopifyError};

const GRAPHQL_PATH: &str = "/admin/api/2024-10/graphql.json";

fn settings(backoff_base_ms: u64) -> ClientSettings {
    ClientSettings {
        timeout_secs: 5,
        backoff_base_ms,
        rate_limit_mode: RateLimitMode::Unthrottled,
        page_size: 2,
        ..ClientSettings::default()
    }
}

/// Builds a `ShopifyClient` pointed at the mock server with no backoff delay.
fn test_client(server: &MockServer) -> ShopifyClient {
    test_client_with_backoff(server, 0)
}

fn test_client_with_backoff(server: &MockServer, backoff_base_ms: u64) -> ShopifyClient {
    ShopifyClient::with_endpoint(
        &format!("{}{GRAPHQL_PATH}", server.uri()),
        "shpat_test",
        &settings(backoff_base_ms),
    )
    .expect("failed to build test ShopifyClient")
}

fn product_node(id: u32) -> serde_json::Value {
    json!({
        "id": format!("gid://shopify/Product/{id}"),
        "handle": format!("product-{id}"),
        "title": format!("Product {id}"),
        "descriptionHtml": "",
        "vendor": "Acme Goods",
        "productType": "",
        "status": "ACTIVE",
        "tags": [],
        "variants": {"edges": [{"node": {
            "id": format!("gid://shopify/ProductVariant/{id}0"),
            "sku": format!("SKU-{id}"),
            "price": "10.00",
            "compareAtPrice": null
        }}]}
    })
}

fn products_page(ids: &[u32], has_next: bool, end_cursor: &str) -> serde_json::Value {
    json!({
        "data": {
            "products": {
                "edges": ids.iter().map(|id| json!({"node": product_node(*id), "cursor": format!("c{id}")})).collect::<Vec<_>>(),
                "pageInfo": {"hasNextPage": has_next, "endCursor": end_cursor}
            }
        }
    })
}

// ---------------------------------------------------------------------------
// execute – happy path and soft errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_sends_access_token_and_returns_data() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(header("X-Shopify-Access-Token", "shpat_test"))
        .and(body_partial_json(json!({"query": "{ shop { name } }"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"shop": {"name": "Acme"}}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let response = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), true)
        .await
        .expect("execute should succeed");

    assert!(!response.has_errors());
    assert_eq!(response.data.unwrap()["shop"]["name"], "Acme");
}

#[tokio::test]
async fn execute_returns_graphql_errors_next_to_data() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"shop": {"name": "Acme"}},
            "errors": [{"message": "Field 'plan' is deprecated"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let response = client
        .execute::<serde_json::Value>("{ shop { name plan } }", json!({}), true)
        .await
        .expect("soft errors must not fail execute");

    assert_eq!(response.errors.len(), 1);
    assert!(response.data.is_some());
    assert!(matches!(response.into_data(), Err(ShopifyError::GraphQL(_))));
}

// ---------------------------------------------------------------------------
// execute – retry budget
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_makes_three_attempts_on_repeated_429() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), true)
        .await;

    assert!(
        matches!(result, Err(ShopifyError::RateLimited { attempts: 3 })),
        "expected RateLimited after 3 attempts, got: {result:?}"
    );
    assert_eq!(client.consecutive_rate_limits().await, 3);
}

#[tokio::test]
async fn execute_without_retry_makes_exactly_one_attempt_on_429() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), false)
        .await;

    assert!(matches!(result, Err(ShopifyError::RateLimited { attempts: 1 })));
}

#[tokio::test]
async fn execute_without_retry_makes_exactly_one_attempt_on_500() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), false)
        .await;

    assert!(matches!(result, Err(ShopifyError::ServerError { status: 500 })));
}

/// Answers 429 for the first `throttled` requests and 200 afterwards,
/// recording when each request arrived.
struct ThrottleThenSucceed {
    arrivals: Arc<Mutex<Vec<Instant>>>,
    throttled: usize,
}

impl Respond for ThrottleThenSucceed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut arrivals = self.arrivals.lock().unwrap();
        arrivals.push(Instant::now());
        if arrivals.len() <= self.throttled {
            ResponseTemplate::new(429)
        } else {
            ResponseTemplate::new(200).set_body_json(json!({"data": {"shop": {"name": "Acme"}}}))
        }
    }
}

#[tokio::test]
async fn execute_succeeds_on_third_attempt_after_two_429s() {
    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ThrottleThenSucceed {
            arrivals: Arc::clone(&arrivals),
            throttled: 2,
        })
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client_with_backoff(&server, 50);
    let response = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), true)
        .await
        .expect("third attempt should succeed");

    let arrivals = arrivals.lock().unwrap().clone();
    assert_eq!(arrivals.len(), 3);
    let first_gap = arrivals[1] - arrivals[0];
    let second_gap = arrivals[2] - arrivals[1];

    // Retry n sleeps base * 2^n plus up to one base of jitter:
    // [50ms, 100ms) then [100ms, 150ms).
    assert!(
        first_gap >= Duration::from_millis(50),
        "first backoff too short: {first_gap:?}"
    );
    assert!(
        second_gap >= Duration::from_millis(100),
        "second backoff too short: {second_gap:?}"
    );
    assert!(
        second_gap > first_gap,
        "backoff must grow between retries: {first_gap:?} then {second_gap:?}"
    );
    assert_eq!(response.data.unwrap()["shop"]["name"], "Acme");
    assert_eq!(
        client.consecutive_rate_limits().await,
        0,
        "success must reset the limiter's backoff counter"
    );
}

#[tokio::test]
async fn execute_retries_server_errors_then_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), true)
        .await;

    assert!(matches!(result, Err(ShopifyError::ServerError { status: 503 })));
}

#[tokio::test]
async fn execute_does_not_retry_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), true)
        .await;

    assert!(matches!(result, Err(ShopifyError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn execute_does_not_retry_other_client_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad query"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), true)
        .await;

    assert!(
        matches!(result, Err(ShopifyError::UnexpectedStatus { status: 400, ref body }) if body == "bad query"),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn execute_reports_transport_failure_as_request_failed() {
    // Reserve a free port, then release it so nothing listens there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let endpoint = format!("http://127.0.0.1:{port}{GRAPHQL_PATH}");

    let client = ShopifyClient::with_endpoint(&endpoint, "shpat_test", &settings(0)).unwrap();
    let result = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), true)
        .await;

    assert!(matches!(result, Err(ShopifyError::RequestFailed(_))), "got: {result:?}");
}

#[tokio::test]
async fn execute_rejects_non_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client
        .execute::<serde_json::Value>("{ shop { name } }", json!({}), true)
        .await;

    assert!(matches!(result, Err(ShopifyError::Deserialize { .. })));
}

// ---------------------------------------------------------------------------
// test_auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_auth_returns_shop_name() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"shop": {"name": "Acme"}}})),
        )
        .mount(&server)
        .await;

    let client = test_client(&server);
    assert_eq!(client.test_auth().await.unwrap(), "Acme");
}

#[tokio::test]
async fn test_auth_fails_when_response_has_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "Invalid API key or access token", "extensions": {"code": "ACCESS_DENIED"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client.test_auth().await.unwrap_err();
    assert!(
        matches!(err, ShopifyError::AuthenticationFailed(ref m) if m.contains("Invalid API key")),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn test_auth_is_not_retried_on_429() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    assert!(client.test_auth().await.is_err());
}

// ---------------------------------------------------------------------------
// fetch_all_nodes – pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_all_nodes_threads_end_cursor_across_three_pages() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({"variables": {"first": 2, "after": null}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(products_page(&[1, 2], true, "c2")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({"variables": {"after": "c2"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(products_page(&[3, 4], true, "c4")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({"variables": {"after": "c4"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(products_page(&[5, 6], false, "c6")))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let nodes: Vec<ProductNode> = client
        .fetch_all_nodes(PRODUCTS_QUERY, json!({}), &["products"])
        .await
        .expect("pagination should succeed");

    let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        ids,
        (1..=6)
            .map(|i| format!("gid://shopify/Product/{i}"))
            .collect::<Vec<_>>()
    );
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3, "expected exactly 3 page requests");
}

#[tokio::test]
async fn fetch_all_nodes_keeps_caller_variables() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({"variables": {"id": "gid://shopify/Collection/42"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"collection": {"products": {
                "edges": [{"node": {"id": "gid://shopify/Product/1"}, "cursor": "a"}],
                "pageInfo": {"hasNextPage": false, "endCursor": "a"}
            }}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let nodes: Vec<IdNode> = client
        .fetch_all_nodes(
            COLLECTION_PRODUCTS_QUERY,
            json!({"id": "gid://shopify/Collection/42"}),
            &["collection", "products"],
        )
        .await
        .unwrap();

    assert_eq!(nodes.len(), 1);
}

#[tokio::test]
async fn fetch_all_nodes_aborts_on_graphql_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({"variables": {"after": null}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(products_page(&[1, 2], true, "c2")))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({"variables": {"after": "c2"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = client
        .fetch_all_nodes::<ProductNode>(PRODUCTS_QUERY, json!({}), &["products"])
        .await;

    assert!(matches!(result, Err(ShopifyError::GraphQL(_))), "got: {result:?}");
}

#[tokio::test]
async fn fetch_all_nodes_returns_empty_vec_for_empty_connection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(products_page(&[], false, "")))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let nodes: Vec<ProductNode> = client
        .fetch_all_nodes(PRODUCTS_QUERY, json!({}), &["products"])
        .await
        .unwrap();
    assert!(nodes.is_empty());
}

// ---------------------------------------------------------------------------
// push_product
// ---------------------------------------------------------------------------

fn pushed_product() -> shopsync_core::ProductSnapshot {
    shopsync_core::ProductSnapshot {
        shopify_id: Some("1".to_owned()),
        handle: "product-1".to_owned(),
        title: "Product 1".to_owned(),
        description_html: None,
        vendor: None,
        product_type: None,
        status: "active".to_owned(),
        tags: vec![],
        sku: Some("SKU-1".to_owned()),
        price: Some(rust_decimal::Decimal::new(1200, 2)),
        compare_at_price: None,
        default_variant_id: Some("10".to_owned()),
    }
}

#[tokio::test]
async fn push_product_runs_both_mutations() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({"variables": {"input": {"id": "gid://shopify/Product/1"}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"productUpdate": {"product": {"id": "gid://shopify/Product/1"}, "userErrors": []}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({"variables": {"productId": "gid://shopify/Product/1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"productVariantsBulkUpdate": {"productVariants": [{"id": "gid://shopify/ProductVariant/10"}], "userErrors": []}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.push_product("1", &pushed_product()).await.unwrap();
}

#[tokio::test]
async fn push_product_surfaces_user_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"productUpdate": {"product": null, "userErrors": [
                {"field": ["handle"], "message": "has already been taken"}
            ]}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client.push_product("1", &pushed_product()).await.unwrap_err();
    assert!(
        matches!(err, ShopifyError::UserErrors { operation: "productUpdate", ref messages } if messages == &vec!["handle: has already been taken".to_owned()]),
        "got: {err:?}"
    );
}
