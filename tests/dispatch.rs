//! Wire-contract tests for the dispatcher, using a wiremock mock server.
//!
//! These cover the status-to-behavior table: verbatim 2xx envelopes, 204
//! synthesis, refresh-and-retry on 401, bounded backoff on 429, and graceful
//! failure for everything else.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ledgerline::{
    Body, Client, Config, Error, FixedTenant, HeaderEntry, HeaderList, RequestOptions, RetryConfig,
    SharedToken, StaticToken,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

#[derive(Clone)]
struct SequenceResponder {
    templates: Arc<std::sync::Mutex<std::collections::VecDeque<ResponseTemplate>>>,
}

impl SequenceResponder {
    fn new(templates: Vec<ResponseTemplate>) -> Self {
        Self {
            templates: Arc::new(std::sync::Mutex::new(templates.into_iter().collect())),
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        let mut templates = self.templates.lock().expect("mutex should not be poisoned");
        templates.pop_front().unwrap_or_else(|| {
            ResponseTemplate::new(500).set_body_json(json!({
                "success": false,
                "message": "No more mock responses configured"
            }))
        })
    }
}

fn success_body(data: serde_json::Value) -> serde_json::Value {
    json!({
        "success": true,
        "message": "ok",
        "data": data,
        "meta": {
            "request_id": "req-wire-1",
            "timestamp": "2026-02-14T08:00:00Z",
            "code": 200
        }
    })
}

/// Helper to create a client pointing at the mock server, with instant
/// throttle retries so tests stay fast.
fn client_for_server(server: &MockServer) -> Client {
    Client::new(Config {
        base_url: Some(server.uri()),
        tokens: Some(Arc::new(StaticToken::new("secret-token"))),
        tenant: Some(Arc::new(FixedTenant::new("bumdes-17"))),
        retry: Some(RetryConfig {
            max_retries: 3,
            base_backoff: Duration::ZERO,
        }),
        ..Default::default()
    })
    .expect("client creation should succeed")
}

#[tokio::test]
async fn success_envelope_is_returned_verbatim() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/accounting/invoices"))
        .and(header("Authorization", "Bearer secret-token"))
        .and(header("X-Ledgerline-Tenant", "bumdes-17"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(success_body(json!([{ "number": "INV-001" }]))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server).get("/accounting/invoices").await;
    assert!(envelope.success);
    assert_eq!(envelope.data[0]["number"], "INV-001");
    assert_eq!(envelope.meta.request_id, "req-wire-1");
    assert_eq!(envelope.meta.code, Some(200));
}

#[tokio::test]
async fn no_content_synthesizes_empty_success() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/accounting/invoices/9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server)
        .delete("/accounting/invoices/9")
        .await;
    assert!(envelope.success);
    assert_eq!(envelope.data, serde_json::Value::Null);
    assert_eq!(envelope.meta.code, Some(204));
}

#[tokio::test]
async fn non_json_body_resolves_to_failure_without_panicking() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reports/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway page</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server).get("/reports/summary").await;
    assert!(!envelope.success);
    assert!(envelope.message.contains("not a valid envelope"));
    assert_eq!(envelope.meta.code, Some(200));
}

#[tokio::test]
async fn error_body_message_and_errors_are_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounting/invoices"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "success": false,
            "message": "validation failed",
            "errors": { "amount": ["must be positive"] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server)
        .post(
            "/accounting/invoices",
            Body::json(&json!({ "amount": -3 })).expect("serializable payload"),
        )
        .await;
    assert!(!envelope.success);
    assert_eq!(envelope.message, "validation failed");
    assert_eq!(envelope.errors["amount"], vec!["must be positive"]);
    assert_eq!(envelope.meta.code, Some(422));
}

#[tokio::test]
async fn error_status_without_body_uses_status_text() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reports/balance"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server).get("/reports/balance").await;
    assert!(!envelope.success);
    assert_eq!(envelope.message, "Internal Server Error");
    assert_eq!(envelope.meta.code, Some(500));
}

#[tokio::test]
async fn unauthorized_triggers_one_refresh_and_replays_with_new_credential() {
    let server = MockServer::start().await;

    // The stale credential is rejected once; the refreshed one succeeds.
    Mock::given(method("GET"))
        .and(path("/memberships"))
        .and(header("Authorization", "Bearer stale-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "token expired"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/memberships"))
        .and(header("Authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body(json!({ "count": 3 }))))
        .expect(1)
        .mount(&server)
        .await;

    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = refreshes.clone();
    let tokens = SharedToken::new(Some("stale-token".into()), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("fresh-token".to_string())
        }
    });

    let client = Client::new(Config {
        base_url: Some(server.uri()),
        tokens: Some(Arc::new(tokens)),
        ..Default::default()
    })
    .expect("client creation should succeed");

    let envelope = client.get("/memberships").await;
    assert!(envelope.success);
    assert_eq!(envelope.data["count"], 3);
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_refresh_signs_out_and_reports_the_original_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/memberships"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "session expired",
            "errors": { "session": ["sign in again"] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let signed_out = Arc::new(AtomicBool::new(false));
    let flag = signed_out.clone();
    let tokens = SharedToken::new(Some("stale-token".into()), || async {
        Err(Error::CredentialRefresh("refresh token expired".into()))
    })
    .with_sign_out(move || {
        let flag = flag.clone();
        async move {
            flag.store(true, Ordering::SeqCst);
        }
    });

    let client = Client::new(Config {
        base_url: Some(server.uri()),
        tokens: Some(Arc::new(tokens)),
        ..Default::default()
    })
    .expect("client creation should succeed");

    let envelope = client.get("/memberships").await;
    assert!(!envelope.success);
    assert_eq!(envelope.message, "session expired");
    assert_eq!(envelope.errors["session"], vec!["sign in again"]);
    assert_eq!(envelope.meta.code, Some(401));
    assert!(signed_out.load(Ordering::SeqCst));

    let requests = server
        .received_requests()
        .await
        .expect("requests should be recorded");
    assert_eq!(requests.len(), 1, "a failed refresh must not replay the call");
}

#[tokio::test]
async fn throttled_request_is_retried_until_it_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(429).insert_header("Retry-After", "0"),
            ResponseTemplate::new(429).insert_header("Retry-After", "0"),
            ResponseTemplate::new(429).insert_header("Retry-After", "0"),
            ResponseTemplate::new(200).set_body_json(success_body(json!([{ "id": 1 }]))),
        ]))
        .expect(4)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server).get("/assets").await;
    assert!(envelope.success);
    assert_eq!(envelope.data[0]["id"], 1);
}

#[tokio::test]
async fn throttle_budget_exhausts_into_a_rate_limit_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(4)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server).get("/assets").await;
    assert!(!envelope.success);
    assert_eq!(envelope.message, "Too Many Requests");
    assert_eq!(envelope.meta.code, Some(429));

    let requests = server
        .received_requests()
        .await
        .expect("requests should be recorded");
    assert_eq!(requests.len(), 4, "exactly max_retries + 1 attempts");
}

#[tokio::test]
async fn json_body_is_serialized_and_tagged() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/vendor-bills"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "vendor": "CV Maju", "total": 125000 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body(json!({ "id": 11 }))))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server)
        .post(
            "/vendor-bills",
            Body::json(&json!({ "vendor": "CV Maju", "total": 125000 }))
                .expect("serializable payload"),
        )
        .await;
    assert!(envelope.success);
}

#[tokio::test]
async fn text_body_passes_through_without_a_forced_content_type() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/imports/journal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body(json!({}))))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server)
        .post("/imports/journal", Body::text("date,debit,credit\n"))
        .await;
    assert!(envelope.success);

    let requests = server
        .received_requests()
        .await
        .expect("requests should be recorded");
    assert_eq!(requests[0].body, b"date,debit,credit\n");
    assert!(
        requests[0].headers.get("content-type").is_none(),
        "raw text must not be tagged with a content type"
    );
}

#[tokio::test]
async fn byte_payloads_keep_their_declared_content_type() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/assets/3/photo"))
        .and(header("content-type", "image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body(json!({}))))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for_server(&server)
        .put(
            "/assets/3/photo",
            Body::bytes(vec![0x89, b'P', b'N', b'G'], Some("image/png".into())),
        )
        .await;
    assert!(envelope.success);
}

#[tokio::test]
async fn default_and_per_request_headers_are_merged() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/settings"))
        .and(header("X-App-Channel", "desktop"))
        .and(header("X-Feature-Flag", "beta"))
        .and(header("X-Ledgerline-Request-Id", "req-override-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "ok",
            "data": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut default_headers = HeaderList::new();
    default_headers.push(HeaderEntry::new(
        "X-App-Channel".to_string(),
        "desktop".to_string(),
    ));
    let client = Client::new(Config {
        base_url: Some(server.uri()),
        default_headers: Some(default_headers),
        ..Default::default()
    })
    .expect("client creation should succeed");

    let envelope = client
        .dispatch(
            ledgerline::Method::GET,
            "/settings",
            None,
            RequestOptions::default()
                .with_request_id("req-override-7")
                .with_header("X-Feature-Flag", "beta"),
        )
        .await;
    assert!(envelope.success);
    assert_eq!(envelope.meta.request_id, "req-override-7");
}

#[tokio::test]
async fn transport_failure_resolves_to_a_failure_envelope() {
    // Nothing listens on this port; the connection is refused.
    let client = Client::new(Config {
        base_url: Some("http://127.0.0.1:9".into()),
        ..Default::default()
    })
    .expect("client creation should succeed");

    let envelope = client.get("/accounting/invoices").await;
    assert!(!envelope.success);
    assert!(!envelope.message.is_empty());
    assert_eq!(envelope.meta.code, None, "no status is derivable");
    assert!(!envelope.meta.request_id.is_empty());
}
