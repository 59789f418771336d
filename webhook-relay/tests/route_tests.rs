//! Route-level tests driven through `warp::test`, with the credential exchange and
//! the downstream call replaced by in-memory doubles.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use webhook_relay::event::{EventBus, EventSubscriber, RelayEvent};
use webhook_relay::server::routes;
use webhook_relay::{
    Credential, CredentialProvider, Error, Forwarder, Relay, RelayConfig, Result,
};

const VERIFY_TOKEN: &str = "s3cret";

struct CountingCredentials {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl CredentialProvider for CountingCredentials {
    async fn acquire(&self) -> Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(Error::Auth("status 503".to_string()))
        } else {
            Ok(Credential::new("tok-route"))
        }
    }
}

struct RecordingForwarder {
    calls: Mutex<Vec<(String, String, Bytes)>>,
    downstream_status: u16,
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(
        &self,
        endpoint: &str,
        credential: &Credential,
        body: Bytes,
    ) -> Result<StatusCode> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), credential.bearer(), body));
        let status = StatusCode::from_u16(self.downstream_status).unwrap();
        if status.is_success() {
            Ok(status)
        } else {
            Err(Error::Forward(format!("status {}", status)))
        }
    }
}

#[derive(Default)]
struct EventRecorder(Mutex<Vec<RelayEvent>>);

#[async_trait]
impl EventSubscriber for EventRecorder {
    async fn handle_event(&self, event: &RelayEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

struct Harness {
    credentials: Arc<CountingCredentials>,
    forwarder: Arc<RecordingForwarder>,
    recorder: Arc<EventRecorder>,
    config: Arc<RelayConfig>,
    relay: Arc<Relay>,
}

impl Harness {
    fn new(fail_auth: bool, downstream_status: u16) -> Self {
        let credentials = Arc::new(CountingCredentials {
            calls: AtomicUsize::new(0),
            fail: fail_auth,
        });
        let forwarder = Arc::new(RecordingForwarder {
            calls: Mutex::new(Vec::new()),
            downstream_status,
        });
        let recorder = Arc::new(EventRecorder::default());
        let events = EventBus::new();
        events.subscribe_arc(recorder.clone());

        let config = Arc::new(RelayConfig {
            verify_token: Some(VERIFY_TOKEN.to_string()),
            downstream_url: Some("https://downstream.example.com/hook".to_string()),
            max_body_bytes: 4096,
            ..RelayConfig::default()
        });
        let relay = Arc::new(Relay::new(
            credentials.clone(),
            forwarder.clone(),
            config.downstream_url.clone(),
            Arc::new(events),
        ));

        Self {
            credentials,
            forwarder,
            recorder,
            config,
            relay,
        }
    }

    async fn post(&self, body: &'static [u8]) -> warp::http::Response<Bytes> {
        warp::test::request()
            .method("POST")
            .path("/")
            .header("content-type", "application/json")
            .body(body)
            .reply(&routes(self.config.clone(), self.relay.clone()))
            .await
    }

    async fn get(&self, path: &str) -> warp::http::Response<Bytes> {
        warp::test::request()
            .method("GET")
            .path(path)
            .reply(&routes(self.config.clone(), self.relay.clone()))
            .await
    }

    fn auth_calls(&self) -> usize {
        self.credentials.calls.load(Ordering::SeqCst)
    }

    fn forward_calls(&self) -> usize {
        self.forwarder.calls.lock().unwrap().len()
    }

    fn event_names(&self) -> Vec<&'static str> {
        self.recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .map(RelayEvent::name)
            .collect()
    }
}

const MESSAGE_BODY: &[u8] = br#"{"object":"whatsapp_business_account","entry":[{"id":"1","changes":[{"field":"messages","value":{"messaging_product":"whatsapp","messages":[{"from":"16315551181","id":"wamid.1","type":"text","text":{"body":"hi"}}]}}]}]}"#;

const STATUS_BODY: &[u8] = br#"{"entry":[{"changes":[{"value":{"statuses":[{"id":"wamid.1","status":"read"}]}}]}]}"#;

#[tokio::test]
async fn test_verification_echoes_challenge() {
    let harness = Harness::new(false, 200);
    let response = harness
        .get("/?hub.mode=subscribe&hub.challenge=abc123&hub.verify_token=s3cret")
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(&response.body()[..], b"abc123");
    assert_eq!(harness.event_names(), vec!["verification_accepted"]);
}

#[tokio::test]
async fn test_verification_rejects_wrong_token_and_mode() {
    let harness = Harness::new(false, 200);

    for path in [
        "/?hub.mode=subscribe&hub.challenge=abc123&hub.verify_token=wrong",
        "/?hub.mode=unsubscribe&hub.challenge=abc123&hub.verify_token=s3cret",
        "/?hub.challenge=abc123",
        "/",
    ] {
        let response = harness.get(path).await;
        assert_eq!(response.status(), 403, "path {}", path);
        assert!(response.body().is_empty(), "path {}", path);
    }
}

#[tokio::test]
async fn test_message_event_is_forwarded_verbatim() {
    let harness = Harness::new(false, 200);
    let response = harness.post(MESSAGE_BODY).await;

    assert_eq!(response.status(), 200);
    assert!(response.body().is_empty());
    assert_eq!(harness.auth_calls(), 1);

    let calls = harness.forwarder.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (endpoint, bearer, body) = &calls[0];
    assert_eq!(endpoint, "https://downstream.example.com/hook");
    assert_eq!(bearer, "Bearer tok-route");
    assert_eq!(&body[..], MESSAGE_BODY);
}

#[tokio::test]
async fn test_status_event_is_not_forwarded() {
    let harness = Harness::new(false, 200);
    let response = harness.post(STATUS_BODY).await;

    assert_eq!(response.status(), 200);
    assert!(response.body().is_empty());
    assert_eq!(harness.auth_calls(), 0);
    assert_eq!(harness.forward_calls(), 0);
    assert_eq!(
        harness.event_names(),
        vec!["webhook_received", "change_ignored"]
    );
}

#[tokio::test]
async fn test_one_forward_per_qualifying_change() {
    let harness = Harness::new(false, 200);
    let response = harness
        .post(br#"{"entry":[
            {"changes":[{"value":{"messages":[{"id":"a"}]}},{"value":{"statuses":[{}]}}]},
            {"changes":[{"value":{"messages":[{"id":"b"}]}}]}
        ]}"#)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(harness.auth_calls(), 2);
    assert_eq!(harness.forward_calls(), 2);
}

#[tokio::test]
async fn test_downstream_failure_still_acknowledges() {
    let harness = Harness::new(false, 500);
    let response = harness.post(MESSAGE_BODY).await;

    assert_eq!(response.status(), 200);
    assert!(response.body().is_empty());
    assert_eq!(harness.forward_calls(), 1);
    assert_eq!(
        harness.event_names(),
        vec!["webhook_received", "forward_failed"]
    );
}

#[tokio::test]
async fn test_credential_failure_still_acknowledges() {
    let harness = Harness::new(true, 200);
    let response = harness.post(MESSAGE_BODY).await;

    assert_eq!(response.status(), 200);
    assert_eq!(harness.auth_calls(), 1);
    assert_eq!(harness.forward_calls(), 0);
    assert_eq!(
        harness.event_names(),
        vec!["webhook_received", "credential_failed"]
    );
}

#[tokio::test]
async fn test_malformed_bodies_are_acknowledged() {
    let harness = Harness::new(false, 200);

    for body in [&b"not json"[..], &b""[..], &b"[]"[..], &b"{\"entry\":42}"[..]] {
        let response = harness.post(body).await;
        assert_eq!(response.status(), 200);
        assert!(response.body().is_empty());
    }

    assert_eq!(harness.auth_calls(), 0);
    assert_eq!(harness.forward_calls(), 0);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let harness = Harness::new(false, 200);
    let body = vec![b' '; 8192];

    let response = warp::test::request()
        .method("POST")
        .path("/")
        .body(body)
        .reply(&routes(harness.config.clone(), harness.relay.clone()))
        .await;

    assert_eq!(response.status(), 413);
    assert_eq!(harness.forward_calls(), 0);
}

#[tokio::test]
async fn test_post_without_content_length_is_acknowledged() {
    let harness = Harness::new(false, 200);

    let response = warp::test::request()
        .method("POST")
        .path("/")
        .header("content-type", "application/json")
        .reply(&routes(harness.config.clone(), harness.relay.clone()))
        .await;

    assert_eq!(response.status(), 200);
    assert!(response.body().is_empty());
    assert_eq!(harness.auth_calls(), 0);
    assert_eq!(harness.forward_calls(), 0);
}

#[tokio::test]
async fn test_non_json_content_type_is_not_forwarded() {
    let harness = Harness::new(false, 200);

    for content_type in ["text/plain", "application/x-www-form-urlencoded"] {
        let response = warp::test::request()
            .method("POST")
            .path("/")
            .header("content-type", content_type)
            .body(MESSAGE_BODY)
            .reply(&routes(harness.config.clone(), harness.relay.clone()))
            .await;
        assert_eq!(response.status(), 200, "content type {}", content_type);
        assert!(response.body().is_empty());
    }

    let response = warp::test::request()
        .method("POST")
        .path("/")
        .body(MESSAGE_BODY)
        .reply(&routes(harness.config.clone(), harness.relay.clone()))
        .await;
    assert_eq!(response.status(), 200);

    assert_eq!(harness.auth_calls(), 0);
    assert_eq!(harness.forward_calls(), 0);
}

#[tokio::test]
async fn test_json_content_type_with_charset_is_forwarded() {
    let harness = Harness::new(false, 200);

    let response = warp::test::request()
        .method("POST")
        .path("/")
        .header("content-type", "application/json; charset=utf-8")
        .body(MESSAGE_BODY)
        .reply(&routes(harness.config.clone(), harness.relay.clone()))
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(harness.forward_calls(), 1);
}

#[tokio::test]
async fn test_health_and_unknown_routes() {
    let harness = Harness::new(false, 200);

    let response = harness.get("/health").await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["status"], "ok");

    let response = harness.get("/does-not-exist").await;
    assert_eq!(response.status(), 404);
}
