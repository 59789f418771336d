//! Request handlers for the webhook relay.
//!
//! - `GET /` answers the platform's subscription verification handshake.
//! - `POST /` accepts event envelopes, relays the qualifying ones and always
//!   acknowledges with an empty 200, whatever happened downstream.
//! - `GET /health` reports liveness.

use crate::config::RelayConfig;
use crate::event::{EventBus, RelayEvent};
use crate::filter::{is_json_content_type, EventEnvelope};
use crate::relay::Relay;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warp::{self, hyper::StatusCode, reply::json, Reply};

/// The only `hub.mode` accepted during verification.
pub const SUBSCRIBE_MODE: &str = "subscribe";

/// Query parameters of the subscription verification handshake.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct VerificationQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,

    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,

    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
}

/// Response structure for health checks.
#[derive(Serialize)]
struct HealthResponse {
    /// Status of the server, always "ok" when reachable
    status: String,
    /// Current version of the webhook-relay package
    version: String,
}

/// Decides a verification handshake.
///
/// Returns the challenge to echo back (empty if none was sent) when the mode is
/// `subscribe` and the token equals the configured one. An unconfigured token
/// rejects every handshake.
pub fn verify_subscription(
    query: &VerificationQuery,
    expected_token: Option<&str>,
) -> Option<String> {
    let expected = expected_token?;
    let accepted = query.mode.as_deref() == Some(SUBSCRIBE_MODE)
        && query.verify_token.as_deref() == Some(expected);
    accepted.then(|| query.challenge.clone().unwrap_or_default())
}

/// Handler for subscription verification requests.
pub async fn handle_verification(
    query: VerificationQuery,
    config: Arc<RelayConfig>,
    events: Arc<EventBus>,
) -> std::result::Result<warp::reply::Response, Infallible> {
    match verify_subscription(&query, config.verify_token.as_deref()) {
        Some(challenge) => {
            events.publish(RelayEvent::VerificationAccepted).await;
            Ok(warp::reply::with_status(challenge, StatusCode::OK).into_response())
        }
        None => {
            warn!(
                "Rejected webhook verification (mode: {:?})",
                query.mode.as_deref()
            );
            events
                .publish(RelayEvent::VerificationRejected { mode: query.mode })
                .await;
            Ok(warp::reply::with_status(warp::reply(), StatusCode::FORBIDDEN).into_response())
        }
    }
}

/// Handler for inbound event envelopes.
///
/// The relay outcome is logged and then dropped; the response is always an empty
/// 200 so the platform never disables the subscription because of a downstream
/// outage. Bodies not declared as `application/json` are acknowledged without
/// being parsed.
pub async fn handle_event(
    content_type: Option<String>,
    body: Bytes,
    relay: Arc<Relay>,
) -> std::result::Result<warp::reply::Response, Infallible> {
    let request_id = Uuid::new_v4();
    let timestamp = Utc::now();
    let envelope = if is_json_content_type(content_type.as_deref()) {
        EventEnvelope::new(body)
    } else {
        debug!(
            "[{}] Content type {:?} is not JSON, body left unparsed",
            request_id, content_type
        );
        EventEnvelope::opaque(body)
    };

    info!(
        "Webhook received {} [{}]",
        timestamp.format("%Y-%m-%d %H:%M:%S"),
        request_id
    );
    if let Some(json) = envelope.json() {
        debug!(
            "{}",
            serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string())
        );
    }

    relay
        .events()
        .publish(RelayEvent::WebhookReceived {
            request_id,
            size: envelope.len(),
            timestamp,
        })
        .await;

    let summary = relay.relay(request_id, &envelope).await;
    if summary.failed > 0 {
        warn!(
            "[{}] {} of {} messages could not be relayed",
            request_id, summary.failed, summary.qualifying
        );
    }

    Ok(warp::reply::with_status(warp::reply(), StatusCode::OK).into_response())
}

/// Handler for health check requests.
pub async fn handle_health_check() -> std::result::Result<impl Reply, Infallible> {
    debug!("Health check request received");
    Ok(json(&HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
