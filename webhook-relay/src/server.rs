//! HTTP server for the webhook relay.
//!
//! The server exposes:
//!
//! - `GET /` for the subscription verification handshake
//! - `POST /` for event ingestion
//! - `GET /health` for liveness checks
//!
//! The server is built using the Warp web framework and provides graceful shutdown capabilities.

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::handler::{handle_event, handle_health_check, handle_verification, VerificationQuery};
use crate::relay::Relay;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{pin_mut, Stream, TryStreamExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use warp::{Filter, Rejection, Reply};

/// Webhook relay HTTP server.
pub struct RelayServer {
    /// Server configuration.
    config: Arc<RelayConfig>,

    /// Relay invoked for inbound events.
    relay: Arc<Relay>,

    /// Shutdown channel for graceful server termination.
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl RelayServer {
    /// Creates a new server with the given configuration and relay.
    pub fn new(config: RelayConfig, relay: Relay) -> Self {
        Self {
            config: Arc::new(config),
            relay: Arc::new(relay),
            shutdown_tx: None,
        }
    }

    /// Starts the HTTP server in a separate Tokio task.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested. The server runs until [`RelayServer::stop`] is called.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let addr: SocketAddr = self
            .config
            .server_addr()
            .parse()
            .map_err(|e| Error::Http(format!("Invalid address: {}", e)))?;

        let routes = routes(self.config.clone(), self.relay.clone());

        let (tx, rx) = oneshot::channel::<()>();

        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async {
                rx.await.ok();
                info!("Shutting down webhook relay");
            })
            .map_err(|e| Error::Http(format!("Failed to bind {}: {}", addr, e)))?;

        tokio::spawn(server);

        self.shutdown_tx = Some(tx);
        info!("Listening on {}", bound);
        Ok(bound)
    }

    /// Stops the HTTP server.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            info!("Sent shutdown signal to webhook relay");
        } else {
            warn!("Webhook relay is not running");
        }
        Ok(())
    }
}

/// Builds the complete route tree.
pub fn routes(
    config: Arc<RelayConfig>,
    relay: Arc<Relay>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let events = relay.events().clone();
    let max_body_bytes = config.max_body_bytes;

    let verify_route = warp::path::end()
        .and(warp::get())
        .and(warp::query::<VerificationQuery>())
        .and(with_shared(config))
        .and(with_shared(events))
        .and_then(handle_verification);

    let event_route = warp::path::end()
        .and(warp::post())
        .and(warp::header::optional::<String>("content-type"))
        .and(limited_body(max_body_bytes))
        .and(with_shared(relay))
        .and_then(handle_event);

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handle_health_check);

    verify_route
        .or(event_route)
        .or(health_route)
        .with(warp::log("webhook_relay"))
        .recover(handle_rejection)
}

/// Helper function to provide shared state to route handlers.
fn with_shared<T: Send + Sync + 'static>(
    value: Arc<T>,
) -> impl Filter<Extract = (Arc<T>,), Error = Infallible> + Clone {
    warp::any().map(move || value.clone())
}

/// The request body exceeded the configured limit.
#[derive(Debug)]
struct BodyTooLarge;

impl warp::reject::Reject for BodyTooLarge {}

/// The connection failed while the body was being read.
#[derive(Debug)]
struct BodyReadFailed;

impl warp::reject::Reject for BodyReadFailed {}

/// Reads the whole request body, at most `limit` bytes.
///
/// A declared `Content-Length` above the limit is refused before anything is read.
/// Chunked bodies and bodies without a length are accepted and checked while
/// streaming; a request with no body at all yields empty bytes.
fn limited_body(limit: u64) -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and(warp::body::stream())
        .and_then(move |length: Option<u64>, body| collect_body(limit, length, body))
}

async fn collect_body<S, B>(
    limit: u64,
    length: Option<u64>,
    body: S,
) -> std::result::Result<Bytes, Rejection>
where
    S: Stream<Item = std::result::Result<B, warp::Error>>,
    B: Buf,
{
    if length.is_some_and(|length| length > limit) {
        return Err(warp::reject::custom(BodyTooLarge));
    }

    pin_mut!(body);
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.try_next().await.map_err(|e| {
        warn!("Failed to read request body: {}", e);
        warp::reject::custom(BodyReadFailed)
    })? {
        if (buf.len() + chunk.remaining()) as u64 > limit {
            return Err(warp::reject::custom(BodyTooLarge));
        }
        buf.put(chunk);
    }
    Ok(buf.freeze())
}

/// Handler for rejections.
async fn handle_rejection(
    err: Rejection,
) -> std::result::Result<warp::reply::Response, Infallible> {
    use warp::http::StatusCode;

    // A malformed handshake query is still just a failed verification.
    if err.find::<warp::reject::InvalidQuery>().is_some() {
        return Ok(warp::reply::with_status(warp::reply(), StatusCode::FORBIDDEN).into_response());
    }

    let (message, status) = if err.is_not_found() {
        ("Not Found", StatusCode::NOT_FOUND)
    } else if err.find::<BodyTooLarge>().is_some() {
        ("Payload too large", StatusCode::PAYLOAD_TOO_LARGE)
    } else if err.find::<BodyReadFailed>().is_some() {
        ("Failed to read request body", StatusCode::BAD_REQUEST)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ("Method not allowed", StatusCode::METHOD_NOT_ALLOWED)
    } else {
        error!("Unhandled rejection: {:?}", err);
        ("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR)
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "status": "error",
            "message": message
        })),
        status,
    )
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(
        parts: &[&'static [u8]],
    ) -> impl Stream<Item = std::result::Result<Bytes, warp::Error>> {
        stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(*part)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_collect_body_without_length() {
        let body = collect_body(16, None, chunks(&[&b"{\"entry\""[..], &b":[]}"[..]]))
            .await
            .unwrap();
        assert_eq!(&body[..], b"{\"entry\":[]}");

        let empty = collect_body(16, None, chunks(&[])).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_collect_body_enforces_limit_while_streaming() {
        let rejection = collect_body(8, None, chunks(&[&b"12345"[..], &b"67890"[..]]))
            .await
            .unwrap_err();
        assert!(rejection.find::<BodyTooLarge>().is_some());

        let body = collect_body(10, None, chunks(&[&b"12345"[..], &b"67890"[..]]))
            .await
            .unwrap();
        assert_eq!(body.len(), 10);
    }

    #[tokio::test]
    async fn test_collect_body_refuses_declared_oversize() {
        let rejection = collect_body(8, Some(1024), chunks(&[&b"{}"[..]]))
            .await
            .unwrap_err();
        assert!(rejection.find::<BodyTooLarge>().is_some());
    }
}
