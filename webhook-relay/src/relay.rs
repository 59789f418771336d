//! Relay orchestration.
//!
//! For every change in an envelope that carries a user message, the relay acquires a
//! fresh credential and forwards the whole envelope, unchanged, to the downstream
//! endpoint. Attempts run one after another. Failures are published on the event
//! bus and logged; they never propagate to the caller.

use crate::client::{Forwarder, WebhookClient};
use crate::config::{require, RelayConfig};
use crate::credentials::{ClientCredentialsProvider, CredentialProvider};
use crate::error::{Error, ErrorSeverity, Result};
use crate::event::{EventBus, RelayEvent};
use crate::filter::{classify_changes, ChangeKind, ChangeRef, EventEnvelope};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome counts for one envelope. Only ever logged.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    /// Changes carrying user messages.
    pub qualifying: usize,
    /// Changes that were not relayed.
    pub ignored: usize,
    /// Qualifying changes accepted downstream.
    pub delivered: usize,
    /// Qualifying changes whose credential exchange or delivery failed.
    pub failed: usize,
}

enum AttemptError {
    Credential(Error),
    Forward(Error),
}

/// Forwards qualifying events downstream.
pub struct Relay {
    credentials: Arc<dyn CredentialProvider>,
    forwarder: Arc<dyn Forwarder>,
    downstream_url: Option<String>,
    events: Arc<EventBus>,
}

impl Relay {
    /// Creates a relay from its parts.
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        forwarder: Arc<dyn Forwarder>,
        downstream_url: Option<String>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            credentials,
            forwarder,
            downstream_url,
            events,
        }
    }

    /// Creates the production relay: one pooled HTTP client shared by the
    /// credential exchange and the forwarder.
    pub fn from_config(config: &RelayConfig, events: Arc<EventBus>) -> Result<Self> {
        let client = WebhookClient::new(Some(config.request_timeout_secs))?;
        let credentials =
            ClientCredentialsProvider::new(client.http().clone(), config.auth.clone());
        Ok(Self::new(
            Arc::new(credentials),
            Arc::new(client),
            config.downstream_url.clone(),
            events,
        ))
    }

    /// The event bus relay outcomes are published on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Relays every qualifying change of the envelope. Never fails.
    pub async fn relay(&self, request_id: Uuid, envelope: &EventEnvelope) -> RelaySummary {
        let mut summary = RelaySummary::default();

        let Some(json) = envelope.json() else {
            info!("[{}] Body is not a JSON envelope, nothing to forward", request_id);
            return summary;
        };

        for (change, kind) in classify_changes(json) {
            match kind {
                ChangeKind::Other => {
                    summary.ignored += 1;
                    self.events
                        .publish(RelayEvent::ChangeIgnored {
                            request_id,
                            entry: change.entry,
                            change: change.change,
                        })
                        .await;
                }
                ChangeKind::Message => {
                    summary.qualifying += 1;
                    info!("[{}] Forwarding message...", request_id);
                    if self.relay_change(request_id, change, envelope).await {
                        summary.delivered += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
            }
        }

        debug!("[{}] Relay summary: {:?}", request_id, summary);
        summary
    }

    async fn relay_change(
        &self,
        request_id: Uuid,
        change: ChangeRef,
        envelope: &EventEnvelope,
    ) -> bool {
        let start = Instant::now();
        let event = match self.attempt(envelope).await {
            Ok(status) => RelayEvent::MessageForwarded {
                request_id,
                entry: change.entry,
                change: change.change,
                status: status.as_u16(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(AttemptError::Credential(e)) => {
                log_failure(request_id, &e);
                RelayEvent::CredentialFailed {
                    request_id,
                    entry: change.entry,
                    change: change.change,
                    message: e.to_string(),
                }
            }
            Err(AttemptError::Forward(e)) => {
                log_failure(request_id, &e);
                RelayEvent::ForwardFailed {
                    request_id,
                    entry: change.entry,
                    change: change.change,
                    message: e.to_string(),
                }
            }
        };
        let delivered = !event.is_failure();
        self.events.publish(event).await;
        delivered
    }

    async fn attempt(
        &self,
        envelope: &EventEnvelope,
    ) -> std::result::Result<StatusCode, AttemptError> {
        let endpoint =
            require(&self.downstream_url, "EXTERNAL_WEBHOOK_URL").map_err(AttemptError::Forward)?;
        let credential = self
            .credentials
            .acquire()
            .await
            .map_err(AttemptError::Credential)?;
        self.forwarder
            .forward(endpoint, &credential, envelope.raw().clone())
            .await
            .map_err(AttemptError::Forward)
    }
}

/// Logs a failed attempt at the level matching the error's severity.
fn log_failure(request_id: Uuid, e: &Error) {
    match e.severity() {
        ErrorSeverity::Info => info!("[{}] {} ({})", request_id, e, e.kind()),
        ErrorSeverity::Warning => warn!("[{}] {} ({})", request_id, e, e.kind()),
        ErrorSeverity::Critical => error!("[{}] {} ({})", request_id, e, e.kind()),
    }
}
