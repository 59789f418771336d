//! Relay events and their subscribers.
//!
//! Everything the relay does that the upstream platform never gets to see
//! (ignored changes, credential failures, rejected forwards) is published here as a
//! [`RelayEvent`]. Subscribers receive every event; the bundled [`EventLogger`]
//! writes them to the tracing output or to a file, in plain text or JSON lines.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use webhook_relay::event::{EventBus, EventLogger, EventLoggerConfig, LogDestination};
//!
//! let bus = EventBus::new();
//! bus.subscribe(EventLogger::new(EventLoggerConfig {
//!     destination: LogDestination::File {
//!         path: "./logs/relay-events.log".to_string(),
//!     },
//!     structured: true,
//! }));
//! let bus = Arc::new(bus);
//! ```

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Something observable that happened while handling a webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// A subscription handshake succeeded.
    VerificationAccepted,

    /// A subscription handshake was refused.
    VerificationRejected {
        /// The `hub.mode` that was presented, if any.
        mode: Option<String>,
    },

    /// An event envelope arrived on the ingestion route.
    WebhookReceived {
        /// Correlation id assigned to the inbound request.
        request_id: Uuid,
        /// Body size in bytes.
        size: usize,
        /// Arrival time.
        timestamp: DateTime<Utc>,
    },

    /// A change carried no user message (a status update, for instance).
    ChangeIgnored {
        request_id: Uuid,
        entry: usize,
        change: usize,
    },

    /// The envelope was accepted by the downstream endpoint.
    MessageForwarded {
        request_id: Uuid,
        entry: usize,
        change: usize,
        /// HTTP status returned downstream.
        status: u16,
        /// Time spent on token exchange plus delivery.
        duration_ms: u64,
    },

    /// The client-credentials exchange failed; the forward was abandoned.
    CredentialFailed {
        request_id: Uuid,
        entry: usize,
        change: usize,
        message: String,
    },

    /// The downstream call failed or returned a non-success status.
    ForwardFailed {
        request_id: Uuid,
        entry: usize,
        change: usize,
        message: String,
    },
}

impl RelayEvent {
    /// Stable name of the event kind, used as the `event` field in JSON logs.
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::VerificationAccepted => "verification_accepted",
            RelayEvent::VerificationRejected { .. } => "verification_rejected",
            RelayEvent::WebhookReceived { .. } => "webhook_received",
            RelayEvent::ChangeIgnored { .. } => "change_ignored",
            RelayEvent::MessageForwarded { .. } => "message_forwarded",
            RelayEvent::CredentialFailed { .. } => "credential_failed",
            RelayEvent::ForwardFailed { .. } => "forward_failed",
        }
    }

    /// Whether the event reports a failed relay attempt.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RelayEvent::CredentialFailed { .. } | RelayEvent::ForwardFailed { .. }
        )
    }

    /// Structured representation of the event.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = match self {
            RelayEvent::VerificationAccepted => json!({}),
            RelayEvent::VerificationRejected { mode } => json!({ "mode": mode }),
            RelayEvent::WebhookReceived {
                request_id,
                size,
                timestamp,
            } => json!({
                "request_id": request_id.to_string(),
                "size": size,
                "received_at": timestamp.to_rfc3339(),
            }),
            RelayEvent::ChangeIgnored {
                request_id,
                entry,
                change,
            } => json!({
                "request_id": request_id.to_string(),
                "entry": entry,
                "change": change,
            }),
            RelayEvent::MessageForwarded {
                request_id,
                entry,
                change,
                status,
                duration_ms,
            } => json!({
                "request_id": request_id.to_string(),
                "entry": entry,
                "change": change,
                "status": status,
                "duration_ms": duration_ms,
            }),
            RelayEvent::CredentialFailed {
                request_id,
                entry,
                change,
                message,
            }
            | RelayEvent::ForwardFailed {
                request_id,
                entry,
                change,
                message,
            } => json!({
                "request_id": request_id.to_string(),
                "entry": entry,
                "change": change,
                "message": message,
            }),
        };
        value["event"] = json!(self.name());
        value
    }
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEvent::VerificationAccepted => write!(f, "WEBHOOK VERIFIED"),
            RelayEvent::VerificationRejected { mode } => write!(
                f,
                "Webhook verification rejected (mode: {})",
                mode.as_deref().unwrap_or("<none>")
            ),
            RelayEvent::WebhookReceived {
                request_id,
                size,
                timestamp,
            } => write!(
                f,
                "Webhook received {} [{}] ({} bytes)",
                timestamp.format("%Y-%m-%d %H:%M:%S"),
                request_id,
                size
            ),
            RelayEvent::ChangeIgnored {
                request_id,
                entry,
                change,
            } => write!(
                f,
                "Ignored non-message event (status/update) [{}] at entry {} change {}",
                request_id, entry, change
            ),
            RelayEvent::MessageForwarded {
                request_id,
                status,
                duration_ms,
                ..
            } => write!(
                f,
                "Event forwarded successfully [{}]: {} in {}ms",
                request_id, status, duration_ms
            ),
            RelayEvent::CredentialFailed {
                request_id,
                message,
                ..
            } => write!(f, "Error obtaining token [{}]: {}", request_id, message),
            RelayEvent::ForwardFailed {
                request_id,
                message,
                ..
            } => write!(f, "Error forwarding event [{}]: {}", request_id, message),
        }
    }
}

/// Configuration for where event logs should be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogDestination {
    /// Log through the tracing subscriber installed by the binary
    Console,

    /// Append to a file, creating it and its parent directories if needed
    File {
        /// Path to the log file
        path: String,
    },
}

/// Configuration for the event logger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLoggerConfig {
    /// Where to send the log output
    pub destination: LogDestination,

    /// Whether to use structured (JSON) logging
    pub structured: bool,
}

impl Default for EventLoggerConfig {
    fn default() -> Self {
        Self {
            destination: LogDestination::Console,
            structured: false,
        }
    }
}

/// Receives every event published on an [`EventBus`].
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Handle a relay event
    async fn handle_event(&self, event: &RelayEvent);
}

/// Fan-out of relay events to the registered subscribers.
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to relay events
    pub fn subscribe<S>(&self, subscriber: S)
    where
        S: EventSubscriber + 'static,
    {
        self.subscribe_arc(Arc::new(subscriber));
    }

    /// Subscribe with a shared handle, so the caller can keep inspecting it
    pub fn subscribe_arc(&self, subscriber: Arc<dyn EventSubscriber>) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.push(subscriber);
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: RelayEvent) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for subscriber in subscribers.iter() {
            subscriber.handle_event(&event).await;
        }
    }

    /// Get the number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event logger
///
/// Subscribes to the event bus and writes each event to the configured
/// destination. Failures are logged at warn/error level when going to the
/// console; file output keeps every event on its own line.
pub struct EventLogger {
    config: EventLoggerConfig,
    file: Option<Mutex<File>>,
}

impl EventLogger {
    /// Create a new event logger with the given configuration.
    ///
    /// If the log file cannot be opened the logger falls back to the console.
    pub fn new(config: EventLoggerConfig) -> Self {
        let file = match &config.destination {
            LogDestination::File { path } => match Self::open_log_file(path) {
                Ok(file) => Some(Mutex::new(file)),
                Err(err) => {
                    error!("Failed to open event log file {}: {}", path, err);
                    None
                }
            },
            LogDestination::Console => None,
        };

        Self { config, file }
    }

    fn open_log_file(path: &str) -> io::Result<File> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn format_event(&self, event: &RelayEvent) -> String {
        if self.config.structured {
            let mut value = event.to_json();
            value["timestamp"] = json!(Utc::now().to_rfc3339());
            value.to_string()
        } else {
            format!("[{}] {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), event)
        }
    }

    fn log_to_console(&self, event: &RelayEvent) {
        let line = if self.config.structured {
            event.to_json().to_string()
        } else {
            event.to_string()
        };
        if event.is_failure() {
            error!("{}", line);
        } else if matches!(event, RelayEvent::VerificationRejected { .. }) {
            warn!("{}", line);
        } else {
            info!("{}", line);
        }
    }

    fn log_to_file(&self, file: &Mutex<File>, event: &RelayEvent) {
        let line = self.format_event(event);
        let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(err) = writeln!(file, "{}", line) {
            error!("Failed to write event log: {}", err);
        }
    }
}

#[async_trait]
impl EventSubscriber for EventLogger {
    async fn handle_event(&self, event: &RelayEvent) {
        match &self.file {
            Some(file) => self.log_to_file(file, event),
            None => self.log_to_console(event),
        }
    }
}
