//! Event filtering for inbound webhook envelopes.
//!
//! The platform delivers both user messages and delivery/status updates on the same
//! route, nested as `entry[] -> changes[] -> value`. Only changes whose `value`
//! carries a non-empty `messages` array are relayed. Any shape this module does not
//! recognise is treated as "nothing to forward", never as an error.

use bytes::Bytes;
use serde_json::Value;

/// An inbound event envelope.
///
/// Holds the body exactly as received, which is what gets forwarded, plus a
/// best-effort JSON view used only for routing decisions.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    raw: Bytes,
    parsed: Option<Value>,
}

impl EventEnvelope {
    /// Wraps a received body. Bodies that are not valid JSON are kept but never
    /// match the filter.
    pub fn new(raw: Bytes) -> Self {
        let parsed = serde_json::from_slice(&raw).ok();
        Self { raw, parsed }
    }

    /// Wraps a body that was not declared as JSON. It is kept for logging but
    /// never parsed, so it never matches the filter.
    pub fn opaque(raw: Bytes) -> Self {
        Self { raw, parsed: None }
    }

    /// The body bytes exactly as received.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The parsed JSON view, if the body was valid JSON.
    pub fn json(&self) -> Option<&Value> {
        self.parsed.as_ref()
    }

    /// Size of the received body in bytes.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Whether the received body was empty.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Whether a `Content-Type` header value declares a JSON body.
///
/// Only `application/json` counts, with or without parameters such as `charset`.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/// Position of a change inside the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRef {
    /// Index into `entry`.
    pub entry: usize,
    /// Index into that entry's `changes`.
    pub change: usize,
}

/// Routing decision for a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The change carries at least one user message.
    Message,
    /// Anything else: status updates, empty message lists, unknown shapes.
    Other,
}

/// Classifies every change in the envelope, in document order.
///
/// Entries without a `changes` array contribute nothing; a change without a usable
/// `value` is reported as [`ChangeKind::Other`].
pub fn classify_changes(envelope: &Value) -> Vec<(ChangeRef, ChangeKind)> {
    let Some(entries) = envelope.get("entry").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (entry_idx, entry) in entries.iter().enumerate() {
        let Some(changes) = entry.get("changes").and_then(Value::as_array) else {
            continue;
        };
        for (change_idx, change) in changes.iter().enumerate() {
            let kind = if carries_messages(change) {
                ChangeKind::Message
            } else {
                ChangeKind::Other
            };
            out.push((
                ChangeRef {
                    entry: entry_idx,
                    change: change_idx,
                },
                kind,
            ));
        }
    }
    out
}

/// Positions of the changes that should be relayed, in document order.
pub fn qualifying_changes(envelope: &Value) -> Vec<ChangeRef> {
    classify_changes(envelope)
        .into_iter()
        .filter(|(_, kind)| *kind == ChangeKind::Message)
        .map(|(change, _)| change)
        .collect()
}

/// Returns true if any change in the envelope carries a user message.
pub fn should_forward(envelope: &Value) -> bool {
    !qualifying_changes(envelope).is_empty()
}

fn carries_messages(change: &Value) -> bool {
    change
        .get("value")
        .and_then(|value| value.get("messages"))
        .and_then(Value::as_array)
        .is_some_and(|messages| !messages.is_empty())
}
