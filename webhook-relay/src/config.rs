//! Configuration for the webhook relay.
//!
//! The configuration is assembled once at startup (environment plus command line)
//! and shared read-only with every component. Values that are only needed for
//! outbound calls are optional: a missing value is reported when it is first used,
//! not when the server starts.

use crate::error::{Error, Result};
use crate::event::{EventLoggerConfig, LogDestination};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

/// Grant type sent to the authorization server when none is configured.
pub const DEFAULT_GRANT_TYPE: &str = "client_credentials";

/// Configuration for the webhook relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// The host address to bind to.
    pub host: String,

    /// The port to bind to.
    pub port: u16,

    /// Secret the platform echoes back in `hub.verify_token` during verification.
    pub verify_token: Option<String>,

    /// OAuth2 client-credentials settings.
    pub auth: AuthConfig,

    /// Downstream endpoint that receives forwarded events.
    pub downstream_url: Option<String>,

    /// Timeout for each outbound HTTP request in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted inbound webhook body in bytes.
    pub max_body_bytes: u64,

    /// Optional event logger configuration.
    /// If not provided, relay events are only visible through tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_logger: Option<EventLoggerConfig>,
}

/// OAuth2 client-credentials settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token endpoint of the authorization server.
    pub url: Option<String>,

    /// Value of the `grant_type` form field.
    pub grant_type: String,

    /// Client identifier.
    pub client_id: Option<String>,

    /// Client secret.
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("url", &self.url)
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: None,
            grant_type: DEFAULT_GRANT_TYPE.to_string(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            verify_token: None,
            auth: AuthConfig::default(),
            downstream_url: None,
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
            event_logger: None,
        }
    }
}

impl RelayConfig {
    /// Builds a configuration from the process environment.
    ///
    /// Unset variables fall back to the defaults; unparseable numbers are ignored
    /// in favour of the default as well.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            verify_token: non_empty("VERIFY_TOKEN"),
            auth: AuthConfig {
                url: non_empty("AUTH_URL"),
                grant_type: non_empty("GRANT_TYPE").unwrap_or(defaults.auth.grant_type),
                client_id: non_empty("CLIENT_ID"),
                client_secret: non_empty("CLIENT_SECRET"),
            },
            downstream_url: non_empty("EXTERNAL_WEBHOOK_URL"),
            request_timeout_secs: non_empty("RELAY_TIMEOUT")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            max_body_bytes: non_empty("RELAY_MAX_BODY_BYTES")
                .and_then(|b| b.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
            event_logger: Some(EventLoggerConfig {
                destination: match non_empty("RELAY_EVENT_LOG") {
                    Some(path) => LogDestination::File { path },
                    None => LogDestination::Console,
                },
                structured: non_empty("RELAY_STRUCTURED_LOGS").is_some_and(|v| parse_flag(&v)),
            }),
        }
    }

    /// Returns the full server address as a string (e.g., "0.0.0.0:3000").
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Names of the settings that are unset and will make outbound calls fail.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.verify_token.is_none() {
            missing.push("VERIFY_TOKEN");
        }
        if self.auth.url.is_none() {
            missing.push("AUTH_URL");
        }
        if self.auth.client_id.is_none() {
            missing.push("CLIENT_ID");
        }
        if self.auth.client_secret.is_none() {
            missing.push("CLIENT_SECRET");
        }
        if self.downstream_url.is_none() {
            missing.push("EXTERNAL_WEBHOOK_URL");
        }
        missing
    }
}

/// Interprets a boolean switch from the environment. `1`, `true`, `yes` and `on`
/// enable it (case-insensitive); anything else leaves it off.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Resolves an optional setting into a usable value, failing with a
/// configuration error naming the variable when it is absent.
pub(crate) fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| Error::Config(format!("{} is not set", name)))
}

/// Parses an endpoint URL setting. Only `http` and `https` are accepted.
pub(crate) fn parse_endpoint(value: &str, name: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| Error::Config(format!("{} is not a valid URL: {}", name, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::Config(format!(
            "{} must use http or https, got '{}'",
            name, scheme
        ))),
    }
}
