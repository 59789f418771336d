//! OAuth2 client-credentials exchange.
//!
//! A fresh bearer token is requested for every forwarded event. Tokens are not
//! cached and their expiry is not tracked.

use crate::config::{parse_endpoint, require, AuthConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, error};

/// A bearer token obtained from the authorization server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for use in an `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.0
    }

    /// The full `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Source of bearer credentials for outbound calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtains a credential. Every call performs a new exchange.
    async fn acquire(&self) -> Result<Credential>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Client-credentials grant against a token endpoint.
pub struct ClientCredentialsProvider {
    client: Client,
    auth: AuthConfig,
}

impl ClientCredentialsProvider {
    /// Creates a provider that shares the given HTTP client.
    pub fn new(client: Client, auth: AuthConfig) -> Self {
        Self { client, auth }
    }
}

#[async_trait]
impl CredentialProvider for ClientCredentialsProvider {
    async fn acquire(&self) -> Result<Credential> {
        let url = parse_endpoint(require(&self.auth.url, "AUTH_URL")?, "AUTH_URL")?;
        let client_id = require(&self.auth.client_id, "CLIENT_ID")?;
        let client_secret = require(&self.auth.client_secret, "CLIENT_SECRET")?;

        debug!("Requesting access token from {}", url);

        let form = [
            ("grant_type", self.auth.grant_type.as_str()),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let response = self.client.post(url).form(&form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("Token endpoint returned {}: {}", status, body);
            return Err(Error::Auth(format!("status {}: {}", status, body)));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Auth(format!("invalid token response: {}", e)))?;

        match token.access_token {
            Some(token) if !token.is_empty() => Ok(Credential(token)),
            _ => Err(Error::Auth(
                "token response did not contain an access_token".to_string(),
            )),
        }
    }
}
