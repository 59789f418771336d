//! Webhook relay for messaging platform event callbacks.
//!
//! The relay receives event envelopes pushed by a messaging platform, picks out the
//! ones that carry user messages, and forwards each of them unchanged to a single
//! downstream endpoint, authenticating with a bearer token obtained through an
//! OAuth2 client-credentials exchange.
//!
//! # Request Flow
//!
//! 1. **Verification**: the platform proves endpoint ownership with a `GET /`
//!    handshake; the challenge is echoed back when the verify token matches
//! 2. **Ingestion**: events arrive on `POST /` and are acknowledged with an empty 200
//!    regardless of what happens next
//! 3. **Filtering**: each `entry[].changes[]` item carrying a non-empty
//!    `value.messages` list qualifies; status updates are ignored
//! 4. **Credential**: a fresh token is requested for every qualifying change
//! 5. **Forwarding**: the original body, byte for byte, is posted downstream with
//!    `Authorization: Bearer <token>`
//!
//! Failures in steps 4 and 5 are published as [`event::RelayEvent`]s and logged; they
//! never change the response sent to the platform.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webhook_relay::event::EventBus;
//! use webhook_relay::{Relay, RelayConfig, RelayServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::from_env();
//!     let relay = Relay::from_config(&config, Arc::new(EventBus::new()))?;
//!
//!     let mut server = RelayServer::new(config, relay);
//!     let addr = server.start().await?;
//!     println!("relay listening on {}", addr);
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod event;
pub mod filter;
pub mod handler;
pub mod relay;
pub mod server;

pub use client::{Forwarder, WebhookClient};
pub use config::{AuthConfig, RelayConfig};
pub use credentials::{ClientCredentialsProvider, Credential, CredentialProvider};
pub use error::{Error, Result};
pub use filter::{should_forward, EventEnvelope};
pub use relay::{Relay, RelaySummary};
pub use server::RelayServer;
