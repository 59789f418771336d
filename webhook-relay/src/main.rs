//! Binary executable for the webhook relay.

use std::error::Error;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webhook_relay::event::{EventBus, EventLogger, LogDestination};
use webhook_relay::{Relay, RelayConfig, RelayServer};

// For command line argument parsing
struct Args {
    host: Option<String>,
    port: Option<u16>,
    verify_token: Option<String>,
    auth_url: Option<String>,
    grant_type: Option<String>,
    webhook_url: Option<String>,
    timeout: Option<u64>,
    event_log: Option<String>,
    structured_logs: bool,
    verbose: bool,
}

impl Args {
    fn parse() -> Result<Self, Box<dyn Error>> {
        let mut args = pico_args::Arguments::from_env();

        if args.contains("--help") {
            print_help();
            process::exit(0);
        }

        if args.contains("--version") {
            println!("webhook-relay {}", env!("CARGO_PKG_VERSION"));
            process::exit(0);
        }

        let result = Args {
            host: args.opt_value_from_str(["-h", "--host"])?,
            port: args.opt_value_from_str(["-p", "--port"])?,
            verify_token: args.opt_value_from_str("--verify-token")?,
            auth_url: args.opt_value_from_str("--auth-url")?,
            grant_type: args.opt_value_from_str("--grant-type")?,
            webhook_url: args.opt_value_from_str("--webhook-url")?,
            timeout: args.opt_value_from_str(["-t", "--timeout"])?,
            event_log: args.opt_value_from_str("--event-log")?,
            structured_logs: args.contains("--structured-logs"),
            verbose: args.contains(["-v", "--verbose"]),
        };

        let remaining = args.finish();
        if !remaining.is_empty() {
            return Err(format!("Unknown arguments: {:?}", remaining).into());
        }

        Ok(result)
    }

    /// Applies command line overrides on top of the environment configuration.
    fn apply(self, mut config: RelayConfig) -> RelayConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(token) = self.verify_token {
            config.verify_token = Some(token);
        }
        if let Some(url) = self.auth_url {
            config.auth.url = Some(url);
        }
        if let Some(grant_type) = self.grant_type {
            config.auth.grant_type = grant_type;
        }
        if let Some(url) = self.webhook_url {
            config.downstream_url = Some(url);
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
        let logger = config.event_logger.get_or_insert_with(Default::default);
        if let Some(path) = self.event_log {
            logger.destination = LogDestination::File { path };
        }
        if self.structured_logs {
            logger.structured = true;
        }
        config
    }
}

fn print_help() {
    println!("Webhook Relay");
    println!("-------------");
    println!("Forwards messaging platform webhook events to a downstream endpoint");
    println!();
    println!("USAGE:");
    println!("    webhook-relay [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --host <HOST>            Host to bind to [default: 0.0.0.0]");
    println!("    -p, --port <PORT>            Port to listen on [default: 3000]");
    println!("    --verify-token <TOKEN>       Token expected during subscription verification");
    println!("    --auth-url <URL>             OAuth2 token endpoint");
    println!("    --grant-type <TYPE>          OAuth2 grant type [default: client_credentials]");
    println!("    --webhook-url <URL>          Downstream endpoint receiving forwarded events");
    println!("    -t, --timeout <SECONDS>      Outbound request timeout [default: 30]");
    println!("    --event-log <PATH>           Write relay events to a file instead of the console");
    println!("    --structured-logs            Write relay events as JSON");
    println!("    -v, --verbose                Enable verbose logging");
    println!("    --help                       Print help information");
    println!("    --version                    Print version information");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    HOST, PORT                   Listening address");
    println!("    VERIFY_TOKEN                 Subscription verification token");
    println!("    AUTH_URL                     OAuth2 token endpoint");
    println!("    GRANT_TYPE                   OAuth2 grant type");
    println!("    CLIENT_ID, CLIENT_SECRET     OAuth2 client credentials");
    println!("    EXTERNAL_WEBHOOK_URL         Downstream endpoint");
    println!("    RELAY_TIMEOUT                Outbound request timeout in seconds");
    println!("    RELAY_MAX_BODY_BYTES         Largest accepted webhook body");
    println!("    RELAY_EVENT_LOG              Relay event log file");
    println!("    RELAY_STRUCTURED_LOGS        Write relay events as JSON");
    println!("    RUST_LOG                     Log filter [default: info]");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse().unwrap_or_else(|e| {
        eprintln!("Error parsing arguments: {}", e);
        process::exit(1);
    });

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.apply(RelayConfig::from_env());

    info!("Server configuration:");
    info!("  Address: {}", config.server_addr());
    info!("  Auth URL: {}", config.auth.url.as_deref().unwrap_or("<unset>"));
    info!("  Grant type: {}", config.auth.grant_type);
    info!(
        "  Downstream URL: {}",
        config.downstream_url.as_deref().unwrap_or("<unset>")
    );
    info!("  Request timeout: {} seconds", config.request_timeout_secs);
    for name in config.missing_settings() {
        warn!("{} is not set; requests that need it will fail", name);
    }

    let events = EventBus::new();
    if let Some(logger_config) = config.event_logger.clone() {
        events.subscribe(EventLogger::new(logger_config));
    }

    let relay = Relay::from_config(&config, Arc::new(events))?;
    let mut server = RelayServer::new(config, relay);
    if let Err(e) = server.start().await {
        error!("Failed to start server: {}", e);
        process::exit(1);
    }

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");

    if let Err(e) = server.stop().await {
        error!("Error during shutdown: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}
