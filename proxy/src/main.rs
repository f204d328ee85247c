//! slack-proxy daemon
//!
//! Run with: `cargo run -- --applicationPort :8080`
//!
//! Environment variables:
//! - `SLACK_TOKENS`: comma-separated credential pool, one entry per replica
//! - `HOSTNAME`: `<name>-<ordinal>`, selects this replica's credential
//! - `RUST_LOG`: log filter (default: "info")

use clap::Parser;
use prometheus::Registry;
use slack_proxy::config::{parse_listen_addr, select_token};
use slack_proxy::{
    server, AppState, Config, DispatchConfig, Dispatcher, InFlight, MessageQueue, Metrics,
    MetricsServer, Pacer, SlackClient,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Buffering, rate-limiting proxy in front of Slack chat.postMessage
#[derive(Debug, Parser)]
#[command(name = "slack-proxy", about)]
struct Opt {
    /// Maximum number of retries for posting a message
    #[arg(long = "maxRetries", default_value_t = 2)]
    max_retries: u32,

    /// Initial backoff in milliseconds for retries
    #[arg(long = "initialBackoff", default_value_t = 1000, value_name = "MS")]
    initial_backoff: u64,

    /// Interval between upstream posts in milliseconds
    #[arg(long = "slackRequestRate", default_value_t = 1000, value_name = "MS")]
    slack_request_rate: u64,

    /// Slack Post Message API URL
    #[arg(long = "slackURL", default_value = "https://slack.com/api/chat.postMessage")]
    slack_url: String,

    /// Maximum number of messages in the queue
    #[arg(long = "queueSize", default_value_t = 100)]
    queue_size: usize,

    /// Maximum number of burst to allow
    #[arg(long = "burst", default_value_t = 3)]
    burst: u32,

    /// Metrics listen address
    #[arg(long = "metricsPort", default_value = ":9090")]
    metrics_port: String,

    /// Application listen address
    #[arg(long = "applicationPort", default_value = ":8080")]
    application_port: String,

    /// When set, reroute every message to this channel
    #[arg(long = "channelOverride", default_value = "")]
    channel_override: String,
}

impl Opt {
    fn into_config(self) -> anyhow::Result<Config> {
        Ok(Config {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff),
            request_rate: Duration::from_millis(self.slack_request_rate),
            burst: self.burst,
            slack_url: self.slack_url,
            queue_size: self.queue_size,
            app_addr: parse_listen_addr(&self.application_port)?,
            metrics_addr: parse_listen_addr(&self.metrics_port)?,
            channel_override: match self.channel_override.as_str() {
                "" => None,
                channel => Some(channel.to_string()),
            },
            token: select_token()?,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Opt::parse().into_config()?;
    info!(
        app_addr = %config.app_addr,
        metrics_addr = %config.metrics_addr,
        queue_size = config.queue_size,
        burst = config.burst,
        "starting slack proxy"
    );

    let registry = Arc::new(Registry::new());
    let metrics = Arc::new(Metrics::new(&registry)?);
    let metrics_handle = MetricsServer::start(config.metrics_addr, Arc::clone(&registry));

    let queue = Arc::new(MessageQueue::new(config.queue_size));
    let in_flight = InFlight::new();

    let dispatcher = Dispatcher::new(
        Arc::clone(&queue),
        in_flight.clone(),
        Pacer::new(config.request_rate, config.burst),
        Arc::new(SlackClient::new()?),
        Arc::clone(&metrics),
        DispatchConfig {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
            post_url: config.slack_url.clone(),
            token: config.token.clone(),
            channel_override: config.channel_override.clone(),
        },
    );

    // Abnormal-termination path only; a normal drain never trips this.
    let abort = Arc::new(Notify::new());
    let dispatcher_handle = tokio::spawn({
        let abort = Arc::clone(&abort);
        dispatcher.run(async move { abort.notified().await })
    });

    let state = AppState::new(Arc::clone(&queue), in_flight.clone(), Arc::clone(&metrics));
    let listener = tokio::net::TcpListener::bind(config.app_addr).await?;
    info!(addr = %config.app_addr, "ingress listening");

    // Runs until the first termination signal, then stops accepting and
    // lets in-flight handlers finish enqueueing.
    server::serve(listener, state, shutdown_signal()).await?;

    info!("ingress stopped, draining queue");
    queue.close();

    // A second signal during the drain gives up on the remaining queue.
    let force = tokio::spawn({
        let abort = Arc::clone(&abort);
        async move {
            shutdown_signal().await;
            warn!("second shutdown signal, abandoning drain");
            abort.notify_waiters();
        }
    });

    dispatcher_handle.await?;
    in_flight.wait_idle().await;
    force.abort();
    metrics_handle.abort();

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to install Ctrl+C handler");
            // Fall through - we'll rely on SIGTERM
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
