//! slack-proxy - buffering, rate-limiting proxy for `chat.postMessage`
//!
//! Producers POST message requests to the ingress and get an immediate
//! acknowledgement; a single dispatcher drains the bounded queue toward
//! Slack under a token-bucket pace, retrying transient failures with
//! exponential backoff and suppressing channels Slack says do not exist.
//!
//! # Pipeline
//!
//! ```text
//! Producers ──► Ingress ──► Queue ──► Dispatcher ──► Slack
//!                (admit)    (FIFO)    (pace, retry,
//!                                      suppress)
//! ```
//!
//! Replicas shard a credential pool by stateful-set ordinal, so the
//! fleet's aggregate posting rate scales while each replica stays inside
//! Slack's per-credential limits.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod inflight;
pub mod metrics;
pub mod metrics_server;
pub mod pacer;
pub mod queue;
pub mod request;
pub mod server;
pub mod slack;
pub mod suppress;

pub use classify::{classify, Classification, ErrorClass};
pub use config::Config;
pub use dispatch::{DispatchConfig, Dispatcher, Outcome};
pub use error::{ProxyError, Result};
pub use inflight::InFlight;
pub use metrics::Metrics;
pub use metrics_server::MetricsServer;
pub use pacer::Pacer;
pub use queue::{EnqueueError, MessageQueue};
pub use request::{PostMessageRequest, SlackResponse};
pub use server::AppState;
pub use slack::{Messenger, PostError, SlackClient};
pub use suppress::{SuppressionList, SUPPRESSION_WINDOW};
