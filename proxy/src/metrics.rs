//! Prometheus metrics for the proxy
//!
//! Counters are labeled with the original destination channel; the queue
//! gauge is unlabeled. Metric names and help texts are scraped by
//! dashboards and alerts, so they are stable identifiers.

use crate::error::Result;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

const NAMESPACE: &str = "slackproxy";

/// All proxy metrics, registered against an explicit registry so tests
/// can build isolated instances.
#[derive(Clone)]
pub struct Metrics {
    pub requests_received: IntCounterVec,
    pub requests_succeeded: IntCounterVec,
    pub requests_failed: IntCounterVec,
    pub requests_retried: IntCounterVec,
    pub requests_not_processed: IntCounterVec,
    pub queue_size: IntGauge,
}

impl Metrics {
    /// Create and register the full metric set.
    pub fn new(registry: &Registry) -> Result<Self> {
        let channel_counter = |name: &str, help: &str| -> Result<IntCounterVec> {
            let counter =
                IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), &["channel"])?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let metrics = Self {
            requests_received: channel_counter(
                "requests_received_total",
                "The total number of requests received",
            )?,
            requests_succeeded: channel_counter(
                "requests_succeeded_total",
                "The total number of requests succeeded",
            )?,
            requests_failed: channel_counter(
                "requests_failed_total",
                "The total number of requests failed",
            )?,
            requests_retried: channel_counter(
                "requests_retried_total",
                "The total number of requests retried",
            )?,
            requests_not_processed: channel_counter(
                "requests_not_processed_total",
                "The total number of requests not processed",
            )?,
            queue_size: IntGauge::with_opts(
                Opts::new("queue_size", "The current size of the queue").namespace(NAMESPACE),
            )?,
        };
        registry.register(Box::new(metrics.queue_size.clone()))?;

        Ok(metrics)
    }

    pub fn received(&self, channel: &str) {
        self.requests_received.with_label_values(&[channel]).inc();
    }

    pub fn succeeded(&self, channel: &str) {
        self.requests_succeeded.with_label_values(&[channel]).inc();
    }

    pub fn failed(&self, channel: &str) {
        self.requests_failed.with_label_values(&[channel]).inc();
    }

    pub fn retried(&self, channel: &str) {
        self.requests_retried.with_label_values(&[channel]).inc();
    }

    pub fn not_processed(&self, channel: &str) {
        self.requests_not_processed
            .with_label_values(&[channel])
            .inc();
    }

    pub fn set_queue_size(&self, size: usize) {
        self.queue_size.set(size as i64);
    }
}
