//! The dispatch pipeline consumer
//!
//! A single long-running task drains the queue in FIFO order. Each
//! message costs one pacer token, then runs through the retry engine
//! until it reaches a terminal state: delivered, failed, or skipped
//! because its channel is suppressed. Exactly one terminal metric is
//! recorded per message, and the in-flight count is decremented exactly
//! once.
//!
//! Cancellation is reserved for abnormal termination. Normal shutdown
//! closes the queue instead, and the loop drains whatever is left
//! through the full retry budget, backoff sleeps included.

use crate::classify::{classify, Classification, ErrorClass};
use crate::inflight::InFlight;
use crate::metrics::Metrics;
use crate::pacer::Pacer;
use crate::queue::MessageQueue;
use crate::request::PostMessageRequest;
use crate::slack::Messenger;
use crate::suppress::{SuppressionList, SUPPRESSION_WINDOW};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Settings governing one dispatcher instance
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Retries after the first attempt; a message sees at most
    /// `max_retries + 1` upstream calls
    pub max_retries: u32,
    /// First backoff; doubles on every subsequent retry, unjittered
    pub initial_backoff: Duration,
    /// Upstream `chat.postMessage` URL
    pub post_url: String,
    /// Bearer token for the upstream call
    pub token: String,
    /// When set, every outbound message is rerouted here; metrics keep
    /// the original channel
    pub channel_override: Option<String>,
}

/// Terminal state of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    Failed,
    Skipped,
}

/// Single consumer of the message queue
pub struct Dispatcher {
    queue: Arc<MessageQueue>,
    in_flight: InFlight,
    pacer: Pacer,
    suppression: SuppressionList,
    messenger: Arc<dyn Messenger>,
    metrics: Arc<Metrics>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<MessageQueue>,
        in_flight: InFlight,
        pacer: Pacer,
        messenger: Arc<dyn Messenger>,
        metrics: Arc<Metrics>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            queue,
            in_flight,
            pacer,
            suppression: SuppressionList::new(),
            messenger,
            metrics,
            config,
        }
    }

    /// Consume the queue until it is closed and drained, or until
    /// `cancel` resolves.
    ///
    /// `cancel` is the abnormal-termination path: it aborts the waits on
    /// the queue and the pacer, and any message dequeued but not yet
    /// dispatched is abandoned. It is never triggered during a normal
    /// drain.
    pub async fn run(mut self, cancel: impl Future<Output = ()>) {
        info!(
            queue_capacity = self.queue.capacity(),
            max_retries = self.config.max_retries,
            "dispatcher started"
        );
        tokio::pin!(cancel);

        loop {
            let message = tokio::select! {
                _ = &mut cancel => {
                    error!("dispatcher cancelled, abandoning queued messages");
                    return;
                }
                popped = self.queue.pop() => match popped {
                    Some(message) => message,
                    None => {
                        info!("queue closed and drained, dispatcher stopping");
                        return;
                    }
                },
            };

            debug!(channel = %message.channel, "got message from queue");

            // The token is acquired after the dequeue; acquiring before
            // would burn tokens on an empty queue and spin the loop
            // against a closed one during shutdown.
            tokio::select! {
                _ = &mut cancel => {
                    error!("dispatcher cancelled while waiting for a send slot");
                    return;
                }
                _ = self.pacer.acquire() => {}
            }

            self.metrics.set_queue_size(self.queue.len());
            self.deliver(message).await;
            self.in_flight.done();
        }
    }

    /// Drive one message to a terminal state.
    async fn deliver(&mut self, message: PostMessageRequest) -> Outcome {
        // Metrics and suppression key on the channel the producer asked
        // for, not the override.
        let channel = message.channel.clone();
        let outbound = self.apply_override(message);

        let mut attempt: u32 = 0;
        loop {
            if self.suppression.should_skip(&channel, Instant::now()) {
                debug!(%channel, "channel suppressed, skipping message");
                self.metrics.not_processed(&channel);
                return Outcome::Skipped;
            }

            let error = match self
                .messenger
                .post_message(&outbound, &self.config.post_url, &self.config.token)
                .await
            {
                Ok(()) => {
                    debug!(%channel, "message sent");
                    self.metrics.succeeded(&channel);
                    return Outcome::Delivered;
                }
                Err(error) => error,
            };

            let verdict = match error.code() {
                Some(code) => classify(code),
                // No upstream code to look up: transport-level failures
                // are worth retrying.
                None => Classification {
                    class: ErrorClass::Retryable,
                    description: "Upstream request failed",
                },
            };

            match verdict.class {
                ErrorClass::Suppress => {
                    warn!(
                        %channel,
                        window_secs = SUPPRESSION_WINDOW.as_secs(),
                        "channel not found, suppressing"
                    );
                    self.suppression.mark(&channel, Instant::now());
                    self.metrics.not_processed(&channel);
                    return Outcome::Skipped;
                }
                ErrorClass::Permanent => {
                    error!(
                        %channel,
                        error = %error,
                        description = verdict.description,
                        "message failed permanently"
                    );
                    self.metrics.failed(&channel);
                    return Outcome::Failed;
                }
                ErrorClass::Unknown => {
                    warn!(
                        %channel,
                        error = %error,
                        "unclassified upstream error, treating as retryable"
                    );
                }
                ErrorClass::Retryable => {
                    warn!(
                        %channel,
                        error = %error,
                        description = verdict.description,
                        attempt,
                        "failed to post message"
                    );
                }
            }

            self.metrics.retried(&channel);

            if attempt >= self.config.max_retries {
                error!(
                    %channel,
                    error = %error,
                    attempts = attempt + 1,
                    "message failed after retries"
                );
                self.metrics.failed(&channel);
                return Outcome::Failed;
            }

            let backoff = self
                .config
                .initial_backoff
                .saturating_mul(1 << attempt.min(31));
            debug!(%channel, attempt, backoff_ms = backoff.as_millis() as u64, "backing off");
            // Deliberately not raced against `cancel`: a normal drain
            // runs every remaining message through its full budget.
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    fn apply_override(&self, mut message: PostMessageRequest) -> PostMessageRequest {
        if let Some(destination) = &self.config.channel_override {
            debug!(
                original = %message.channel,
                destination = %destination,
                "overriding channel"
            );
            message.channel = destination.clone();
        }
        message
    }
}
