//! Ingress HTTP surface
//!
//! One `POST /` handler. Producers get an immediate acknowledgement:
//! 200 means accepted for delivery, nothing more. The final outcome of a
//! message is observable only through metrics and logs.
//!
//! Admission is checked before anything else so an overloaded proxy
//! sheds load without doing per-request work.

use crate::inflight::InFlight;
use crate::metrics::Metrics;
use crate::queue::MessageQueue;
use crate::request::{PostMessageRequest, SlackResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{HeaderName, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::warn;

/// Rejection body when the queue is at the admission threshold
const QUEUE_ALMOST_FULL: &str = "Queue is almost full";

/// The charset suffix is part of the documented reply contract
const JSON_UTF8: &str = "application/json; charset=utf-8";

type Reply = (StatusCode, [(HeaderName, &'static str); 1], Json<SlackResponse>);

fn reply(status: StatusCode, body: SlackResponse) -> Reply {
    (status, [(CONTENT_TYPE, JSON_UTF8)], Json(body))
}

/// Shared state behind the ingress handlers
#[derive(Clone)]
pub struct AppState {
    queue: Arc<MessageQueue>,
    in_flight: InFlight,
    metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(queue: Arc<MessageQueue>, in_flight: InFlight, metrics: Arc<Metrics>) -> Self {
        Self {
            queue,
            in_flight,
            metrics,
        }
    }
}

/// Build the ingress router. Non-POST methods get 405 from the router
/// itself.
pub fn router(state: AppState) -> Router {
    Router::new().route("/", post(handle_post)).with_state(state)
}

/// Serve the ingress until `shutdown` resolves, then stop accepting and
/// let in-flight handlers finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn handle_post(
    State(state): State<AppState>,
    body: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Reply {
    // Reject before decoding when the queue is at the admission
    // threshold.
    let queue_size = state.queue.len();
    if queue_size >= state.queue.watermark() {
        warn!(queue_size, "queue is almost full, rejecting request");
        return reply(
            StatusCode::SERVICE_UNAVAILABLE,
            SlackResponse::rejected(QUEUE_ALMOST_FULL),
        );
    }

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let detail = rejection.body_text();
            warn!(error = %detail, "undecodable request body");
            return reply(StatusCode::BAD_REQUEST, SlackResponse::rejected(detail));
        }
    };

    if let Err(violations) = request.validate() {
        warn!(error = %violations, "invalid request");
        return reply(StatusCode::BAD_REQUEST, SlackResponse::rejected(violations));
    }

    let channel = request.channel.clone();
    match state.queue.try_push(request) {
        Ok(()) => {
            // Counted only once the message is in the queue, and with
            // the channel the producer asked for; a configured override
            // is applied later, by the dispatcher. The push
            // happens-before dispatch, so received still precedes any
            // terminal counter for this message.
            state.metrics.received(&channel);
            state.in_flight.add();
            state.metrics.set_queue_size(state.queue.len());
            reply(StatusCode::OK, SlackResponse::accepted())
        }
        Err(reason) => {
            // A handler that raced past the early check; the request
            // was never accepted, so nothing was counted.
            warn!(?reason, "queue refused request past the admission check");
            reply(
                StatusCode::SERVICE_UNAVAILABLE,
                SlackResponse::rejected(QUEUE_ALMOST_FULL),
            )
        }
    }
}
