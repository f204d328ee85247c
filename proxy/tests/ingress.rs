//! HTTP ingress tests
//!
//! These run against a real listener on an ephemeral port, exercising
//! admission, validation, and the acknowledgement contract end to end.

use axum::routing::post;
use axum::{Json, Router};
use prometheus::Registry;
use slack_proxy::{
    server, AppState, DispatchConfig, Dispatcher, InFlight, MessageQueue, Metrics, Pacer,
    SlackClient, SlackResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Ingress {
    addr: SocketAddr,
    queue: Arc<MessageQueue>,
    in_flight: InFlight,
    metrics: Arc<Metrics>,
    handle: JoinHandle<std::io::Result<()>>,
}

async fn spawn_ingress(capacity: usize) -> Ingress {
    let registry = Registry::new();
    let metrics = Arc::new(Metrics::new(&registry).unwrap());
    let queue = Arc::new(MessageQueue::new(capacity));
    let in_flight = InFlight::new();

    let state = AppState::new(Arc::clone(&queue), in_flight.clone(), Arc::clone(&metrics));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server::serve(listener, state, std::future::pending()));

    Ingress {
        addr,
        queue,
        in_flight,
        metrics,
        handle,
    }
}

fn body(channel: Option<&str>, text: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    if let Some(channel) = channel {
        body.insert("channel".to_string(), channel.into());
    }
    if let Some(text) = text {
        body.insert("text".to_string(), text.into());
    }
    body.into()
}

#[tokio::test]
async fn test_valid_request_is_accepted() {
    let ingress = spawn_ingress(10).await;
    let url = format!("http://{}/", ingress.addr);

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body(Some("C123"), Some("hello")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json; charset=utf-8"
    );
    let reply: SlackResponse = response.json().await.unwrap();
    assert_eq!(reply, SlackResponse::accepted());

    assert_eq!(ingress.queue.len(), 1);
    assert_eq!(ingress.in_flight.count(), 1);
    assert_eq!(
        ingress
            .metrics
            .requests_received
            .with_label_values(&["C123"])
            .get(),
        1
    );
    assert_eq!(ingress.metrics.queue_size.get(), 1);

    ingress.handle.abort();
}

#[tokio::test]
async fn test_non_post_method_is_rejected() {
    let ingress = spawn_ingress(10).await;
    let url = format!("http://{}/", ingress.addr);

    let response = reqwest::Client::new().get(&url).send().await.unwrap();

    assert_eq!(response.status(), 405);
    assert!(ingress.queue.is_empty());

    ingress.handle.abort();
}

#[tokio::test]
async fn test_wrong_shape_body_reports_all_violations() {
    let ingress = spawn_ingress(10).await;
    let url = format!("http://{}/", ingress.addr);

    let response = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({"foo": "bar"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json; charset=utf-8"
    );
    let reply: SlackResponse = response.json().await.unwrap();
    assert_eq!(
        reply,
        SlackResponse::rejected(
            "Channel is not set and Neither attachments, blocks, nor text is set"
        )
    );
    assert!(ingress.queue.is_empty());

    ingress.handle.abort();
}

#[tokio::test]
async fn test_missing_channel_is_rejected() {
    let ingress = spawn_ingress(10).await;
    let url = format!("http://{}/", ingress.addr);

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body(None, Some("hello")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let reply: SlackResponse = response.json().await.unwrap();
    assert_eq!(reply, SlackResponse::rejected("Channel is not set"));

    ingress.handle.abort();
}

#[tokio::test]
async fn test_missing_content_is_rejected() {
    let ingress = spawn_ingress(10).await;
    let url = format!("http://{}/", ingress.addr);

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body(Some("C123"), None))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let reply: SlackResponse = response.json().await.unwrap();
    assert_eq!(
        reply,
        SlackResponse::rejected("Neither attachments, blocks, nor text is set")
    );

    ingress.handle.abort();
}

#[tokio::test]
async fn test_undecodable_body_is_rejected() {
    let ingress = spawn_ingress(10).await;
    let url = format!("http://{}/", ingress.addr);

    let response = reqwest::Client::new()
        .post(&url)
        .header("content-type", "application/json")
        .body("this is not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let reply: SlackResponse = response.json().await.unwrap();
    assert!(!reply.ok);
    assert!(reply.error.is_some());

    ingress.handle.abort();
}

#[tokio::test]
async fn test_admission_rejects_at_high_watermark() {
    let ingress = spawn_ingress(10).await;
    let url = format!("http://{}/", ingress.addr);
    let client = reqwest::Client::new();

    // Fill to the admission threshold: floor(0.9 * 10) = 9
    for i in 0..9 {
        let response = client
            .post(&url)
            .json(&body(Some(&format!("C{i}")), Some("hello")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "message {i} should be admitted");
    }

    let response = client
        .post(&url)
        .json(&body(Some("C9"), Some("hello")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let reply: SlackResponse = response.json().await.unwrap();
    assert_eq!(reply, SlackResponse::rejected("Queue is almost full"));

    // One slot below the threshold admits again
    ingress.queue.pop().await.unwrap();
    ingress.in_flight.done();
    let response = client
        .post(&url)
        .json(&body(Some("C9"), Some("hello")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    ingress.handle.abort();
}

/// Full stack: ingress, queue, dispatcher, and a mock Slack upstream.
/// Shutdown follows the production order: stop the ingress, close the
/// queue, drain, wait for quiescence.
#[tokio::test]
async fn test_accepted_messages_survive_shutdown_drain() {
    // Mock upstream that acknowledges everything
    let upstream_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream_listener.local_addr().unwrap();
    let upstream: Router = Router::new().route(
        "/api/chat.postMessage",
        post(|| async { Json(SlackResponse::accepted()) }),
    );
    tokio::spawn(async move {
        axum::serve(upstream_listener, upstream).await.unwrap();
    });

    let registry = Registry::new();
    let metrics = Arc::new(Metrics::new(&registry).unwrap());
    let queue = Arc::new(MessageQueue::new(10));
    let in_flight = InFlight::new();

    let dispatcher = Dispatcher::new(
        Arc::clone(&queue),
        in_flight.clone(),
        Pacer::new(Duration::from_millis(5), 1),
        Arc::new(SlackClient::new().unwrap()),
        Arc::clone(&metrics),
        DispatchConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(10),
            post_url: format!("http://{upstream_addr}/api/chat.postMessage"),
            token: "xoxb-test".to_string(),
            channel_override: None,
        },
    );
    let dispatcher_handle = tokio::spawn(dispatcher.run(std::future::pending()));

    let state = AppState::new(Arc::clone(&queue), in_flight.clone(), Arc::clone(&metrics));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ingress_addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let ingress_handle = tokio::spawn(server::serve(listener, state, async {
        shutdown_rx.await.ok();
    }));

    let url = format!("http://{ingress_addr}/");
    let client = reqwest::Client::new();
    for _ in 0..3 {
        let response = client
            .post(&url)
            .json(&body(Some("C123"), Some("hello")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    // Production shutdown order
    shutdown_tx.send(()).unwrap();
    ingress_handle.await.unwrap().unwrap();
    queue.close();
    dispatcher_handle.await.unwrap();
    in_flight.wait_idle().await;

    assert!(queue.is_empty());
    assert_eq!(in_flight.count(), 0);
    assert_eq!(
        metrics
            .requests_succeeded
            .with_label_values(&["C123"])
            .get(),
        3
    );

    // The ingress socket no longer accepts connections
    assert!(client
        .post(&url)
        .json(&body(Some("C123"), Some("hello")))
        .send()
        .await
        .is_err());
}
