//! Upstream `chat.postMessage` client
//!
//! The dispatcher talks to Slack through the `Messenger` trait so tests
//! can substitute scripted implementations.

use crate::request::{PostMessageRequest, SlackResponse};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Client-side timeout for one upstream POST
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a single post attempt failed
#[derive(Error, Debug)]
pub enum PostError {
    /// Slack answered `ok: false`; the payload is the error code
    #[error("slack API error: {0}")]
    Api(String),

    /// The request never produced a decodable Slack response
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The envelope could not be serialized
    #[error("serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PostError {
    /// The upstream error code, when Slack produced one
    pub fn code(&self) -> Option<&str> {
        match self {
            PostError::Api(code) => Some(code),
            _ => None,
        }
    }
}

/// Anything that can deliver a post request upstream
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn post_message(
        &self,
        request: &PostMessageRequest,
        url: &str,
        token: &str,
    ) -> Result<(), PostError>;
}

/// Messenger backed by the real Slack Web API
pub struct SlackClient {
    client: Client,
}

impl SlackClient {
    /// Build a client with the post timeout applied.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Messenger for SlackClient {
    async fn post_message(
        &self,
        request: &PostMessageRequest,
        url: &str,
        token: &str,
    ) -> Result<(), PostError> {
        let body = serde_json::to_vec(request)?;

        let response = self
            .client
            .post(url)
            // The charset suffix silences a deprecation warning from Slack
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .bearer_auth(token)
            .body(body)
            .send()
            .await?;

        // Slack reports failures in the body, not the status line, so the
        // body is decoded regardless of the status code.
        let reply: SlackResponse = response.json().await?;

        if reply.ok {
            debug!(url, "message posted");
            Ok(())
        } else {
            Err(PostError::Api(
                reply.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}
