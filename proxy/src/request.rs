//! Wire types for the ingress surface and the upstream API
//!
//! `PostMessageRequest` is the envelope that flows through the pipeline.
//! It is accepted by the ingress handler, buffered in the queue, and
//! finally serialized verbatim for the upstream `chat.postMessage` call.
//! The presentational fields are passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message-post request
///
/// The envelope is immutable once enqueued; the dispatcher sends a copy
/// with the destination swapped when a channel override is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub token: String,

    /// Destination channel, the routing key for the upstream post
    #[serde(default)]
    pub channel: String,

    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_user: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_names: Option<bool>,

    /// JSON serialized array of blocks, passed through opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Value>,

    /// JSON serialized array of attachments, passed through opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Value>,
}

impl PostMessageRequest {
    /// Check the ingress invariants: a channel must be set, and at least
    /// one of text, blocks, or attachments must be present.
    ///
    /// On failure returns all violations joined with `" and "`, which is
    /// the error string the ingress reply carries.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut violations = Vec::new();

        if self.channel.is_empty() {
            violations.push("Channel is not set");
        }

        if self.attachments.is_none() && self.blocks.is_none() && self.text.is_empty() {
            violations.push("Neither attachments, blocks, nor text is set");
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations.join(" and "))
        }
    }
}

/// Reply envelope shared by the ingress surface and the upstream API
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlackResponse {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SlackResponse {
    /// An accepted-for-delivery reply
    pub fn accepted() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    /// A rejection reply carrying an error description
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}
