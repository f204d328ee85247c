//! Classification of upstream `chat.postMessage` error codes
//!
//! Slack reports failures as an `error` code string in the response body.
//! Each code maps to one of three fates: retry with backoff, suppress the
//! channel and skip, or fail the message permanently. Codes absent from
//! both tables are retried, so an incomplete table degrades safely.

use std::collections::HashMap;
use std::sync::LazyLock;

/// What the dispatcher should do with a failed post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient failure, retry with backoff
    Retryable,
    /// Channel does not exist, suppress it and skip the message
    Suppress,
    /// Permanent failure, drop the message
    Permanent,
    /// Code missing from both tables, retried like a transient failure
    Unknown,
}

/// Classifier verdict for one error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: ErrorClass,
    pub description: &'static str,
}

impl Classification {
    pub fn is_retryable(&self) -> bool {
        matches!(self.class, ErrorClass::Retryable | ErrorClass::Unknown)
    }
}

/// Codes worth retrying. Checked before the permanent table, so a code
/// listed in both resolves to retryable.
static RETRYABLE: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("message_limit_exceeded", "Message throughput limit exceeded"),
        ("rate_limited", "Rate limited by Slack"),
        ("ratelimited", "Rate limited by Slack"),
        ("fatal_error", "Slack reported a fatal server error"),
        ("internal_error", "Slack reported an internal server error"),
        ("request_timeout", "Request timed out"),
    ])
});

/// Codes that no amount of retrying will fix.
static PERMANENT: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("invalid_auth", "Invalid authentication token"),
        ("token_expired", "Authentication token has expired"),
        ("token_revoked", "Authentication token has been revoked"),
        ("not_authed", "No authentication token provided"),
        ("not_allowed_token_type", "Token type not allowed for this method"),
        ("missing_scope", "Token is missing a required scope"),
        ("no_permission", "Bot has no permission to post in the channel"),
        ("access_denied", "Access denied by workspace policy"),
        ("accesslimited", "Access limited by workspace policy"),
        ("account_inactive", "Authentication token is for a deleted user or workspace"),
        ("org_login_required", "Workspace requires organization login"),
        ("two_factor_setup_required", "Two factor setup is required"),
        ("enterprise_is_restricted", "Method restricted for the enterprise"),
        ("team_access_not_granted", "Token has not been granted access to the workspace"),
        ("team_added_to_org", "Workspace is being migrated between organizations"),
        ("ekm_access_denied", "Access denied by enterprise key management"),
        ("is_archived", "Channel has been archived"),
        ("not_in_channel", "Bot is not a member of the channel"),
        ("cannot_reply_to_message", "Message cannot be replied to"),
        ("messages_tab_disabled", "Messages tab for the app is disabled"),
        ("as_user_not_supported", "The as_user parameter is not supported"),
        ("msg_too_long", "Message text is too long"),
        ("no_text", "No message text provided"),
        ("invalid_blocks", "Blocks failed validation"),
        ("invalid_blocks_format", "Blocks is not a valid JSON array"),
        ("too_many_attachments", "Too many attachments"),
        ("too_many_contact_cards", "Too many contact cards"),
        ("invalid_arguments", "Method called with invalid arguments"),
        ("invalid_arg_name", "Argument name is invalid"),
        ("invalid_array_arg", "Array argument is invalid"),
        ("invalid_charset", "Request charset is invalid"),
        ("invalid_form_data", "Form data is invalid"),
        ("invalid_post_type", "Request POST type is invalid"),
        ("missing_post_type", "Request POST type is missing"),
        ("metadata_too_large", "Metadata exceeds size limit"),
        ("metadata_must_be_sent_from_app", "Metadata can only be posted by an app"),
        ("invalid_metadata_format", "Metadata format is invalid"),
        ("invalid_metadata_schema", "Metadata schema is invalid"),
        ("method_deprecated", "Method has been deprecated"),
        ("deprecated_endpoint", "Endpoint has been deprecated"),
        ("service_unavailable", "Service is unavailable"),
        ("fatal_error", "Slack reported a fatal server error"),
        ("internal_error", "Slack reported an internal server error"),
        ("duplicate_channel_not_found", "Channel for duplicated message not found"),
        ("duplicate_message_not_found", "Duplicated message not found"),
    ])
});

/// Description for the suppressing `channel_not_found` code
const CHANNEL_NOT_FOUND: &str = "Channel not found";

/// Fallback description for codes missing from both tables
const UNKNOWN: &str = "Unknown error";

/// Map an upstream error code to what the dispatcher should do with it.
///
/// Precedence: `channel_not_found` short-circuits before any table
/// lookup, then the retryable table, then the permanent table. The
/// `restricted_action*` and `slack_connect_*_blocked` families are
/// matched by shape rather than enumerated.
pub fn classify(code: &str) -> Classification {
    if code == "channel_not_found" {
        return Classification {
            class: ErrorClass::Suppress,
            description: CHANNEL_NOT_FOUND,
        };
    }

    if let Some(description) = RETRYABLE.get(code).copied() {
        return Classification {
            class: ErrorClass::Retryable,
            description,
        };
    }

    if let Some(description) = PERMANENT.get(code).copied() {
        return Classification {
            class: ErrorClass::Permanent,
            description,
        };
    }

    if code.starts_with("restricted_action") {
        return Classification {
            class: ErrorClass::Permanent,
            description: "Action restricted by workspace preference",
        };
    }

    if code.starts_with("slack_connect_") && code.ends_with("_blocked") {
        return Classification {
            class: ErrorClass::Permanent,
            description: "Blocked in a Slack Connect channel",
        };
    }

    Classification {
        class: ErrorClass::Unknown,
        description: UNKNOWN,
    }
}
