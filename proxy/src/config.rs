//! Runtime configuration
//!
//! Tunables arrive as CLI flags; credentials arrive through the
//! environment. Replicas run as a stateful fleet where each pod owns one
//! credential: `SLACK_TOKENS` holds the whole pool and the pod's ordinal
//! suffix in `HOSTNAME` picks the entry. Any mismatch is fatal at
//! startup, before the queue accepts a single message.

use crate::error::{ProxyError, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Resolved configuration for one replica
#[derive(Debug, Clone)]
pub struct Config {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// First retry backoff; doubles per retry
    pub initial_backoff: Duration,

    /// Interval between paced upstream posts
    pub request_rate: Duration,

    /// Pacer burst reserve
    pub burst: u32,

    /// Upstream `chat.postMessage` URL
    pub slack_url: String,

    /// Queue capacity; admission rejects at 90% of this
    pub queue_size: usize,

    /// Ingress listen address
    pub app_addr: SocketAddr,

    /// Metrics listen address
    pub metrics_addr: SocketAddr,

    /// When set, every message is rerouted to this channel
    pub channel_override: Option<String>,

    /// This replica's credential, selected from the pool
    pub token: String,
}

/// Parse a listen address, accepting the bare `:port` shorthand.
pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr> {
    let candidate = if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    };

    candidate
        .parse()
        .map_err(|e| ProxyError::Config(format!("invalid listen address {raw}: {e}")))
}

/// Split the credential pool, trimming whitespace around each entry.
pub fn parse_tokens(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract the replica ordinal from a stateful-set pod name of the form
/// `<name>-<index>`.
pub fn parse_ordinal(hostname: &str) -> Result<usize> {
    let Some((_, index)) = hostname.rsplit_once('-') else {
        return Err(ProxyError::Config(format!(
            "invalid pod name {hostname}. Expected <name>-<index>"
        )));
    };

    index.parse().map_err(|_| {
        ProxyError::Config(format!(
            "invalid pod name format. Expected <name>-<index>, got {hostname}"
        ))
    })
}

/// Pick this replica's credential from `SLACK_TOKENS` using the ordinal
/// in `HOSTNAME`.
pub fn select_token() -> Result<String> {
    let raw = env::var("SLACK_TOKENS")
        .map_err(|_| ProxyError::Config("SLACK_TOKENS environment variable not set".to_string()))?;

    let tokens = parse_tokens(&raw);
    if tokens.is_empty() {
        return Err(ProxyError::Config(
            "SLACK_TOKENS environment variable is empty".to_string(),
        ));
    }

    let hostname = env::var("HOSTNAME")
        .map_err(|_| ProxyError::Config("HOSTNAME environment variable not set".to_string()))?;
    let ordinal = parse_ordinal(&hostname)?;

    let pool_size = tokens.len();
    tokens.into_iter().nth(ordinal).ok_or_else(|| {
        ProxyError::Config(format!(
            "replica ordinal {ordinal} out of range for a pool of {pool_size} tokens"
        ))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens_splits_and_trims() {
        assert_eq!(
            parse_tokens("token1,token2,token3"),
            vec!["token1", "token2", "token3"]
        );
        assert_eq!(parse_tokens(" token1 , token2 "), vec!["token1", "token2"]);
        assert_eq!(parse_tokens("token1"), vec!["token1"]);
    }

    #[test]
    fn test_parse_tokens_empty_input() {
        assert!(parse_tokens("").is_empty());
        assert!(parse_tokens(" , ,").is_empty());
    }

    #[test]
    fn test_parse_ordinal_valid() {
        assert_eq!(parse_ordinal("pod-3").unwrap(), 3);
        assert_eq!(parse_ordinal("slack-proxy-12").unwrap(), 12);
    }

    #[test]
    fn test_parse_ordinal_missing_separator() {
        let err = parse_ordinal("pod").unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: invalid pod name pod. Expected <name>-<index>"
        );
    }

    #[test]
    fn test_parse_ordinal_non_numeric() {
        let err = parse_ordinal("pod-abcde").unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: invalid pod name format. Expected <name>-<index>, got pod-abcde"
        );
    }

    #[test]
    fn test_parse_listen_addr_shorthand() {
        assert_eq!(
            parse_listen_addr(":9090").unwrap(),
            "0.0.0.0:9090".parse().unwrap()
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:8080").unwrap(),
            "127.0.0.1:8080".parse().unwrap()
        );
    }

    #[test]
    fn test_parse_listen_addr_rejects_garbage() {
        assert!(parse_listen_addr("not-an-address").is_err());
    }
}
