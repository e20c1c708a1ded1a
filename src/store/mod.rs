//! Remote record store access.
//!
//! The poll loop only sees the [`RecordStore`] trait; [`RestStore`] is the
//! HTTP implementation used by the daemon.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::PollConfig;
use crate::types::Record;

pub mod rest;
pub use rest::RestStore;

/// What one fetch reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    /// Every entity whose status field equals the available marker.
    Available,
    /// A single entity by identifier, unfiltered.
    Entity(String),
}

/// Why a fetch produced no usable result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote store answered {status}: {body}")]
    Protocol { status: u16, body: String },
    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cannot build request URL from {0:?}")]
    InvalidUrl(String),
}

impl FetchError {
    /// HTTP status, when the store answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Protocol { status, .. } => Some(*status),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            FetchError::Parse(_) | FetchError::InvalidUrl(_) => None,
        }
    }

    /// Short human-readable description, suitable for a one-shot message.
    pub fn summary(&self) -> String {
        match self {
            FetchError::Protocol { status, body } => summarize_body(*status, body),
            other => other.to_string(),
        }
    }
}

/// Renders a Firebase-style `{"error": ...}` body.  Falls back to the raw body.
fn summarize_body(status: u16, body: &str) -> String {
    let Ok(root) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    match root.get("error") {
        Some(Value::Object(err)) => {
            let code = err.get("code").and_then(Value::as_u64).unwrap_or(0);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(body);
            if code != 0 {
                format!("HTTP {}: {}", code, message)
            } else {
                message.to_string()
            }
        }
        Some(Value::String(message)) => format!("HTTP {}: {}", status, message),
        _ => body.to_string(),
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the current remote state for `target`, keyed by identifier.
    /// An empty map means nothing currently matches.
    async fn fetch(
        &self,
        config: &PollConfig,
        target: &WatchTarget,
    ) -> Result<BTreeMap<String, Record>, FetchError>;

    /// Overwrite the status field of one entity.
    async fn set_status(&self, config: &PollConfig, id: &str, value: &str)
        -> Result<(), FetchError>;
}
