//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RFC7807 Problem Details (application/problem+json)
///
/// Backends that answer errors with a problem document get their `detail`
/// surfaced instead of the raw body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type", default)]
    pub type_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.title.trim().is_empty() {
        return Some(parsed.title);
    }
    None
}

fn http_message(status: &u16, body: &str) -> String {
    match try_problem_detail(body) {
        Some(detail) => format!("HTTP {status}: {detail}"),
        None if body.is_empty() => format!("HTTP {status}"),
        None => format!("HTTP {status}: {body}"),
    }
}

/// Any failure of a request/response call against the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("{}", http_message(.status, .body))]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The credential was rejected; the surrounding application should sign out.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Failure of the realtime push channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("channel is not connected")]
    NotConnected,
}
