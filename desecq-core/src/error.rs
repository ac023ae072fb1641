//! Closed error taxonomy shared by the HTTP client, queue, and façade.
//!
//! Every outbound call result is one of these variants; `RateLimited` is
//! a first-class variant rather than a generic error case, since it
//! drives the queue's retry/cooldown decision instead of being reported
//! to the caller directly.

use serde::Deserialize;
use thiserror::Error;

/// Parsed error body from the service, when one was returned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseError {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub non_field_errors: Option<Vec<String>>,
}

impl ResponseError {
    /// §4.1: extract `non_field_errors[0]` when present, falling back to
    /// `detail`, falling back to the raw body text.
    pub fn message(&self, fallback_body: &str) -> String {
        if let Some(errs) = &self.non_field_errors {
            if let Some(first) = errs.first() {
                return first.clone();
            }
        }
        if let Some(detail) = &self.detail {
            return detail.clone();
        }
        fallback_body.to_string()
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("token invalid; re-authenticate")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict ({status}): {message}")]
    Conflict { status: u16, message: String },

    #[error("rate limited, retry after {retry_after}s: {message}")]
    RateLimited {
        retry_after: u64,
        message: String,
        body: Option<serde_json::Value>,
    },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// A short stable tag for persistence (`QueueItemError::kind`).
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "network",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Conflict { .. } => "conflict",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Server { .. } => "server",
            ApiError::Validation(_) => "validation",
            ApiError::Storage(_) => "storage",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid record at index {index}: {reason}")]
pub struct ValidationError {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("binary codec error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("{0}")]
    Other(String),
}
