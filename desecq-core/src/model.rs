//! Closed data types for zones, rrsets, tokens, policies, and queue items.
//!
//! Response bodies from the service are dynamic JSON in the original
//! client; here every shape the core reasons about is a named struct or a
//! closed enum, per the "tagged data, not duck-typed maps" design note.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A delegated DNS zone, as cached locally. Authoritative copy lives on
/// the server; this is a read model only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Fully-qualified domain name, with trailing dot. Unique.
    pub name: String,
    pub created: DateTime<Utc>,
    pub published: bool,
    pub minimum_ttl: Option<u32>,
    pub dnssec: Option<DnssecInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnssecInfo {
    pub key_tag: u32,
    pub algorithm: u8,
    pub flags: u16,
    /// Digest by digest type (e.g. 1 = SHA-1, 2 = SHA-256).
    pub digests: Vec<DsDigest>,
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsDigest {
    pub digest_type: u8,
    pub digest: String,
}

/// Resource record set. Natural key is `(zone, subname, type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RRset {
    pub zone: String,
    pub subname: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: u32,
    /// One raw, type-specific formatted value per line of user input.
    pub records: Vec<String>,
    pub created: DateTime<Utc>,
    pub touched: DateTime<Utc>,
}

impl RRset {
    pub fn key(&self) -> (String, String) {
        (self.subname.clone(), self.record_type.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub limit_domains: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub permissions: TokenPermissions,
    pub max_age: Option<i64>,
    pub max_unused_period: Option<i64>,
    pub allowed_subnets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenPermissions {
    pub create_domain: bool,
    pub delete_domain: bool,
    pub manage_tokens: bool,
    pub auto_policy: bool,
}

/// A secret is only ever present on the response to `create_token`, and
/// must never be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedToken {
    pub token: Token,
    pub secret: String,
}

/// Fine-grained RRset ACL row. Natural key `(token_id, domain, subname, type)`;
/// `None` in any position is a catch-all wildcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPolicy {
    pub id: String,
    pub token_id: String,
    pub domain: Option<String>,
    pub subname: Option<String>,
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub perm_write: bool,
}

/// HTTP methods the core ever issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// A queued outbound call: method, path relative to the configured base
/// URL, and an optional JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

impl Priority {
    fn rank(self) -> u8 {
        self as u8
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Pending,
    Running,
    Ok,
    Failed,
    Cancelled,
    RateLimited,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, QueueStatus::Pending | QueueStatus::Running)
    }
}

/// Structural copy of a `QueueItem` suitable for `snapshot()`, history
/// persistence, and delivery to the submitter. Never carries the
/// callback sink itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItemSnapshot {
    pub id: u64,
    pub priority: Priority,
    pub category: String,
    pub action: String,
    pub request: ApiRequest,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub response: Option<serde_json::Value>,
    pub error: Option<QueueItemError>,
}

/// Minimal, serializable view of an `ApiError` for persistence/history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItemError {
    pub kind: String,
    pub message: String,
    /// Populated for `ApiError::RateLimited`; seconds until the cooldown
    /// the queue entered on this item's behalf lifts.
    pub retry_after: Option<u64>,
}
