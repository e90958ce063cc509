//! Message log domain types.

mod status;

pub use status::{validate_transition, MessageStatus};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::uid::Uid;

/// Delivery channel of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Email,
    Webhook,
    Sms,
}

impl MessageType {
    pub const ALL: [MessageType; 3] = [MessageType::Email, MessageType::Webhook, MessageType::Sms];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Email => "email",
            MessageType::Webhook => "webhook",
            MessageType::Sms => "sms",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type: {}", s))
    }
}

/// One record per message send attempt.
///
/// `message` and `config` are ciphertext produced and consumed by the sender
/// components; storage treats them as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLog {
    /// Backend-assigned secondary key (auto-increment per shard table, or
    /// per calendar day in the file backend).
    #[serde(default)]
    pub id: i64,
    pub uid: Uid,
    pub namespace: String,
    pub send_at: DateTime<Utc>,
    #[serde(with = "crate::codec::base64_bytes")]
    pub message: Vec<u8>,
    #[serde(with = "crate::codec::base64_bytes")]
    pub config: Vec<u8>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub status: MessageStatus,
    #[serde(default)]
    pub retry_total: i64,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageLog {
    /// A new pending record. Audit fields are overwritten by the backend.
    pub fn new(
        uid: Uid,
        namespace: impl Into<String>,
        send_at: DateTime<Utc>,
        message_type: MessageType,
        message: Vec<u8>,
        config: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uid,
            namespace: namespace.into(),
            send_at,
            message,
            config,
            message_type,
            status: MessageStatus::Pending,
            retry_total: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// List request: half-open `[start_at, end_at)` window plus optional filters.
///
/// Missing window bounds default to the last `list_window_days` days
/// (configured on the store) ending now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: Option<MessageStatus>,
    pub message_type: Option<MessageType>,
    /// 1-based page number; defaults to 1 when `page_size` is set.
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl ListFilter {
    pub fn between(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self {
            start_at: Some(start_at),
            end_at: Some(end_at),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    pub fn with_page(mut self, page: u64, page_size: u64) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    /// Resolve the effective window, applying the default when unset.
    pub fn window(&self, default_days: i64, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.end_at.unwrap_or(now);
        let start = self
            .start_at
            .unwrap_or_else(|| end - Duration::days(default_days));
        (start, end)
    }

    /// `(limit, offset)` when pagination was requested.
    ///
    /// Both are capped at `i64::MAX`, the largest value SQL engines accept.
    pub fn limit_offset(&self) -> Option<(u64, u64)> {
        const MAX: u64 = i64::MAX as u64;
        let size = self.page_size.filter(|size| *size > 0)?.min(MAX);
        let page = self.page.unwrap_or(1).max(1);
        Some((size, (page - 1).saturating_mul(size).min(MAX)))
    }

    /// Value-level predicate shared by backends that filter in memory.
    pub fn matches(
        &self,
        log: &MessageLog,
        namespace: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        log.namespace == namespace
            && log.send_at >= start
            && log.send_at < end
            && self.status.is_none_or(|status| log.status == status)
            && self.message_type.is_none_or(|t| log.message_type == t)
    }
}

/// One page of list results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLogPage {
    pub items: Vec<MessageLog>,
    /// Total matching records across all pages.
    pub total: i64,
}
