//! Outbound message records and their delivery status.
//!
//! Messages are created in `Pending` status by a producer (the create API or
//! the sample seeder) and are only ever mutated by the dispatch engine:
//!
//! 1. A successful delivery moves a message to `Sent` and stamps `sent_at`.
//! 2. A failed delivery increments `retry_count` and leaves it `Pending`.
//! 3. Once `retry_count` reaches the configured maximum it moves to `Failed`.
//!
//! `Sent` and `Failed` are terminal; the poller never fetches them again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Repository-assigned message identifier.
pub type MessageId = i64;

/// Delivery status of a message.
///
/// `Pending` -> `Sent`    (delivered)
/// `Pending` -> `Pending` (retry scheduled)
/// `Pending` -> `Failed`  (retries exhausted)
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    sqlx::Type,
    strum::Display,
    strum::AsRefStr,
)]
#[sqlx(type_name = "text")]
pub enum MessageStatus {
    /// Waiting for (another) delivery attempt
    #[serde(rename = "pending")]
    #[sqlx(rename = "pending")]
    #[strum(serialize = "pending")]
    Pending,
    /// Accepted by the delivery endpoint
    #[serde(rename = "sent")]
    #[sqlx(rename = "sent")]
    #[strum(serialize = "sent")]
    Sent,
    /// Gave up after the maximum number of attempts
    #[serde(rename = "failed")]
    #[sqlx(rename = "failed")]
    #[strum(serialize = "failed")]
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// A queued outbound message.
#[derive(Serialize, Deserialize, FromRow, Debug, Clone, PartialEq)]
pub struct Message {
    /// Unique identifier for the message
    pub id: MessageId,
    /// Recipient address
    #[serde(rename = "to")]
    pub recipient: String,
    /// Message body, bounded by the configured char limit
    pub content: String,
    /// Current delivery status
    pub status: MessageStatus,
    /// Number of failed delivery attempts
    pub retry_count: u32,
    /// Set once, on the first successful delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a new message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub to: String,
    pub content: String,
}

impl NewMessage {
    pub fn new(to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            content: content.into(),
        }
    }

    /// Sample messages used to populate an empty database.
    pub fn samples() -> Vec<NewMessage> {
        (1..=10)
            .map(|n| NewMessage::new(format!("+905551111{n:03}"), format!("Test message {n}")))
            .collect()
    }
}
