//! Message persistence.
//!
//! The dispatch core only depends on [`MessageRepository`]; [`sqlite`] is the
//! production implementation.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use crate::{
    error::Error,
    message::{Message, MessageId, MessageStatus, NewMessage},
};

pub mod sqlite;

/// Filters applied when fetching messages that are due for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFilter {
    /// Maximum number of messages returned by one fetch
    pub batch_size: u32,
    /// Messages with longer content are never fetched
    pub content_limit: u32,
    /// Messages whose retry count reached this value are never fetched
    pub max_retries: u32,
}

/// Storage operations used by the dispatcher and the HTTP layer.
///
/// Every call is a self-contained unit; implementations must not require the
/// caller to hold a transaction across calls.
pub trait MessageRepository: Send + Sync + 'static {
    /// Returns up to `filter.batch_size` pending messages in a stable order.
    fn fetch_pending(&self, filter: PendingFilter) -> BoxFuture<'_, Result<Vec<Message>, Error>>;

    /// Moves a pending message to `status`. Moving to [`MessageStatus::Sent`]
    /// also records `at` as the sent timestamp.
    ///
    /// Fails with [`Error::Conflict`] if the stored message is no longer
    /// pending, and with [`Error::NotFound`] if it does not exist.
    fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), Error>>;

    /// Increments the retry count of a pending message and returns the stored
    /// count. Same failure modes as [`MessageRepository::update_status`].
    fn increment_retry_count(&self, id: MessageId) -> BoxFuture<'_, Result<u32, Error>>;

    fn list_sent(&self) -> BoxFuture<'_, Result<Vec<Message>, Error>>;

    fn create(&self, message: NewMessage) -> BoxFuture<'_, Result<Message, Error>>;

    fn get(&self, id: MessageId) -> BoxFuture<'_, Result<Option<Message>, Error>>;

    /// Removes every message. Administrative only.
    fn clear(&self) -> BoxFuture<'_, Result<u64, Error>>;
}
