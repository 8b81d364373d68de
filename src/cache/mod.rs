//! Delivery confirmation cache.
//!
//! After a message is durably marked as sent, the dispatcher records a
//! confirmation entry keyed by the message id. Entries are written for
//! external inspection only; nothing in the dispatch path reads them back.

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::BoxFuture;

use crate::{error::Error, message::MessageId};

pub mod memory;
pub mod redis;

pub trait ConfirmationCache: Send + Sync + 'static {
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), Error>>;

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, Error>>;
}

/// `msg:<id>`
pub fn confirmation_key(id: MessageId) -> String {
    format!("msg:{id}")
}

/// `messageId=<delivery id>|sentAt=<RFC3339>`
pub fn confirmation_value(delivery_id: &str, sent_at: DateTime<Utc>) -> String {
    format!(
        "messageId={delivery_id}|sentAt={}",
        sent_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}
