//! Message transport.

use futures_util::future::BoxFuture;

use crate::{error::Error, message::Message};

pub mod webhook;

/// Delivers a single message to the remote endpoint.
pub trait MessageSender: Send + Sync + 'static {
    /// Returns the delivery identifier assigned by the endpoint.
    ///
    /// An error means delivery was not confirmed; the message may or may not
    /// have reached the recipient.
    fn send<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<String, Error>>;
}
