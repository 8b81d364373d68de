//! Scripted collaborators for unit tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use crate::{
    cache::ConfirmationCache,
    error::Error,
    message::{Message, MessageId, MessageStatus, NewMessage},
    repository::{MessageRepository, PendingFilter},
    sender::MessageSender,
};

#[derive(Debug, Clone, PartialEq)]
pub enum RepoCall {
    FetchPending(PendingFilter),
    UpdateStatus(MessageId, MessageStatus),
    IncrementRetryCount(MessageId),
}

#[derive(Default)]
pub struct FakeRepository {
    messages: Mutex<BTreeMap<MessageId, Message>>,
    calls: Mutex<Vec<RepoCall>>,
    next_id: AtomicUsize,
    pub fail_fetch: AtomicBool,
    pub fail_update_status: AtomicBool,
    pub fail_increment: AtomicBool,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: MessageId, retry_count: u32) -> Message {
        let now = Utc::now();
        let message = Message {
            id,
            recipient: format!("+9055511110{id:02}"),
            content: format!("Test message {id}"),
            status: MessageStatus::Pending,
            retry_count,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };
        self.messages
            .lock()
            .unwrap()
            .insert(id, message.clone());
        message
    }

    pub fn message(&self, id: MessageId) -> Message {
        self.messages.lock().unwrap()[&id].clone()
    }

    pub fn calls(&self) -> Vec<RepoCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RepoCall::FetchPending(_)))
            .count()
    }

    fn record(&self, call: RepoCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Replaces the stored row, e.g. to move it out of `Pending` behind the
    /// back of a caller holding a snapshot.
    pub fn store(&self, message: Message) {
        self.messages.lock().unwrap().insert(message.id, message);
    }

    fn pending_mut(
        messages: &mut BTreeMap<MessageId, Message>,
        id: MessageId,
    ) -> Result<&mut Message, Error> {
        let message = messages
            .get_mut(&id)
            .ok_or_else(|| Error::message_not_found(id))?;
        if message.status != MessageStatus::Pending {
            return Err(Error::not_pending(id, message.status));
        }
        Ok(message)
    }

    fn fail(flag: &AtomicBool, what: &str) -> Result<(), Error> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::internal(eyre::eyre!("{what} unavailable")));
        }
        Ok(())
    }
}

impl MessageRepository for FakeRepository {
    fn fetch_pending(&self, filter: PendingFilter) -> BoxFuture<'_, Result<Vec<Message>, Error>> {
        Box::pin(async move {
            self.record(RepoCall::FetchPending(filter));
            Self::fail(&self.fail_fetch, "fetch")?;

            Ok(self
                .messages
                .lock()
                .unwrap()
                .values()
                .filter(|m| {
                    m.status == MessageStatus::Pending
                        && m.content.chars().count() <= filter.content_limit as usize
                        && m.retry_count < filter.max_retries
                })
                .take(filter.batch_size as usize)
                .cloned()
                .collect())
        })
    }

    fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            self.record(RepoCall::UpdateStatus(id, status));
            Self::fail(&self.fail_update_status, "update_status")?;

            let mut messages = self.messages.lock().unwrap();
            let message = Self::pending_mut(&mut messages, id)?;
            message.status = status;
            message.updated_at = at;
            if status == MessageStatus::Sent {
                message.sent_at = Some(at);
            }
            Ok(())
        })
    }

    fn increment_retry_count(&self, id: MessageId) -> BoxFuture<'_, Result<u32, Error>> {
        Box::pin(async move {
            self.record(RepoCall::IncrementRetryCount(id));
            Self::fail(&self.fail_increment, "increment_retry_count")?;

            let mut messages = self.messages.lock().unwrap();
            let message = Self::pending_mut(&mut messages, id)?;
            message.retry_count += 1;
            Ok(message.retry_count)
        })
    }

    fn list_sent(&self) -> BoxFuture<'_, Result<Vec<Message>, Error>> {
        Box::pin(async move {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .values()
                .filter(|m| m.status == MessageStatus::Sent)
                .cloned()
                .collect())
        })
    }

    fn create(&self, message: NewMessage) -> BoxFuture<'_, Result<Message, Error>> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) as MessageId + 1000;
            let mut created = self.insert(id, 0);
            created.recipient = message.to;
            created.content = message.content;
            self.messages
                .lock()
                .unwrap()
                .insert(id, created.clone());
            Ok(created)
        })
    }

    fn get(&self, id: MessageId) -> BoxFuture<'_, Result<Option<Message>, Error>> {
        Box::pin(async move { Ok(self.messages.lock().unwrap().get(&id).cloned()) })
    }

    fn clear(&self) -> BoxFuture<'_, Result<u64, Error>> {
        Box::pin(async move {
            let mut messages = self.messages.lock().unwrap();
            let count = messages.len() as u64;
            messages.clear();
            Ok(count)
        })
    }
}

/// Succeeds with `delivery-<id>` unless a failure was scripted for the id.
#[derive(Default)]
pub struct ScriptedSender {
    outcomes: Mutex<HashMap<MessageId, Result<String, String>>>,
    sent: Mutex<Vec<MessageId>>,
}

impl ScriptedSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed_with(&self, id: MessageId, delivery_id: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(id, Ok(delivery_id.to_owned()));
    }

    pub fn fail(&self, id: MessageId) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(id, Err("connection refused".to_owned()));
    }

    pub fn attempts(&self) -> Vec<MessageId> {
        self.sent.lock().unwrap().clone()
    }
}

impl MessageSender for ScriptedSender {
    fn send<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(message.id);

            match self.outcomes.lock().unwrap().get(&message.id).cloned() {
                Some(Ok(delivery_id)) => Ok(delivery_id),
                Some(Err(reason)) => Err(Error::transport(reason)),
                None => Ok(format!("delivery-{}", message.id)),
            }
        })
    }
}

#[derive(Default)]
pub struct RecordingCache {
    writes: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }
}

impl ConfirmationCache for RecordingCache {
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::cache("connection reset"));
            }
            self.writes
                .lock()
                .unwrap()
                .push((key.to_owned(), value.to_owned()));
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, Error>> {
        Box::pin(async move {
            Ok(self
                .writes
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()))
        })
    }
}
