//! Single-message delivery.
//!
//! [`Dispatcher::dispatch`] performs one delivery attempt and records its
//! outcome:
//!
//! - transport failure: the retry count is incremented, and the message is
//!   marked `Failed` once the retry policy is exhausted;
//! - transport success: the message is marked `Sent`, then a confirmation entry
//!   is written to the cache on a best-effort basis.
//!
//! Only persistence failures are returned as errors. Transport failures are
//! part of normal operation and are reported through [`DispatchOutcome`].
//!
//! Every write is conditional on the stored message still being `Pending`.
//! A snapshot that went stale (another dispatch already finished the message)
//! gets [`Error::Conflict`] and leaves the stored row untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    cache::{confirmation_key, confirmation_value, ConfirmationCache},
    error::Error,
    message::{Message, MessageStatus},
    repository::MessageRepository,
    retry::{RetryDecision, RetryPolicy},
    sender::MessageSender,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent {
        delivery_id: String,
        sent_at: DateTime<Utc>,
    },
    Retrying {
        retry_count: u32,
    },
    Failed {
        retry_count: u32,
    },
}

#[derive(Clone)]
pub struct Dispatcher {
    repository: Arc<dyn MessageRepository>,
    sender: Arc<dyn MessageSender>,
    cache: Arc<dyn ConfirmationCache>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        sender: Arc<dyn MessageSender>,
        cache: Arc<dyn ConfirmationCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            sender,
            cache,
            retry,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    #[tracing::instrument(skip_all, fields(message_id = message.id))]
    pub async fn dispatch(&self, message: &Message) -> Result<DispatchOutcome, Error> {
        match self.sender.send(message).await {
            Ok(delivery_id) => self.record_delivery(message, delivery_id).await,
            Err(e) => {
                tracing::warn!(
                    retry_count = message.retry_count,
                    error = %e,
                    "Failed to send message"
                );
                self.record_failure(message).await
            }
        }
    }

    async fn record_failure(&self, message: &Message) -> Result<DispatchOutcome, Error> {
        // The stored count wins over the snapshot's.
        let retry_count = self.repository.increment_retry_count(message.id).await?;

        match self.retry.classify(retry_count) {
            RetryDecision::Retry { retry_count } => Ok(DispatchOutcome::Retrying { retry_count }),
            RetryDecision::Exhausted { retry_count } => {
                tracing::warn!(retry_count, "Marking message as failed after max retries");

                self.repository
                    .update_status(message.id, MessageStatus::Failed, Utc::now())
                    .await?;

                Ok(DispatchOutcome::Failed { retry_count })
            }
        }
    }

    async fn record_delivery(
        &self,
        message: &Message,
        delivery_id: String,
    ) -> Result<DispatchOutcome, Error> {
        let sent_at = Utc::now();

        if let Err(e) = self
            .repository
            .update_status(message.id, MessageStatus::Sent, sent_at)
            .await
        {
            tracing::error!(
                delivery_id = %delivery_id,
                error = %e,
                "Message was delivered but its status could not be recorded"
            );
            return Err(e);
        }

        let key = confirmation_key(message.id);
        let value = confirmation_value(&delivery_id, sent_at);

        if let Err(e) = self.cache.set(&key, &value).await {
            tracing::warn!(error = %e, "Failed to cache delivery confirmation");
        }

        tracing::info!(delivery_id = %delivery_id, "Message sent successfully");

        Ok(DispatchOutcome::Sent {
            delivery_id,
            sent_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        message::NewMessage,
        repository::sqlite::SqliteRepository,
        testing::{FakeRepository, RecordingCache, RepoCall, ScriptedSender},
    };

    struct Harness {
        repo: Arc<FakeRepository>,
        sender: Arc<ScriptedSender>,
        cache: Arc<RecordingCache>,
        dispatcher: Dispatcher,
    }

    fn harness(max_retries: u32) -> Harness {
        let repo = Arc::new(FakeRepository::new());
        let sender = Arc::new(ScriptedSender::new());
        let cache = Arc::new(RecordingCache::new());
        let dispatcher = Dispatcher::new(
            repo.clone(),
            sender.clone(),
            cache.clone(),
            RetryPolicy::new(max_retries).unwrap(),
        );

        Harness {
            repo,
            sender,
            cache,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_first_failure_increments_and_stays_pending() {
        let h = harness(3);
        let message = h.repo.insert(1, 0);
        h.sender.fail(1);

        let outcome = h.dispatcher.dispatch(&message).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Retrying { retry_count: 1 });
        let stored = h.repo.message(1);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.status, MessageStatus::Pending);
        assert_eq!(h.repo.calls(), vec![RepoCall::IncrementRetryCount(1)]);
        assert!(h.cache.writes().is_empty());
    }

    #[tokio::test]
    async fn test_last_failure_marks_failed() {
        let h = harness(3);
        let message = h.repo.insert(1, 2);
        h.sender.fail(1);

        let outcome = h.dispatcher.dispatch(&message).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Failed { retry_count: 3 });
        let stored = h.repo.message(1);
        assert_eq!(stored.retry_count, 3);
        assert_eq!(stored.status, MessageStatus::Failed);
        assert!(stored.sent_at.is_none());
        assert_eq!(
            h.repo.calls(),
            vec![
                RepoCall::IncrementRetryCount(1),
                RepoCall::UpdateStatus(1, MessageStatus::Failed),
            ]
        );
        assert!(h.cache.writes().is_empty());
    }

    #[tokio::test]
    async fn test_success_marks_sent_and_caches() {
        let h = harness(3);
        let message = h.repo.insert(1, 0);
        h.sender.succeed_with(1, "abc");

        let outcome = h.dispatcher.dispatch(&message).await.unwrap();

        let sent_at = match outcome {
            DispatchOutcome::Sent {
                delivery_id,
                sent_at,
            } => {
                assert_eq!(delivery_id, "abc");
                sent_at
            }
            other => panic!("expected sent, got {other:?}"),
        };

        let stored = h.repo.message(1);
        assert_eq!(stored.status, MessageStatus::Sent);
        assert_eq!(stored.sent_at, Some(sent_at));
        assert_eq!(stored.retry_count, 0);

        assert_eq!(
            h.cache.writes(),
            vec![(
                "msg:1".to_owned(),
                confirmation_value("abc", sent_at)
            )]
        );
        assert!(h.cache.writes()[0].1.starts_with("messageId=abc|sentAt="));
    }

    #[tokio::test]
    async fn test_status_update_failure_is_reported_and_skips_cache() {
        let h = harness(3);
        let message = h.repo.insert(1, 0);
        h.repo.fail_update_status.store(true, Ordering::SeqCst);

        assert!(h.dispatcher.dispatch(&message).await.is_err());
        assert!(h.cache.writes().is_empty());
        assert_eq!(h.repo.message(1).status, MessageStatus::Pending);
    }

    #[tokio::test]
    async fn test_cache_failure_does_not_fail_dispatch() {
        let h = harness(3);
        let message = h.repo.insert(1, 0);
        h.cache.fail.store(true, Ordering::SeqCst);

        let outcome = h.dispatcher.dispatch(&message).await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Sent { .. }));
        assert_eq!(h.repo.message(1).status, MessageStatus::Sent);
        assert_eq!(h.sender.attempts(), vec![1]);
    }

    #[tokio::test]
    async fn test_retry_bookkeeping_failure_is_reported() {
        let h = harness(3);
        let message = h.repo.insert(1, 0);
        h.sender.fail(1);
        h.repo.fail_increment.store(true, Ordering::SeqCst);

        assert!(h.dispatcher.dispatch(&message).await.is_err());
        assert_eq!(h.repo.message(1).retry_count, 0);
    }

    #[tokio::test]
    async fn test_stale_snapshot_does_not_touch_sent_row() {
        let h = harness(3);
        let snapshot = h.repo.insert(1, 2);

        let mut sent = snapshot.clone();
        sent.status = MessageStatus::Sent;
        sent.sent_at = Some(Utc::now());
        h.repo.store(sent.clone());
        h.sender.fail(1);

        match h.dispatcher.dispatch(&snapshot).await {
            Err(Error::Conflict { .. }) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(h.repo.message(1), sent);
        assert!(h.cache.writes().is_empty());
    }

    #[tokio::test]
    async fn test_stale_snapshot_does_not_resurrect_failed_row() {
        let h = harness(3);
        let snapshot = h.repo.insert(1, 0);

        let mut failed = snapshot.clone();
        failed.status = MessageStatus::Failed;
        failed.retry_count = 3;
        h.repo.store(failed.clone());

        match h.dispatcher.dispatch(&snapshot).await {
            Err(Error::Conflict { .. }) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(h.repo.message(1), failed);
        assert!(h.cache.writes().is_empty());
    }

    #[tokio::test]
    async fn test_retry_decision_uses_stored_count() {
        let h = harness(3);
        let snapshot = h.repo.insert(1, 0);
        h.repo.insert(1, 2);
        h.sender.fail(1);

        let outcome = h.dispatcher.dispatch(&snapshot).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Failed { retry_count: 3 });
        assert_eq!(h.repo.message(1).status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_stale_snapshot_against_sqlite() {
        let repo = Arc::new(SqliteRepository::connect(None).await.unwrap());
        let sender = Arc::new(ScriptedSender::new());
        let cache = Arc::new(RecordingCache::new());
        let dispatcher = Dispatcher::new(
            repo.clone(),
            sender.clone(),
            cache.clone(),
            RetryPolicy::new(3).unwrap(),
        );

        let created = repo
            .create(NewMessage::new("+905551111001", "hello"))
            .await
            .unwrap();
        repo.increment_retry_count(created.id).await.unwrap();
        repo.increment_retry_count(created.id).await.unwrap();
        let snapshot = repo.get(created.id).await.unwrap().unwrap();

        repo.update_status(created.id, MessageStatus::Sent, Utc::now())
            .await
            .unwrap();
        let before = repo.get(created.id).await.unwrap().unwrap();

        sender.fail(created.id);
        assert!(matches!(
            dispatcher.dispatch(&snapshot).await,
            Err(Error::Conflict { .. })
        ));

        let after = repo.get(created.id).await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(after.status, MessageStatus::Sent);
        assert_eq!(after.retry_count, 2);
        assert!(after.sent_at.is_some());
        assert!(cache.writes().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_success_overwrites_same_key() {
        let h = harness(3);
        let message = h.repo.insert(1, 0);
        h.sender.succeed_with(1, "abc");

        h.dispatcher.dispatch(&message).await.unwrap();
        h.repo.store(message.clone());
        h.dispatcher.dispatch(&message).await.unwrap();

        let writes = h.cache.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|(k, _)| k == "msg:1"));
        assert!(h.cache.get("msg:1").await.unwrap().is_some());
    }
}
