use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    cache::{memory::InMemoryCache, redis::RedisCache, ConfirmationCache},
    config::Config,
    dispatch::{DispatchOutcome, Dispatcher},
    error::Error,
    lifecycle::AutoSender,
    message::{Message, MessageId, NewMessage},
    repository::{sqlite::SqliteRepository, MessageRepository},
    retry::RetryPolicy,
    scheduler::Poller,
    sender::{webhook::WebhookSender, MessageSender},
};

/// Owns the collaborators and the configuration snapshot the dispatch loop
/// runs with.
pub struct Service {
    repository: Arc<dyn MessageRepository>,
    dispatcher: Dispatcher,
    auto_sender: AutoSender,
    shutdown: CancellationToken,
    send_interval: Duration,
    batch_size: u32,
    message_char_limit: u32,
}

#[bon::bon]
impl Service {
    #[builder]
    pub fn new(
        config: &Config,
        repository: Arc<dyn MessageRepository>,
        sender: Arc<dyn MessageSender>,
        cache: Arc<dyn ConfirmationCache>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let retry = RetryPolicy::new(config.max_retries)?;
        let dispatcher = Dispatcher::new(repository.clone(), sender, cache, retry);
        let shutdown = CancellationToken::new();

        Ok(Self {
            repository,
            dispatcher,
            auto_sender: AutoSender::new(shutdown.clone()),
            shutdown,
            send_interval: config.send_interval(),
            batch_size: config.batch_size,
            message_char_limit: config.message_char_limit,
        })
    }

    /// Wires the production adapters: SQLite, the webhook sender, and Redis
    /// (or an in-process cache when no Redis URL is configured).
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let repository = SqliteRepository::connect(config.db_path()).await?;

        let sender = WebhookSender::new(
            config.webhook_url.clone(),
            config.webhook_key.clone(),
            config.sender_timeout(),
        )?;

        let cache: Arc<dyn ConfirmationCache> = match &config.redis_url {
            Some(url) => Arc::new(RedisCache::connect(url).await?),
            None => {
                tracing::warn!("No Redis URL configured, delivery confirmations are kept in memory");
                Arc::new(InMemoryCache::new())
            }
        };

        Self::builder()
            .config(config)
            .repository(Arc::new(repository))
            .sender(Arc::new(sender))
            .cache(cache)
            .build()
    }
}

impl Service {
    pub fn send_interval(&self) -> Duration {
        self.send_interval
    }

    fn poller(&self) -> Poller {
        Poller::new(
            self.repository.clone(),
            self.dispatcher.clone(),
            self.batch_size,
            self.message_char_limit,
        )
    }

    pub async fn start_auto_sender(&self, interval_seconds: u64) -> Result<(), Error> {
        self.auto_sender
            .start(Duration::from_secs(interval_seconds), self.poller())
            .await
    }

    pub async fn stop_auto_sender(&self) -> Result<(), Error> {
        self.auto_sender.stop().await
    }

    pub async fn auto_sender_running(&self) -> bool {
        self.auto_sender.is_running().await
    }

    /// Runs one poll cycle on the caller's task.
    pub async fn send_pending_messages(&self) -> crate::scheduler::PollReport {
        self.poller().poll_once().await
    }

    pub async fn get_sent_messages(&self) -> Result<Vec<Message>, Error> {
        self.repository.list_sent().await
    }

    /// Manual single-message dispatch. Only pending messages are accepted;
    /// a snapshot that is stale by the time its outcome is written gets
    /// [`Error::Conflict`].
    pub async fn send_message(&self, message: &Message) -> Result<DispatchOutcome, Error> {
        if message.status.is_terminal() {
            return Err(Error::invalid_parameter(format!(
                "message {} is {}, only pending messages can be sent",
                message.id, message.status
            )));
        }

        self.dispatcher.dispatch(message).await
    }

    pub async fn send_message_by_id(&self, id: MessageId) -> Result<DispatchOutcome, Error> {
        let message = self.get_message(id).await?;
        self.send_message(&message).await
    }

    pub async fn create_message(&self, message: NewMessage) -> Result<Message, Error> {
        if message.to.trim().is_empty() {
            return Err(Error::invalid_parameter("recipient must not be empty"));
        }
        if message.content.is_empty() {
            return Err(Error::invalid_parameter("content must not be empty"));
        }
        let length = message.content.chars().count();
        if length > self.message_char_limit as usize {
            return Err(Error::invalid_parameter(format!(
                "content is {length} characters, limit is {}",
                self.message_char_limit
            )));
        }

        self.repository.create(message).await
    }

    pub async fn get_message(&self, id: MessageId) -> Result<Message, Error> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| Error::message_not_found(id))
    }

    pub async fn seed_sample_messages(&self) -> Result<Vec<Message>, Error> {
        let mut created = Vec::new();
        for sample in NewMessage::samples() {
            created.push(self.repository.create(sample).await?);
        }

        tracing::info!(count = created.len(), "Sample messages inserted");

        Ok(created)
    }

    pub async fn clear_messages(&self) -> Result<u64, Error> {
        let removed = self.repository.clear().await?;

        tracing::info!(removed, "Messages cleared");

        Ok(removed)
    }

    /// Ends the background loop, if any. The auto sender reports not running
    /// afterwards and refuses to start again.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
