use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode, SqlitePoolOptions},
    SqlitePool,
};
use tokio_stream::StreamExt;

use crate::{
    error::Error,
    message::{Message, MessageId, MessageStatus, NewMessage},
};

use super::{MessageRepository, PendingFilter};

/// SQLite-backed message store.
#[derive(Clone)]
pub struct SqliteRepository {
    db: SqlitePool,
}

impl SqliteRepository {
    /// Opens (creating if needed) the database at `path` and applies migrations.
    /// Without a path the database lives in memory for the lifetime of the pool.
    pub async fn connect(path: Option<&str>) -> Result<Self, Error> {
        let (opts, pool) = match path {
            Some(path) => (
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal),
                SqlitePoolOptions::new(),
            ),
            // Every connection to `:memory:` is a separate database.
            None => (
                SqliteConnectOptions::new().in_memory(true),
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None),
            ),
        };

        let opts = opts
            .locking_mode(SqliteLockingMode::Normal)
            .optimize_on_close(true, None);

        let db = pool.connect_with(opts).await?;

        sqlx::migrate!("./migrations").run(&db).await?;

        Ok(Self { db })
    }

    async fn fetch_pending_inner(&self, filter: PendingFilter) -> Result<Vec<Message>, Error> {
        let messages = sqlx::query_as(
            "
            SELECT * FROM messages
            WHERE status = $1 AND length(content) <= $2 AND retry_count < $3
            ORDER BY id
            LIMIT $4
            ",
        )
        .bind(MessageStatus::Pending)
        .bind(filter.content_limit)
        .bind(filter.max_retries)
        .bind(filter.batch_size)
        .fetch_all(&self.db)
        .await?;

        Ok(messages)
    }

    /// Error for a guarded write that matched no row.
    async fn not_pending(&self, id: MessageId) -> Error {
        let status: Result<Option<MessageStatus>, _> =
            sqlx::query_scalar("SELECT status FROM messages WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db)
                .await;

        match status {
            Ok(Some(status)) => Error::not_pending(id, status),
            Ok(None) => Error::message_not_found(id),
            Err(e) => e.into(),
        }
    }

    async fn update_status_inner(
        &self,
        id: MessageId,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let res = sqlx::query(
            "
            UPDATE messages
            SET
                status = $1,
                updated_at = $2,
                sent_at = CASE WHEN $1 = 'sent' THEN $2 ELSE NULL END
            WHERE id = $3 AND status = $4
            ",
        )
        .bind(status)
        .bind(at)
        .bind(id)
        .bind(MessageStatus::Pending)
        .execute(&self.db)
        .await?;

        if res.rows_affected() == 0 {
            return Err(self.not_pending(id).await);
        }

        Ok(())
    }

    async fn increment_retry_count_inner(&self, id: MessageId) -> Result<u32, Error> {
        let retry_count: Option<u32> = sqlx::query_scalar(
            "
            UPDATE messages
            SET retry_count = retry_count + 1, updated_at = $1
            WHERE id = $2 AND status = $3
            RETURNING retry_count
            ",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(MessageStatus::Pending)
        .fetch_optional(&self.db)
        .await?;

        match retry_count {
            Some(retry_count) => Ok(retry_count),
            None => Err(self.not_pending(id).await),
        }
    }

    async fn list_sent_inner(&self) -> Result<Vec<Message>, Error> {
        let mut stream = sqlx::query_as("SELECT * FROM messages WHERE status = $1 ORDER BY id")
            .bind(MessageStatus::Sent)
            .fetch(&self.db);

        let mut messages = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            messages.push(res);
        }

        Ok(messages)
    }

    async fn create_inner(&self, message: NewMessage) -> Result<Message, Error> {
        let now = Utc::now();

        let message = sqlx::query_as(
            "
            INSERT INTO messages (recipient, content, status, retry_count, created_at, updated_at)
            VALUES ($1, $2, $3, 0, $4, $4)
            RETURNING *
            ",
        )
        .bind(message.to)
        .bind(message.content)
        .bind(MessageStatus::Pending)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(message)
    }

    async fn get_inner(&self, id: MessageId) -> Result<Option<Message>, Error> {
        Ok(sqlx::query_as("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn clear_inner(&self) -> Result<u64, Error> {
        let res = sqlx::query("DELETE FROM messages").execute(&self.db).await?;

        Ok(res.rows_affected())
    }
}

impl MessageRepository for SqliteRepository {
    fn fetch_pending(&self, filter: PendingFilter) -> BoxFuture<'_, Result<Vec<Message>, Error>> {
        Box::pin(self.fetch_pending_inner(filter))
    }

    fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(self.update_status_inner(id, status, at))
    }

    fn increment_retry_count(&self, id: MessageId) -> BoxFuture<'_, Result<u32, Error>> {
        Box::pin(self.increment_retry_count_inner(id))
    }

    fn list_sent(&self) -> BoxFuture<'_, Result<Vec<Message>, Error>> {
        Box::pin(self.list_sent_inner())
    }

    fn create(&self, message: NewMessage) -> BoxFuture<'_, Result<Message, Error>> {
        Box::pin(self.create_inner(message))
    }

    fn get(&self, id: MessageId) -> BoxFuture<'_, Result<Option<Message>, Error>> {
        Box::pin(self.get_inner(id))
    }

    fn clear(&self) -> BoxFuture<'_, Result<u64, Error>> {
        Box::pin(self.clear_inner())
    }
}
