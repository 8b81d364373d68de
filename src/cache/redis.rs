use futures_util::future::BoxFuture;
use ::redis::{aio::ConnectionManager, AsyncCommands, Client};

use crate::error::Error;

use super::ConfirmationCache;

/// Redis-backed confirmation cache. Entries never expire.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects and verifies the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = Client::open(url)?;
        let mut conn = client.get_connection_manager().await?;

        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;

        tracing::info!("Redis connected");

        Ok(Self { conn })
    }
}

impl ConfirmationCache for RedisCache {
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let _: () = conn.set(key, value).await?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, Error>> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
    }
}
