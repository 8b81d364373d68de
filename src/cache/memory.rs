//! In-process confirmation cache.
//!
//! Used when no Redis URL is configured, and by tests.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Error;

use super::ConfirmationCache;

#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<papaya::HashMap<String, String>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConfirmationCache for InMemoryCache {
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.entries.pin().insert(key.to_owned(), value.to_owned());
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, Error>> {
        Box::pin(async move { Ok(self.entries.pin().get(key).cloned()) })
    }
}
