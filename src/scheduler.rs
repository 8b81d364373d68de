use std::sync::Arc;

use crate::{
    dispatch::{DispatchOutcome, Dispatcher},
    repository::{MessageRepository, PendingFilter},
};

/// Counts for a single poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub sent: usize,
    pub retrying: usize,
    pub failed: usize,
    pub errors: usize,
}

/// Fetches one batch of pending messages and dispatches them in order.
#[derive(Clone)]
pub struct Poller {
    repository: Arc<dyn MessageRepository>,
    dispatcher: Dispatcher,
    batch_size: u32,
    content_limit: u32,
}

impl Poller {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        dispatcher: Dispatcher,
        batch_size: u32,
        content_limit: u32,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            batch_size,
            content_limit,
        }
    }

    pub fn filter(&self) -> PendingFilter {
        PendingFilter {
            batch_size: self.batch_size,
            content_limit: self.content_limit,
            max_retries: self.dispatcher.retry_policy().max_retries(),
        }
    }

    /// Runs one cycle. Never fails: fetch errors end the cycle early and
    /// dispatch errors are counted and logged per message.
    pub async fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();

        let messages = match self.repository.fetch_pending(self.filter()).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch pending messages");
                return report;
            }
        };

        report.fetched = messages.len();

        for message in &messages {
            match self.dispatcher.dispatch(message).await {
                Ok(DispatchOutcome::Sent { .. }) => report.sent += 1,
                Ok(DispatchOutcome::Retrying { .. }) => report.retrying += 1,
                Ok(DispatchOutcome::Failed { .. }) => report.failed += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(
                        message_id = message.id,
                        error = %e,
                        "Failed to record dispatch outcome"
                    );
                }
            }
        }

        if report.fetched > 0 {
            tracing::info!(
                fetched = report.fetched,
                sent = report.sent,
                retrying = report.retrying,
                failed = report.failed,
                errors = report.errors,
                "Poll cycle complete"
            );
        }

        report
    }
}
