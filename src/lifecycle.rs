//! Start/stop control for the background poll loop.
//!
//! The controller is a two-state machine guarded by one async mutex:
//!
//! - `Stopped`: no loop task exists.
//! - `Running`: a loop task exists and owns a child of the shutdown token.
//!
//! `start` and `stop` check and transition the state under the same guard, so
//! concurrent calls are linearized. Each `start` creates a fresh cancellation
//! token and a fresh timer; `stop` takes the token out of the state and
//! cancels it, so it can be cancelled at most once.
//!
//! A `Running` entry whose token was cancelled by service shutdown, or whose
//! task has exited, is observed as stopped.

use std::time::Duration;

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{error::Error, scheduler::Poller};

/// Longest accepted poll interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

enum State {
    Stopped,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
}

impl State {
    fn is_live(&self) -> bool {
        match self {
            Self::Stopped => false,
            Self::Running { cancel, task } => !cancel.is_cancelled() && !task.is_finished(),
        }
    }
}

pub struct AutoSender {
    state: Mutex<State>,
    shutdown: CancellationToken,
}

impl AutoSender {
    /// `shutdown` ends any running loop when cancelled, independently of `stop`.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            state: Mutex::new(State::Stopped),
            shutdown,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_live()
    }

    pub async fn start(&self, interval: Duration, poller: Poller) -> Result<(), Error> {
        if interval.is_zero() {
            return Err(Error::invalid_parameter("interval must be greater than zero"));
        }
        if interval > MAX_INTERVAL {
            return Err(Error::invalid_parameter(format!(
                "interval must be at most {} seconds",
                MAX_INTERVAL.as_secs()
            )));
        }

        let mut state = self.state.lock().await;

        if state.is_live() {
            return Err(Error::AlreadyRunning);
        }
        if self.shutdown.is_cancelled() {
            *state = State::Stopped;
            return Err(Error::ShuttingDown);
        }

        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(run_loop(poller, interval, cancel.clone()));

        *state = State::Running { cancel, task };

        tracing::info!(interval_secs = interval.as_secs(), "Auto sender started");

        Ok(())
    }

    /// Does not wait for an in-flight cycle; it only prevents the next one.
    pub async fn stop(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let live = state.is_live();

        match std::mem::replace(&mut *state, State::Stopped) {
            State::Running { cancel, .. } if live => {
                cancel.cancel();
                tracing::info!("Auto sender stopped");
                Ok(())
            }
            _ => Err(Error::NotRunning),
        }
    }
}

async fn run_loop(poller: Poller, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                poller.poll_once().await;
            }
        }
    }

    tracing::debug!("Auto sender loop exited");
}
