//! Two-phase termination of a spawned execution context.

use super::CancellationToken;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default time an execution context gets to stop on its own.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(2000);

/// How long an aborted task gets to reach its next yield point.
const ABORT_SETTLE: Duration = Duration::from_millis(100);

/// How a cancellation request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The task observed the token and returned within the grace period.
    Cooperative,
    /// The task was aborted after the grace period elapsed.
    Forced,
    /// The task had already finished; nothing was done.
    AlreadyFinished,
}

impl CancelOutcome {
    /// Returns true if this request actually stopped a running task.
    #[must_use]
    pub fn stopped_task(self) -> bool {
        !matches!(self, Self::AlreadyFinished)
    }
}

/// Owns one spawned task and the token it is expected to observe.
///
/// [`cancel`](Self::cancel) first signals the token, then waits up to the
/// grace period for the task to return, and aborts it otherwise. Only the
/// first call does any work; concurrent callers wait for it and receive the
/// same outcome.
///
/// A task blocking its worker thread cannot be interrupted. After the abort
/// the controller waits briefly for it and then returns regardless, so the
/// caller is never held much past the grace period.
pub struct CancellationController {
    token: Arc<CancellationToken>,
    handle: Mutex<Option<JoinHandle<()>>>,
    outcome: OnceCell<CancelOutcome>,
    grace_period: Duration,
}

impl CancellationController {
    /// Spawns `task` on the current runtime, handing it `token`.
    pub fn spawn<F, Fut>(token: Arc<CancellationToken>, grace_period: Duration, task: F) -> Self
    where
        F: FnOnce(Arc<CancellationToken>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(token.clone()));
        Self {
            token,
            handle: Mutex::new(Some(handle)),
            outcome: OnceCell::new(),
            grace_period,
        }
    }

    /// Returns the token the task observes.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns the configured grace period.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Returns true once the task has returned or been stopped.
    ///
    /// Reports false while a cancellation is in progress.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle
            .try_lock()
            .is_ok_and(|slot| slot.as_ref().map_or(true, JoinHandle::is_finished))
    }

    /// Stops the task, cooperatively if possible.
    ///
    /// Every caller receives the outcome of the one stop that actually ran.
    pub async fn cancel(&self, reason: &str) -> CancelOutcome {
        *self.outcome.get_or_init(|| self.stop(reason)).await
    }

    async fn stop(&self, reason: &str) -> CancelOutcome {
        let mut slot = self.handle.lock().await;
        let Some(handle) = slot.as_mut() else {
            return CancelOutcome::AlreadyFinished;
        };
        if handle.is_finished() {
            *slot = None;
            return CancelOutcome::AlreadyFinished;
        }

        self.token.cancel(reason);

        let outcome = match tokio::time::timeout(self.grace_period, &mut *handle).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    warn!("Execution context ended abnormally during cancel: {}", e);
                }
                debug!("Execution context stopped cooperatively");
                CancelOutcome::Cooperative
            }
            Err(_) => {
                warn!(
                    grace_ms = u64::try_from(self.grace_period.as_millis()).unwrap_or(u64::MAX),
                    "Execution context ignored cancellation; aborting"
                );
                handle.abort();
                if tokio::time::timeout(ABORT_SETTLE, &mut *handle).await.is_err() {
                    warn!("Aborted execution context is blocking its thread; detaching");
                }
                CancelOutcome::Forced
            }
        };
        *slot = None;
        outcome
    }
}

impl std::fmt::Debug for CancellationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationController")
            .field("grace_period", &self.grace_period)
            .field("finished", &self.is_finished())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
