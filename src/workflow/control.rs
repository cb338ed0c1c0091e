// src/workflow/control.rs - Cancellation and deadlines for a run

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::infra::errors::TunerError;

/// Cloneable cancel switch. Every clone observes the same state.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel can't close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Races each suspension point of a run against cancellation and the
/// run's deadline.
pub struct RunGuard {
    cancel: CancelToken,
    deadline: Option<(Instant, Duration)>,
}

impl RunGuard {
    pub fn new(cancel: CancelToken, timeout: Option<Duration>) -> Self {
        Self {
            cancel,
            deadline: timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    fn deadline_error(timeout: Duration) -> TunerError {
        TunerError::DeadlineExceeded {
            seconds: timeout.as_secs(),
        }
    }

    /// Fail fast if the run was cancelled or is already past its deadline.
    pub fn check(&self) -> Result<(), TunerError> {
        if self.cancel.is_cancelled() {
            return Err(TunerError::Cancelled);
        }
        match self.deadline {
            Some((at, timeout)) if Instant::now() >= at => Err(Self::deadline_error(timeout)),
            _ => Ok(()),
        }
    }

    pub async fn run<T, F>(&self, fut: F) -> Result<T, TunerError>
    where
        F: Future<Output = Result<T, TunerError>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some((at, timeout)) => {
                    tokio::time::sleep_until(at).await;
                    timeout
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TunerError::Cancelled),
            timeout = deadline => Err(Self::deadline_error(timeout)),
            result = fut => result,
        }
    }
}
