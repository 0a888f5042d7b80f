use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::{RestCallError, Result};

/// Deadline and cancellation scope covering a whole multi-attempt call.
///
/// An empty context never fires. Cloning shares the cancellation signal.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every [`CallContext`] derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline(Instant::now() + timeout)
    }

    /// Sets (or tightens) the deadline.
    pub fn deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(at),
            None => at,
        });
        self
    }

    /// Attaches a fresh cancellation signal and returns its handle.
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(rx);
        (self, CancelHandle { tx })
    }

    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fails if the context has already fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(RestCallError::Cancelled);
        }
        if self.deadline.is_some_and(|at| Instant::now() >= at) {
            return Err(RestCallError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves with the cause once the context fires; pending forever otherwise.
    pub(crate) async fn done(&self) -> RestCallError {
        let cancelled = async {
            if let Some(mut rx) = self.cancel.clone() {
                if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                    return;
                }
            }
            // Handle dropped without cancelling.
            std::future::pending::<()>().await
        };
        let expired = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => RestCallError::Cancelled,
            () = expired => RestCallError::DeadlineExceeded,
        }
    }
}
