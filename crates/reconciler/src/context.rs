//! Per-pass cancellation and deadline.
//!
//! Every collaborator call in a reconcile pass runs under a
//! [`ReconcileContext`]. Cancelling the context, or reaching its deadline,
//! aborts the in-flight call and surfaces a retryable error.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Cancellation scope for one reconcile pass.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    cancelled: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Cancels every context cloned from the one it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl ReconcileContext {
    /// Create a cancellable context.
    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                cancelled: rx,
                deadline: None,
            },
            CancelHandle { tx },
        )
    }

    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        let (ctx, _handle) = Self::new();
        ctx
    }

    /// Bound every call made under this context by `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once the context is cancelled. Never resolves when the
    /// cancel handle is gone without having cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless the context is cancelled or expires first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` or `Error::DeadlineExceeded` when the call
    /// is aborted, otherwise whatever `fut` returns.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(Error::cancelled(operation));
        }
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancelled() => Err(Error::cancelled(operation)),
            () = deadline => Err(Error::deadline_exceeded(operation)),
            res = fut => res,
        }
    }
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self::background()
    }
}
