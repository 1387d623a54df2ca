//! Per-operation cancellation and deadline.
//!
//! Every driver operation receives an [`OpContext`]. Backend calls are
//! raced against it, so a cancelled caller or an expired deadline drops
//! the in-flight future, which aborts the transfer.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Cancellation token plus optional deadline for one operation.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// Create a context that is never cancelled unless asked to.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context driven by an existing token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set a deadline relative to now.
    ///
    /// An earlier deadline already set on the context is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline.
    ///
    /// An earlier deadline already set on the context is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a context cancelled together with this one.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Fail fast if the context is already done.
    ///
    /// # Errors
    /// - `Cancelled` if the token fired
    /// - `DeadlineExceeded` if the deadline passed
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Run `fut` until it completes or the context is done.
    ///
    /// # Errors
    /// - `Cancelled` / `DeadlineExceeded` if the context wins the race
    /// - Whatever `fut` returns otherwise
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            _ = deadline => Err(Error::DeadlineExceeded),
            result = fut => result,
        }
    }
}
