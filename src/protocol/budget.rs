//! Run budgets and cancellation.
//!
//! A [`Budget`] caps a run by wall-clock time and by number of capability
//! calls, and may carry a [`CancelToken`] the caller trips from elsewhere.
//! Budgets are checked before each call is dispatched; calls already in
//! flight are left to finish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Shared flag that stops a run from dispatching further calls.
///
/// # Examples
///
/// ```
/// use minions_rs::protocol::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    /// Creates an untripped token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Every clone observes it.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Whether the token has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once the token is tripped.
    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }
}

impl From<CancellationToken> for CancelToken {
    fn from(token: CancellationToken) -> Self {
        Self(token)
    }
}

/// Limits imposed on one protocol run. Unlimited by default.
#[derive(Debug, Clone, Default)]
pub struct Budget {
    /// Wall-clock limit measured from the start of the run.
    pub timeout: Option<Duration>,
    /// Maximum number of capability calls, retries included.
    pub max_calls: Option<usize>,
    /// External cancellation.
    pub cancel: Option<CancelToken>,
}

impl Budget {
    /// Creates an unlimited budget.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Sets the wall-clock limit.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the call limit.
    #[must_use]
    pub const fn with_max_calls(mut self, max_calls: usize) -> Self {
        self.max_calls = Some(max_calls);
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Starts the clock.
    #[must_use]
    pub fn start(&self) -> BudgetGuard {
        BudgetGuard {
            deadline: self.timeout.map(|t| Instant::now() + t),
            max_calls: self.max_calls,
            calls: AtomicUsize::new(0),
            cancel: self.cancel.clone(),
        }
    }
}

/// A running budget, shared by every call of one run.
#[derive(Debug)]
pub struct BudgetGuard {
    deadline: Option<Instant>,
    max_calls: Option<usize>,
    calls: AtomicUsize,
    cancel: Option<CancelToken>,
}

impl BudgetGuard {
    /// Checks the budget without reserving a call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the token is tripped or the deadline
    /// has passed.
    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled {
                reason: "cancelled by caller".to_string(),
            });
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Error::Cancelled {
                reason: "wall-clock budget exhausted".to_string(),
            });
        }
        Ok(())
    }

    /// Reserves one capability call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the run is cancelled, out of time, or
    /// has already issued `max_calls` calls.
    pub fn reserve_call(&self) -> Result<()> {
        self.check()?;
        let issued = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = self.max_calls
            && issued >= max
        {
            self.calls.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Cancelled {
                reason: format!("call budget of {max} exhausted"),
            });
        }
        Ok(())
    }

    /// Sleeps for `delay`, waking early if the run is cancelled.
    pub async fn sleep(&self, delay: Duration) {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = token.cancelled() => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }

    /// Number of calls reserved so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
