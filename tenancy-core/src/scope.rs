//! Cancellation scopes with optional deadlines.
//!
//! Every external call and every wait in the controllers runs inside a
//! [`Scope`]. Cancelling a scope cancels all scopes derived from it, and a
//! derived scope never outlives the deadline of its parent.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TenancyError};

#[derive(Clone, Debug)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::root(CancellationToken::new())
    }
}

impl Scope {
    /// Scope bound to `token` with no deadline.
    pub fn root(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derived scope sharing this scope's deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derived scope that additionally expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The scope error if the scope has already ended.
    pub fn err(&self) -> Option<TenancyError> {
        if self.token.is_cancelled() {
            return Some(TenancyError::Cancelled("scope cancelled".into()));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(TenancyError::DeadlineExceeded("scope deadline reached".into()))
            }
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the scope is cancelled or its deadline passes, yielding
    /// the matching error.
    pub async fn done(&self) -> TenancyError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => TenancyError::Cancelled("scope cancelled".into()),
                    _ = tokio::time::sleep_until(deadline) => {
                        TenancyError::DeadlineExceeded("scope deadline reached".into())
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                TenancyError::Cancelled("scope cancelled".into())
            }
        }
    }

    /// Runs `fut` to completion unless the scope ends first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            out = fut => out,
            err = self.done() => Err(err),
        }
    }

    /// Sleeps for `duration`, returning early with the scope error if the
    /// scope ends first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
