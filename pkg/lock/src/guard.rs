use futures_util::FutureExt;
use pkg_types::lock::LeaseConfig;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::provider::{Acquire, LockProvider};

/// Per-trigger states of the guard.
///
/// ```text
/// Triggered -> Acquiring -> Acquired -> Running -> HoldRemainder -> Released
///                        -> NotAcquired -> Skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Triggered,
    Acquiring,
    Acquired,
    NotAcquired,
    Running,
    HoldRemainder,
    Released,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another replica holds the lock.
    Contended,
    /// The lock store failed; skipped rather than risk a double run.
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Succeeded,
    Failed(String),
    Panicked(String),
}

/// What one trigger firing amounted to on this replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The work ran here. `released` is false when the lease had already run
    /// out or the store refused the release.
    Ran { result: RunResult, released: bool },
    Skipped(SkipReason),
}

impl Outcome {
    pub fn ran(&self) -> bool {
        matches!(self, Outcome::Ran { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Outcome::Skipped(reason) => Some(*reason),
            Outcome::Ran { .. } => None,
        }
    }
}

/// Wraps a unit of work with acquire, run once, hold until `min_lease` has
/// passed, release.
///
/// Release is attempted on every path once the lock is taken: success,
/// error, panic, and shutdown during the hold. A run that outlives
/// `max_lease` is not interrupted; the store lets another replica in and the
/// two may overlap, so the work itself has to tolerate that.
pub struct ExecutionGuard {
    provider: Arc<LockProvider>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ExecutionGuard {
    pub fn new(provider: Arc<LockProvider>) -> Self {
        Self {
            provider,
            shutdown: None,
        }
    }

    /// Cut the hold short once `shutdown` turns true. The lock is still
    /// released.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn provider(&self) -> &LockProvider {
        &self.provider
    }

    fn enter(&self, name: &str, state: GuardState) {
        debug!(
            "Guard {} on {}: {:?}",
            name,
            self.provider.replica_id(),
            state
        );
    }

    /// Run `work` if this replica wins `name`, otherwise skip it.
    pub async fn run<F, Fut>(&self, name: &str, lease: &LeaseConfig, work: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let replica = self.provider.replica_id();
        self.enter(name, GuardState::Triggered);

        self.enter(name, GuardState::Acquiring);
        let mut handle = match self.provider.try_lock_outcome(name, lease).await {
            Acquire::Acquired(handle) => handle,
            Acquire::Contended => {
                self.enter(name, GuardState::NotAcquired);
                self.enter(name, GuardState::Skipped);
                info!("Task {} skipped on {}: lock held elsewhere", name, replica);
                return Outcome::Skipped(SkipReason::Contended);
            }
            Acquire::StoreUnavailable(e) => {
                self.enter(name, GuardState::NotAcquired);
                self.enter(name, GuardState::Skipped);
                warn!(
                    "Task {} skipped on {}: lock store unavailable: {:#}",
                    name, replica, e
                );
                return Outcome::Skipped(SkipReason::StoreUnavailable);
            }
        };
        self.enter(name, GuardState::Acquired);

        self.enter(name, GuardState::Running);
        let started = Instant::now();
        let result = match AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => RunResult::Succeeded,
            Ok(Err(e)) => {
                error!("Task {} failed on {}: {:#}", name, replica, e);
                RunResult::Failed(format!("{:#}", e))
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!("Task {} panicked on {}: {}", name, replica, message);
                RunResult::Panicked(message)
            }
        };
        let elapsed = started.elapsed();

        let remaining = handle.remaining_min_hold();
        if !remaining.is_zero() {
            self.enter(name, GuardState::HoldRemainder);
            debug!("Holding lock {} for another {:?}", name, remaining);
            if !self.hold_until(handle.min_hold_until()).await {
                info!(
                    "Hold on {} cut short by shutdown on {}; releasing early",
                    name, replica
                );
            }
        }

        let held = handle.acquired_at().elapsed();
        let released = handle.release().await;
        self.enter(name, GuardState::Released);
        debug!("Lock {} held for {:?} on {}", name, held, replica);

        match &result {
            RunResult::Succeeded => info!(
                "Task {} ran to completion on {} in {:?}",
                name, replica, elapsed
            ),
            RunResult::Failed(_) | RunResult::Panicked(_) => info!(
                "Task {} ran on {} in {:?} and did not succeed",
                name, replica, elapsed
            ),
        }

        Outcome::Ran { result, released }
    }

    /// Sleep until `deadline`. Returns false if shutdown arrived first.
    async fn hold_until(&self, deadline: Instant) -> bool {
        let Some(shutdown) = &self.shutdown else {
            tokio::time::sleep_until(deadline).await;
            return true;
        };

        let mut shutdown = shutdown.clone();
        if *shutdown.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => true,
            _ = wait_for_shutdown(&mut shutdown) => false,
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        // Sender gone: nobody can ask us to stop any more.
        std::future::pending::<()>().await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
